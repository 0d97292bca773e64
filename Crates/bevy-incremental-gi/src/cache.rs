// bevy-incremental-gi/Crates/bevy-incremental-gi/src/cache.rs

//! Storage that carries baked data between phases and chunks.

use crate::lightmaps::{BakedLightmap, LightmapChartBakedDirect};
use crate::vicinity::BakedChunkVicinity;
use bevy::math::IVec3;
use bevy::utils::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyed storage for everything the baker produces.
///
/// Stores take ownership; loads hand out shared read-only handles. A store
/// must become visible to loads of the same key all at once, and stores to
/// different keys must not interfere.
pub trait BakedLightCache: Sync {
    fn store_chunk_vicinity(&self, chunk: IVec3, vicinity: BakedChunkVicinity);
    fn load_chunk_vicinity(&self, chunk: IVec3) -> Option<Arc<BakedChunkVicinity>>;

    fn store_direct_light(&self, lightmap_index: u32, direct: LightmapChartBakedDirect);
    fn load_direct_light(&self, lightmap_index: u32) -> Option<Arc<LightmapChartBakedDirect>>;

    fn store_lightmap(&self, lightmap_index: u32, lightmap: BakedLightmap);
    fn load_lightmap(&self, lightmap_index: u32) -> Option<Arc<BakedLightmap>>;
}

/// A cache that keeps everything in memory.
#[derive(Default)]
pub struct BakedLightMemoryCache {
    vicinities: Mutex<HashMap<IVec3, Arc<BakedChunkVicinity>>>,
    direct_light: Mutex<HashMap<u32, Arc<LightmapChartBakedDirect>>>,
    lightmaps: Mutex<HashMap<u32, Arc<BakedLightmap>>>,
}

// Every critical section is a single insert or lookup, so a poisoned map is
// still consistent.
fn lock<K, V>(map: &Mutex<HashMap<K, V>>) -> MutexGuard<'_, HashMap<K, V>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn load<K: Eq + Hash, V>(map: &Mutex<HashMap<K, Arc<V>>>, key: &K) -> Option<Arc<V>> {
    lock(map).get(key).cloned()
}

impl BakedLightMemoryCache {
    pub fn new() -> BakedLightMemoryCache {
        BakedLightMemoryCache::default()
    }

    pub fn num_chunk_vicinities(&self) -> usize {
        lock(&self.vicinities).len()
    }

    pub fn num_direct_light(&self) -> usize {
        lock(&self.direct_light).len()
    }

    pub fn num_lightmaps(&self) -> usize {
        lock(&self.lightmaps).len()
    }
}

impl BakedLightCache for BakedLightMemoryCache {
    fn store_chunk_vicinity(&self, chunk: IVec3, vicinity: BakedChunkVicinity) {
        lock(&self.vicinities).insert(chunk, Arc::new(vicinity));
    }

    fn load_chunk_vicinity(&self, chunk: IVec3) -> Option<Arc<BakedChunkVicinity>> {
        load(&self.vicinities, &chunk)
    }

    fn store_direct_light(&self, lightmap_index: u32, direct: LightmapChartBakedDirect) {
        lock(&self.direct_light).insert(lightmap_index, Arc::new(direct));
    }

    fn load_direct_light(&self, lightmap_index: u32) -> Option<Arc<LightmapChartBakedDirect>> {
        load(&self.direct_light, &lightmap_index)
    }

    fn store_lightmap(&self, lightmap_index: u32, lightmap: BakedLightmap) {
        lock(&self.lightmaps).insert(lightmap_index, Arc::new(lightmap));
    }

    fn load_lightmap(&self, lightmap_index: u32) -> Option<Arc<BakedLightmap>> {
        load(&self.lightmaps, &lightmap_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Vec3;

    #[test]
    fn loads_share_the_stored_entry() {
        let cache = BakedLightMemoryCache::new();
        assert!(cache.load_direct_light(0).is_none());

        let mut direct = LightmapChartBakedDirect::new(2);
        direct.direct_light[1] = Vec3::ONE;
        cache.store_direct_light(0, direct.clone());

        let first = cache.load_direct_light(0).unwrap();
        let second = cache.load_direct_light(0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, direct);
        assert_eq!(cache.num_direct_light(), 1);

        // Replacing an entry leaves handles to the old one intact.
        cache.store_direct_light(0, LightmapChartBakedDirect::new(2));
        assert_eq!(*first, direct);
        assert_ne!(*cache.load_direct_light(0).unwrap(), direct);
    }
}

// bevy-incremental-gi/Crates/bevy-incremental-gi/src/chunks.rs

//! Orders chunks so that spatial neighbors are baked close together.
//!
//! A chunk's vicinity overlaps the vicinities of its neighbors, so visiting
//! chunks in Z-order (Morton order) makes it more likely that cache entries
//! loaded for one chunk are still warm when the next one needs them.

use bevy::math::IVec3;
use thiserror::Error as Thiserror;

/// Width of the interleaved locality key, in bits.
pub const LOCALITY_KEY_BITS: u32 = u64::BITS;

/// The number of bits of each translated chunk coordinate that fit into the
/// locality key.
///
/// This is a hard limit: chunk sets spanning `1 << MAX_BITS_PER_COMPONENT`
/// chunks or more along any axis can't be ordered and are rejected.
pub const MAX_BITS_PER_COMPONENT: u32 = LOCALITY_KEY_BITS / 3;

/// A chunk lies too far from the minimum chunk coordinate to be encoded.
#[derive(Thiserror, Debug, Clone, Copy, PartialEq)]
#[error(
    "Chunk {chunk} is too far from chunk {base}: locality keys hold at most {} bits per axis",
    MAX_BITS_PER_COMPONENT
)]
pub struct ChunkRangeError {
    pub chunk: IVec3,
    pub base: IVec3,
}

/// Interleaves the bits of `chunk - base` into a Morton code.
///
/// Bit `i` of the `j`-th translated component lands on bit `i * 3 + j` of the
/// key. Returns `None` if a translated component is negative or doesn't fit
/// into [MAX_BITS_PER_COMPONENT] bits.
pub fn locality_key(chunk: IVec3, base: IVec3) -> Option<u64> {
    let offsets = [
        chunk.x as i64 - base.x as i64,
        chunk.y as i64 - base.y as i64,
        chunk.z as i64 - base.z as i64,
    ];

    let mut key = 0u64;
    for (component, &offset) in offsets.iter().enumerate() {
        if offset < 0 || offset >= 1i64 << MAX_BITS_PER_COMPONENT {
            return None;
        }
        let offset = offset as u64;
        for bit in 0..MAX_BITS_PER_COMPONENT {
            key |= ((offset >> bit) & 1) << (bit * 3 + component as u32);
        }
    }
    Some(key)
}

/// Sorts chunks by the locality key relative to their component-wise minimum.
pub fn sort_chunks_by_locality(chunks: &mut [IVec3]) -> Result<(), ChunkRangeError> {
    let Some(base) = chunks.iter().copied().reduce(IVec3::min) else {
        return Ok(());
    };

    let mut keyed_chunks = chunks
        .iter()
        .map(|&chunk| {
            locality_key(chunk, base)
                .map(|key| (key, chunk))
                .ok_or(ChunkRangeError { chunk, base })
        })
        .collect::<Result<Vec<_>, _>>()?;
    keyed_chunks.sort_by_key(|&(key, _)| key);

    for (chunk, (_, sorted_chunk)) in chunks.iter_mut().zip(keyed_chunks) {
        *chunk = sorted_chunk;
    }
    Ok(())
}

// bevy-incremental-gi/Crates/bevy-incremental-gi/src/parallel.rs

//! Fans per-texel and per-probe work out over a task pool.

use bevy::tasks::{TaskPool, TaskPoolBuilder};

/// A task pool sized for one kind of baking work.
///
/// Built once per phase and shared by every kernel call of that phase. With
/// one task or less no threads are spawned and all work runs on the calling
/// thread.
pub struct LightBakingTaskPool {
    num_tasks: usize,
    pool: Option<TaskPool>,
}

impl LightBakingTaskPool {
    pub fn new(num_tasks: usize, thread_name: &str) -> LightBakingTaskPool {
        let pool = (num_tasks > 1).then(|| {
            TaskPoolBuilder::new()
                .num_threads(num_tasks)
                .thread_name(thread_name.to_owned())
                .build()
        });
        LightBakingTaskPool { num_tasks, pool }
    }

    /// A pool that runs everything on the calling thread.
    pub fn inline() -> LightBakingTaskPool {
        LightBakingTaskPool::new(1, "")
    }

    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    /// Evaluates `f` for every index in `0..len` and returns the results in
    /// index order.
    ///
    /// The range is split into `num_tasks` contiguous slices, each evaluated
    /// by its own task. Results don't depend on the number of tasks as long
    /// as `f` is a pure function of its index.
    pub fn map<R, F>(&self, len: usize, f: F) -> Vec<R>
    where
        R: Send + 'static,
        F: Fn(usize) -> R + Sync,
    {
        let num_tasks = self.num_tasks.min(len);
        let pool = match self.pool {
            Some(ref pool) if num_tasks > 1 => pool,
            _ => return (0..len).map(f).collect(),
        };

        let slice_len = len.div_ceil(num_tasks);
        let f = &f;
        let slices = pool.scope(|scope| {
            for start in (0..len).step_by(slice_len) {
                let end = (start + slice_len).min(len);
                scope.spawn(async move { (start..end).map(f).collect::<Vec<_>>() });
            }
        });
        slices.into_iter().flatten().collect()
    }

    /// Overwrites every element of `output` with `f` of its index, splitting
    /// the slice between tasks like [LightBakingTaskPool::map].
    pub fn fill<R, F>(&self, output: &mut [R], f: F)
    where
        R: Send,
        F: Fn(usize) -> R + Sync,
    {
        let len = output.len();
        let num_tasks = self.num_tasks.min(len);
        let pool = match self.pool {
            Some(ref pool) if num_tasks > 1 => pool,
            _ => {
                for (index, value) in output.iter_mut().enumerate() {
                    *value = f(index);
                }
                return;
            }
        };

        let slice_len = len.div_ceil(num_tasks);
        let f = &f;
        pool.scope(|scope| {
            for (slice_index, slice) in output.chunks_mut(slice_len).enumerate() {
                scope.spawn(async move {
                    let start = slice_index * slice_len;
                    for (offset, value) in slice.iter_mut().enumerate() {
                        *value = f(start + offset);
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_do_not_depend_on_the_task_count() {
        let expected = (0..103).map(|index| index * index).collect::<Vec<_>>();
        for num_tasks in [0, 1, 2, 7, 200] {
            let pool = LightBakingTaskPool::new(num_tasks, "Test");
            assert_eq!(pool.map(103, |index| index * index), expected);

            let mut filled = vec![0; 103];
            pool.fill(&mut filled, |index| index * index);
            assert_eq!(filled, expected);
        }
        assert!(LightBakingTaskPool::new(4, "Test").map(0, |index| index).is_empty());
    }

    #[test]
    fn one_pool_serves_many_calls() {
        let pool = LightBakingTaskPool::new(3, "Test");
        assert_eq!(pool.num_tasks(), 3);
        for len in [1, 2, 3, 10, 64] {
            for _ in 0..4 {
                assert_eq!(pool.map(len, |index| index + 1), (1..=len).collect::<Vec<_>>());
            }
        }
        assert_eq!(LightBakingTaskPool::inline().map(5, |index| index), vec![0, 1, 2, 3, 4]);
    }
}

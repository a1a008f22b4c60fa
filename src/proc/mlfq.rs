//! Multi-level feedback queue (spec section 4.6). K priority levels, each
//! a max-heap; time quanta grow with level; a global boost every 100
//! ticks resets everyone to level 0.

use crate::param::{mlfq_time_quantum, MLFQ_BOOST_INTERVAL, MLFQ_LEVELS, NTHREAD};
use crate::proc::heap::{MlfqHeap, NOT_ON_HEAP};
use crate::proc::policy::SchedPolicy;
use crate::proc::state::EntityState;
use crate::proc::thread::Thread;

pub struct Mlfq {
    heaps: [MlfqHeap; MLFQ_LEVELS],
    last_boost_tick: u64,
}
impl Mlfq {
    pub const fn new() -> Mlfq {
        Mlfq {
            heaps: [const { MlfqHeap::new() }; MLFQ_LEVELS],
            last_boost_tick: 0,
        }
    }

    /// Clears all heaps, resets every `RUNNABLE` thread to level 0 with a
    /// fresh quantum, and re-inserts them, heapifying afterward.
    fn boost(&mut self, threads: &mut [Thread; NTHREAD]) {
        for heap in &mut self.heaps {
            heap.clear();
        }
        for idx in 0..NTHREAD {
            threads[idx].idx_on_heap = NOT_ON_HEAP;
        }
        for idx in 0..NTHREAD {
            if threads[idx].state == EntityState::Runnable {
                threads[idx].queue_level = 0;
                threads[idx].remaining_tq = mlfq_time_quantum(0);
                threads[idx].need_reset_lv_tq = false;
                self.heaps[0].push(threads, idx);
            }
        }
        self.heaps[0].heapify(threads);
    }

    #[cfg(test)]
    pub fn heap(&self, level: usize) -> &MlfqHeap {
        &self.heaps[level]
    }
}
impl SchedPolicy for Mlfq {
    fn pick_next(&mut self, threads: &mut [Thread; NTHREAD]) -> Option<usize> {
        for level in 0..MLFQ_LEVELS {
            if self.heaps[level].is_empty() {
                continue;
            }
            let idx = self.heaps[level].extract(threads)?;
            threads[idx].remaining_tq = threads[idx].remaining_tq.saturating_sub(1);
            return Some(idx);
        }
        None
    }

    fn on_enqueue(&mut self, threads: &mut [Thread; NTHREAD], idx: usize) {
        if threads[idx].need_reset_lv_tq {
            threads[idx].need_reset_lv_tq = false;
            threads[idx].queue_level = 0;
            threads[idx].remaining_tq = mlfq_time_quantum(0);
            self.heaps[0].push(threads, idx);
            return;
        }

        let exhausted = threads[idx].remaining_tq == 0;
        let level = if exhausted {
            threads[idx].queue_level + 1
        } else {
            threads[idx].queue_level
        };

        if level >= MLFQ_LEVELS {
            // Aged out at the bottom; waits for the next boost.
            threads[idx].queue_level = MLFQ_LEVELS - 1;
            threads[idx].remaining_tq = 0;
            return;
        }

        threads[idx].queue_level = level;
        if exhausted {
            threads[idx].remaining_tq = mlfq_time_quantum(level);
        }
        self.heaps[level].push(threads, idx);
    }

    fn on_dequeue(&mut self, threads: &mut [Thread; NTHREAD], idx: usize) {
        if threads[idx].idx_on_heap == NOT_ON_HEAP {
            return;
        }
        let level = threads[idx].queue_level;
        self.heaps[level].pop(threads, idx);
    }

    fn on_tick_boundary(&mut self, threads: &mut [Thread; NTHREAD], ticks: u64) {
        if ticks.saturating_sub(self.last_boost_tick) >= MLFQ_BOOST_INTERVAL {
            self.boost(threads);
            self.last_boost_tick = ticks;
        }
    }

    fn on_priority_change(
        &mut self,
        threads: &mut [Thread; NTHREAD],
        idx: usize,
        new_priority: i32,
    ) -> Result<(), ()> {
        // Preserve the source's guard literally (Design Note open question):
        // only resift if the target is currently heap-resident.
        if threads[idx].idx_on_heap == NOT_ON_HEAP {
            threads[idx].priority = new_priority;
            return Ok(());
        }
        let level = threads[idx].queue_level;
        self.heaps[level].change_priority(threads, idx, new_priority);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> [Thread; NTHREAD] {
        core::array::from_fn(|_| Thread::new())
    }

    #[test]
    fn time_quantum_grows_with_level() {
        assert_eq!(mlfq_time_quantum(0), 2);
        assert_eq!(mlfq_time_quantum(1), 6);
        assert_eq!(mlfq_time_quantum(2), 10);
    }

    #[test]
    fn demotes_after_quantum_exhausted() {
        let mut threads = fresh();
        let mut mlfq = Mlfq::new();
        threads[0].state = EntityState::Runnable;
        threads[0].queue_level = 0;
        threads[0].remaining_tq = mlfq_time_quantum(0);
        mlfq.heaps[0].push(&mut threads, 0);

        for _ in 0..mlfq_time_quantum(0) {
            let idx = mlfq.pick_next(&mut threads).unwrap();
            assert_eq!(idx, 0);
            mlfq.on_enqueue(&mut threads, idx);
        }
        assert_eq!(threads[0].queue_level, 1);
        assert_eq!(threads[0].remaining_tq, mlfq_time_quantum(1));
    }

    #[test]
    fn boost_resets_all_runnable_to_level_zero() {
        let mut threads = fresh();
        let mut mlfq = Mlfq::new();
        threads[0].state = EntityState::Runnable;
        threads[0].queue_level = 2;
        threads[0].remaining_tq = 3;
        mlfq.heaps[2].push(&mut threads, 0);

        mlfq.on_tick_boundary(&mut threads, MLFQ_BOOST_INTERVAL);
        assert_eq!(threads[0].queue_level, 0);
        assert_eq!(threads[0].remaining_tq, 2);
        assert_eq!(threads[0].idx_on_heap, 1);
    }

    #[test]
    fn need_reset_flag_returns_to_level_zero() {
        let mut threads = fresh();
        let mut mlfq = Mlfq::new();
        threads[0].state = EntityState::Runnable;
        threads[0].queue_level = 1;
        threads[0].remaining_tq = 4;
        threads[0].need_reset_lv_tq = true;
        mlfq.on_enqueue(&mut threads, 0);
        assert_eq!(threads[0].queue_level, 0);
        assert!(!threads[0].need_reset_lv_tq);
    }
}

//! Two-queue FCFS/round-robin split by pid parity (spec section 4.5).
//! Even-pid threads round-robin via a persistent scan cursor; odd-pid
//! threads run only when no even-pid thread is runnable, lowest pid first.

use crate::param::NTHREAD;
use crate::proc::policy::SchedPolicy;
use crate::proc::state::EntityState;
use crate::proc::thread::Thread;

fn sched_pid(threads: &[Thread; NTHREAD], idx: usize) -> u32 {
    threads[idx].pid
}

pub struct Multilevel {
    cursor: usize,
}
impl Multilevel {
    pub const fn new() -> Multilevel {
        Multilevel { cursor: 0 }
    }
}
impl SchedPolicy for Multilevel {
    fn pick_next(&mut self, threads: &mut [Thread; NTHREAD]) -> Option<usize> {
        let mut fcfs_target: Option<usize> = None;
        for step in 0..NTHREAD {
            let i = (self.cursor + step) % NTHREAD;
            if threads[i].state != EntityState::Runnable {
                continue;
            }
            let pid = sched_pid(threads, i);
            if pid % 2 == 0 {
                self.cursor = (i + 1) % NTHREAD;
                return Some(i);
            }
            let replace = match fcfs_target {
                None => true,
                Some(cur) => pid < sched_pid(threads, cur),
            };
            if replace {
                fcfs_target = Some(i);
            }
        }
        fcfs_target
    }
    fn on_enqueue(&mut self, _threads: &mut [Thread; NTHREAD], _idx: usize) {}
    fn on_dequeue(&mut self, _threads: &mut [Thread; NTHREAD], _idx: usize) {}
    fn on_tick_boundary(&mut self, _threads: &mut [Thread; NTHREAD], _ticks: u64) {}
    fn on_priority_change(
        &mut self,
        _threads: &mut [Thread; NTHREAD],
        _idx: usize,
        _new_priority: i32,
    ) -> Result<(), ()> {
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable(threads: &mut [Thread; NTHREAD], idx: usize, pid: u32) {
        threads[idx].state = EntityState::Runnable;
        threads[idx].pid = pid;
    }

    #[test]
    fn even_pid_preferred_and_round_robins() {
        let mut threads: [Thread; NTHREAD] = core::array::from_fn(|_| Thread::new());
        runnable(&mut threads, 0, 2);
        runnable(&mut threads, 1, 4);
        let mut policy = Multilevel::new();
        let first = policy.pick_next(&mut threads).unwrap();
        let second = policy.pick_next(&mut threads).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn odd_pid_only_when_no_even_runnable() {
        let mut threads: [Thread; NTHREAD] = core::array::from_fn(|_| Thread::new());
        runnable(&mut threads, 2, 7);
        runnable(&mut threads, 3, 3);
        let mut policy = Multilevel::new();
        assert_eq!(policy.pick_next(&mut threads), Some(3));
    }
}

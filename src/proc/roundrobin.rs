//! Baseline round-robin policy: linear scan from slot 0, first `RUNNABLE`
//! wins (spec section 4.4). No persistent cursor, so fairness is only as
//! good as the timer-driven `yield`.

use crate::param::NTHREAD;
use crate::proc::policy::SchedPolicy;
use crate::proc::state::EntityState;
use crate::proc::thread::Thread;

pub struct RoundRobin;
impl RoundRobin {
    pub const fn new() -> RoundRobin {
        RoundRobin
    }
}
impl SchedPolicy for RoundRobin {
    fn pick_next(&mut self, threads: &mut [Thread; NTHREAD]) -> Option<usize> {
        threads.iter().position(|t| t.state == EntityState::Runnable)
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

    #[test]
    fn picks_first_runnable_from_slot_zero() {
        let mut threads: [Thread; NTHREAD] = core::array::from_fn(|_| Thread::new());
        threads[3].state = EntityState::Runnable;
        threads[5].state = EntityState::Runnable;
        let mut policy = RoundRobin::new();
        assert_eq!(policy.pick_next(&mut threads), Some(3));
    }
}

//! The policy capability set. Three concrete strategies implement this
//! trait; [`ActivePolicy`] wraps whichever one is selected at boot so the
//! scheduler loop never branches on policy identity itself (see spec
//! Design Note "Policy dispatch via #ifdef").

use crate::param::NTHREAD;
use crate::proc::mlfq::Mlfq;
use crate::proc::multilevel::Multilevel;
use crate::proc::roundrobin::RoundRobin;
use crate::proc::thread::Thread;

pub trait SchedPolicy {
    /// Chooses the next thread to dispatch, or `None` if nothing is
    /// runnable. May mutate per-dispatch bookkeeping (e.g. MLFQ's
    /// remaining-quantum decrement).
    fn pick_next(&mut self, threads: &mut [Thread; NTHREAD]) -> Option<usize>;

    /// A thread just became `RUNNABLE` outside of the dispatch path
    /// (`wakeup`, `kill`, or returning `RUNNABLE` from a dispatch).
    fn on_enqueue(&mut self, threads: &mut [Thread; NTHREAD], idx: usize);

    /// A thread just left `RUNNABLE` candidacy (`SLEEPING`/`ZOMBIE`) while
    /// still tracked by the policy's own bookkeeping.
    fn on_dequeue(&mut self, threads: &mut [Thread; NTHREAD], idx: usize);

    /// Called once per scheduler-loop iteration before `pick_next`, with
    /// the current global tick count. Policies with time-based resets
    /// (MLFQ's boost) act on it here.
    fn on_tick_boundary(&mut self, threads: &mut [Thread; NTHREAD], ticks: u64);

    /// `setpriority`. Returns `Err(())` if the policy has no notion of
    /// priority or the target isn't eligible to be re-sifted.
    fn on_priority_change(
        &mut self,
        threads: &mut [Thread; NTHREAD],
        idx: usize,
        new_priority: i32,
    ) -> Result<(), ()>;
}

pub enum ActivePolicy {
    RoundRobin(RoundRobin),
    Multilevel(Multilevel),
    Mlfq(Mlfq),
}
impl ActivePolicy {
    pub const fn round_robin() -> ActivePolicy {
        ActivePolicy::RoundRobin(RoundRobin::new())
    }
    pub const fn multilevel() -> ActivePolicy {
        ActivePolicy::Multilevel(Multilevel::new())
    }
    pub const fn mlfq() -> ActivePolicy {
        ActivePolicy::Mlfq(Mlfq::new())
    }

    pub fn as_mlfq(&self) -> Option<&Mlfq> {
        match self {
            ActivePolicy::Mlfq(m) => Some(m),
            _ => None,
        }
    }
}
impl SchedPolicy for ActivePolicy {
    fn pick_next(&mut self, threads: &mut [Thread; NTHREAD]) -> Option<usize> {
        match self {
            ActivePolicy::RoundRobin(p) => p.pick_next(threads),
            ActivePolicy::Multilevel(p) => p.pick_next(threads),
            ActivePolicy::Mlfq(p) => p.pick_next(threads),
        }
    }
    fn on_enqueue(&mut self, threads: &mut [Thread; NTHREAD], idx: usize) {
        match self {
            ActivePolicy::RoundRobin(p) => p.on_enqueue(threads, idx),
            ActivePolicy::Multilevel(p) => p.on_enqueue(threads, idx),
            ActivePolicy::Mlfq(p) => p.on_enqueue(threads, idx),
        }
    }
    fn on_dequeue(&mut self, threads: &mut [Thread; NTHREAD], idx: usize) {
        match self {
            ActivePolicy::RoundRobin(p) => p.on_dequeue(threads, idx),
            ActivePolicy::Multilevel(p) => p.on_dequeue(threads, idx),
            ActivePolicy::Mlfq(p) => p.on_dequeue(threads, idx),
        }
    }
    fn on_tick_boundary(&mut self, threads: &mut [Thread; NTHREAD], ticks: u64) {
        match self {
            ActivePolicy::RoundRobin(p) => p.on_tick_boundary(threads, ticks),
            ActivePolicy::Multilevel(p) => p.on_tick_boundary(threads, ticks),
            ActivePolicy::Mlfq(p) => p.on_tick_boundary(threads, ticks),
        }
    }
    fn on_priority_change(
        &mut self,
        threads: &mut [Thread; NTHREAD],
        idx: usize,
        new_priority: i32,
    ) -> Result<(), ()> {
        match self {
            ActivePolicy::RoundRobin(p) => p.on_priority_change(threads, idx, new_priority),
            ActivePolicy::Multilevel(p) => p.on_priority_change(threads, idx, new_priority),
            ActivePolicy::Mlfq(p) => p.on_priority_change(threads, idx, new_priority),
        }
    }
}

//! The single root object behind one exclusive-lock guard (spec Design
//! Note "Global mutable state"): the process pool, the thread pool, the
//! pid/tid counters, the tick clock, and the active scheduling policy.

use crate::param::{NPROC, NTHREAD};
use crate::proc::policy::ActivePolicy;
use crate::proc::process::Process;
use crate::proc::thread::Thread;
use crate::sync::spinlock::Spinlock;

pub struct Table {
    pub processes: [Process; NPROC],
    pub threads: [Thread; NTHREAD],
    next_pid: u32,
    next_tid: u32,
    pub ticks: u64,
    pub policy: ActivePolicy,
    /// Index of the process designated `init`; reparented orphans land
    /// here and it is the one process `exit` refuses to kill.
    pub init_process: usize,
}
impl Table {
    pub const fn new() -> Table {
        Table {
            processes: [const { Process::new() }; NPROC],
            threads: [const { Thread::new() }; NTHREAD],
            next_pid: 1,
            next_tid: 1,
            ticks: 0,
            policy: active_policy(),
            init_process: crate::param::NONE,
        }
    }

    pub fn next_pid(&mut self) -> u32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }
    pub fn next_tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid += 1;
        tid
    }
}

#[cfg(feature = "policy-round-robin")]
const fn active_policy() -> ActivePolicy {
    ActivePolicy::round_robin()
}
#[cfg(feature = "policy-multilevel")]
const fn active_policy() -> ActivePolicy {
    ActivePolicy::multilevel()
}
#[cfg(not(any(feature = "policy-round-robin", feature = "policy-multilevel")))]
const fn active_policy() -> ActivePolicy {
    ActivePolicy::mlfq()
}

pub static TABLE: Spinlock<Table> = Spinlock::new(Table::new());

//! Thread descriptors: the schedulable entity. A process with one thread
//! behaves like a classic single-threaded xv6 process; [`thread_create`]
//! grows that into several, sharing the owning process's address space.

use crate::collab::vm;
use crate::param::{NONE, PGSIZE};
use crate::proc::context::Context;
use crate::proc::heap::NOT_ON_HEAP;
use crate::proc::policy::SchedPolicy;
use crate::proc::process;
use crate::proc::scheduler::{self, current_thread_index};
use crate::proc::state::EntityState;
use crate::proc::table::TABLE;
use crate::proc::trapframe::Trapframe;

/// Stack guard value written below the new stack; a sentinel the trap
/// return path recognizes so it never tries to execute past it.
pub const THREAD_RETURN_SENTINEL: u64 = 0xffff_ffff;

/// Base offset for a thread's join channel, keeping it disjoint from
/// process wait channels (see [`crate::proc::process::wait_channel`]).
const THREAD_CHANNEL_BASE: usize = 0x8000_0000;

pub fn thread_channel(thread_idx: usize) -> usize {
    THREAD_CHANNEL_BASE + thread_idx
}

pub struct Thread {
    pub state: EntityState,
    pub process_index: usize,
    /// Cached copy of the owning process's pid, set when the thread is
    /// created. Lets pid-parity policies read it without a `Table`
    /// reference; a process's pid never changes after allocation, so the
    /// cache can't go stale.
    pub pid: u32,
    pub tid: u32,
    /// Opaque handle to this thread's kernel stack, or 0 if unallocated.
    pub kernel_stack: u64,
    pub trapframe: Trapframe,
    pub context: Context,
    /// 0 means "not sleeping on anything".
    pub chan: usize,
    pub retval: u64,
    pub will_be_joined: bool,

    // MLFQ bookkeeping (inert under the other two policies).
    pub queue_level: usize,
    pub remaining_tq: u32,
    pub priority: i32,
    pub idx_on_heap: isize,
    pub need_reset_lv_tq: bool,
}
impl Thread {
    pub const fn new() -> Thread {
        Thread {
            state: EntityState::Unused,
            process_index: NONE,
            pid: 0,
            tid: 0,
            kernel_stack: 0,
            trapframe: Trapframe::new(),
            context: Context::new(),
            chan: 0,
            retval: 0,
            will_be_joined: false,
            queue_level: 0,
            remaining_tq: 0,
            priority: 0,
            idx_on_heap: NOT_ON_HEAP,
            need_reset_lv_tq: false,
        }
    }

    pub fn reset(&mut self) {
        if self.kernel_stack != 0 {
            unsafe { vm::free_kernel_stack(self.kernel_stack) };
        }
        *self = Thread::new();
    }
}
impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates a thread descriptor, a kernel stack, and a synthetic context
/// whose saved return address points at `entry_trampoline` (see spec
/// section 4.1). Returns the thread-table index.
pub fn alloc_entity(entry_trampoline: u64) -> Result<usize, ()> {
    let mut table = TABLE.lock();
    let idx = table
        .threads
        .iter()
        .position(|t| t.state == EntityState::Unused)
        .ok_or(())?;

    let tid = table.next_tid();
    let stack = unsafe { vm::alloc_kernel_stack() };
    if stack == 0 {
        return Err(());
    }

    let t = &mut table.threads[idx];
    t.state = EntityState::Embryo;
    t.tid = tid;
    t.kernel_stack = stack;
    t.context = Context::new();
    t.context.ra = entry_trampoline;
    t.context.sp = stack;
    Ok(idx)
}

/// Grows the owning process by two pages for a new user stack, lays out
/// the stack with a sentinel return address and `arg`, and points the new
/// thread at `start` (spec section 4.9). On failure the allocated thread
/// descriptor and any stack growth are unwound.
pub fn thread_create(proc_idx: usize, entry_trampoline: u64, start: u64, arg: u64) -> Result<u32, ()> {
    let idx = alloc_entity(entry_trampoline)?;
    let mut table = TABLE.lock();
    let table = &mut *table;

    let old_size = table.processes[proc_idx].size;
    let new_size = old_size + 2 * PGSIZE;
    let pagetable = table.processes[proc_idx].pagetable;

    let grown = unsafe { vm::allocuvm(pagetable, old_size, new_size) };
    if grown == 0 {
        table.threads[idx].reset();
        return Err(());
    }
    table.processes[proc_idx].size = grown;
    unsafe { vm::clearpteu(pagetable, grown - 2 * PGSIZE) };

    let ustack: [u64; 2] = [THREAD_RETURN_SENTINEL, arg];
    let sp = grown - 16;
    if unsafe { vm::copyout(pagetable, sp, ustack.as_ptr() as *const u8, 16) } < 0 {
        let shrunk = unsafe { vm::deallocuvm(pagetable, grown, old_size) };
        table.processes[proc_idx].size = if shrunk == 0 { old_size } else { shrunk };
        table.threads[idx].reset();
        return Err(());
    }

    let pid = table.processes[proc_idx].pid;
    let tid = table.threads[idx].tid;
    table.threads[idx].process_index = proc_idx;
    table.threads[idx].pid = pid;
    table.threads[idx].trapframe.entry_pc = start;
    table.threads[idx].trapframe.stack_pointer = sp;
    table.threads[idx].trapframe.a0 = arg;
    table.processes[proc_idx].thread_count += 1;
    table.threads[idx].state = EntityState::Runnable;
    table.policy.on_enqueue(&mut table.threads, idx);
    Ok(tid)
}

/// Stores `retval`, transitions to `ZOMBIE`, wakes any joiner. If this was
/// the process's last thread, falls through to [`process::exit`] (spec
/// section 4.9's "process exit with threads"); otherwise decrements
/// `thread_count` and calls `sched`. Never returns.
pub fn thread_exit(retval: u64) -> ! {
    let (proc_idx, thread_idx, is_last) = {
        let mut table = TABLE.lock();
        let Some(idx) = current_thread_index(&table) else {
            crate::console::kpanic("thread_exit: no current thread");
        };
        table.threads[idx].retval = retval;
        table.threads[idx].state = EntityState::Zombie;
        let proc_idx = table.threads[idx].process_index;
        let is_last = table.processes[proc_idx].thread_count == 1;
        if !is_last {
            table.processes[proc_idx].thread_count -= 1;
        }
        (proc_idx, idx, is_last)
    };

    if is_last {
        process::exit(proc_idx, retval as i32);
    }

    scheduler::wakeup(thread_channel(thread_idx));

    let mut table = TABLE.lock();
    unsafe { scheduler::sched(&mut table, thread_idx) };
    unreachable!("zombie thread resumed");
}

/// Locates the thread by `tid` within `proc_idx` and joins it.
pub fn thread_join(proc_idx: usize, tid: u32) -> Result<u64, ()> {
    let target = {
        let table = TABLE.lock();
        table.threads.iter().position(|t| t.tid == tid && t.process_index == proc_idx)
    };
    let Some(target) = target else {
        return Err(());
    };
    thread_join_found(proc_idx, target, true)
}

/// Sleeps on `target_idx`'s address until it reaches `ZOMBIE`, then frees
/// its kernel stack and retires the descriptor. Refuses self-join,
/// double-join, and join on the process's exit-driving thread.
pub fn thread_join_found(proc_idx: usize, target_idx: usize, set_retval: bool) -> Result<u64, ()> {
    let mut table = TABLE.lock();
    let Some(cur) = current_thread_index(&table) else {
        return Err(());
    };
    if cur == target_idx
        || table.threads[target_idx].will_be_joined
        || table.processes[proc_idx].exiting_thread == target_idx
    {
        return Err(());
    }
    table.threads[target_idx].will_be_joined = true;

    while table.threads[target_idx].state != EntityState::Zombie {
        scheduler::sleep(thread_channel(target_idx), TABLE.raw());
        if table.processes[proc_idx].exiting_thread == target_idx {
            table.threads[target_idx].will_be_joined = false;
            return Err(());
        }
    }

    let retval = table.threads[target_idx].retval;
    table.threads[target_idx].reset();
    Ok(if set_retval { retval } else { 0 })
}

/// Called once by the first thread to enter process exit: marks the
/// process `killed`, wakes any thread joining the caller (to break mutual
/// waits), then joins every sibling until `thread_count == 1`. Racing
/// `thread_create` calls may still produce new siblings, so the scan
/// re-runs until it converges (spec section 4.9).
pub fn join_all_other_threads(proc_idx: usize) {
    let cur_thread = {
        let table = TABLE.lock();
        current_thread_index(&table)
    };
    let Some(cur_thread) = cur_thread else {
        return;
    };

    {
        let mut table = TABLE.lock();
        if table.processes[proc_idx].exiting_thread != NONE {
            return;
        }
        table.processes[proc_idx].killed = true;
        table.processes[proc_idx].exiting_thread = cur_thread;
    }
    scheduler::wakeup(thread_channel(cur_thread));

    loop {
        let target = {
            let table = TABLE.lock();
            if table.processes[proc_idx].thread_count <= 1 {
                None
            } else {
                (0..table.threads.len()).find(|&i| {
                    i != cur_thread
                        && table.threads[i].process_index == proc_idx
                        && table.threads[i].state != EntityState::Unused
                })
            }
        };
        let Some(target) = target else {
            break;
        };
        let _ = thread_join_found(proc_idx, target, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_entity_assigns_increasing_tids() {
        let first = alloc_entity(0x1000).unwrap();
        let second = alloc_entity(0x1000).unwrap();
        let mut table = TABLE.lock();
        assert!(table.threads[first].tid < table.threads[second].tid);
        table.threads[first].reset();
        table.threads[second].reset();
    }

    #[test]
    fn thread_join_found_reaps_zombie_without_sleeping() {
        let (proc_idx, cur_idx, target_idx) = {
            let mut table = TABLE.lock();
            let proc_idx = table.processes.iter().position(|p| p.state == EntityState::Unused).unwrap();
            table.processes[proc_idx].state = EntityState::Runnable;

            let cur_idx = table.threads.iter().position(|t| t.state == EntityState::Unused).unwrap();
            table.threads[cur_idx].process_index = proc_idx;
            table.threads[cur_idx].state = EntityState::Running;

            let target_idx = table.threads.iter().position(|t| t.state == EntityState::Unused).unwrap();
            table.threads[target_idx].process_index = proc_idx;
            table.threads[target_idx].state = EntityState::Zombie;
            table.threads[target_idx].retval = 0xdead_beef;
            (proc_idx, cur_idx, target_idx)
        };
        unsafe { crate::proc::cpu::CPUS[0].running_thread = cur_idx };

        let retval = thread_join_found(proc_idx, target_idx, true).unwrap();
        assert_eq!(retval, 0xdead_beef);

        let mut table = TABLE.lock();
        assert_eq!(table.threads[target_idx].state, EntityState::Unused);
        unsafe { crate::proc::cpu::CPUS[0].running_thread = NONE };
        table.threads[cur_idx].reset();
        table.processes[proc_idx].reset();
    }

    #[test]
    fn thread_join_found_refuses_self_join() {
        let (proc_idx, cur_idx) = {
            let mut table = TABLE.lock();
            let proc_idx = table.processes.iter().position(|p| p.state == EntityState::Unused).unwrap();
            table.processes[proc_idx].state = EntityState::Runnable;
            let cur_idx = table.threads.iter().position(|t| t.state == EntityState::Unused).unwrap();
            table.threads[cur_idx].process_index = proc_idx;
            table.threads[cur_idx].state = EntityState::Running;
            (proc_idx, cur_idx)
        };
        unsafe { crate::proc::cpu::CPUS[0].running_thread = cur_idx };

        assert_eq!(thread_join_found(proc_idx, cur_idx, true), Err(()));

        unsafe { crate::proc::cpu::CPUS[0].running_thread = NONE };
        let mut table = TABLE.lock();
        table.threads[cur_idx].reset();
        table.processes[proc_idx].reset();
    }
}

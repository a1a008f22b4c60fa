//! The per-CPU scheduler loop and the suspension primitives built on top
//! of it: `sched`, `yield`, `sleep`, `wakeup` (spec sections 4.3, 4.7).
//! `sched` is the only suspension point in the kernel; everything else
//! here exists to reach it with the table lock held exactly once.

use crate::collab::{trap, vm};
use crate::console::kprintln;
use crate::param::NONE;
use crate::proc::context::Context;
use crate::proc::cpu::Cpu;
use crate::proc::policy::SchedPolicy;
use crate::proc::state::EntityState;
use crate::proc::table::{Table, TABLE};
use crate::sync::spinlock::RawSpinlock;

extern "C" {
    /// Saves the caller's callee-saved registers to `*old`, then resumes
    /// the kernel stack described by `new`. The one assembly-boundary
    /// primitive in this crate (Design Note "Raw context switch").
    fn swtch(old: *mut Context, new: *const Context);
}

#[cfg(test)]
#[no_mangle]
extern "C" fn swtch(_old: *mut Context, _new: *const Context) {
    // Host tests never give the scheduler a second kernel stack to resume;
    // treating swtch as a no-op still exercises every state transition
    // around the suspension point, just not the switch itself.
}

/// Gives up the CPU. Caller must hold the table lock, and no other, with
/// `interrupt_disable_layers == 1` (the `ncli == 1` invariant from spec
/// sections 4.2/5), and must already have changed `threads[idx].state`
/// away from `RUNNING`. Saves and restores `previous_interrupts_enabled`
/// around the switch: it's a property of this kernel thread, not this
/// CPU, so it must survive the stack swap undisturbed.
pub unsafe fn sched(table: &mut Table, idx: usize) {
    let cpu = Cpu::current();
    if cpu.interrupt_disable_layers != 1 {
        crate::console::kpanic("sched: locks");
    }
    if table.threads[idx].state == EntityState::Running {
        crate::console::kpanic("sched: thread still RUNNING");
    }
    if trap::interrupts_are_enabled() {
        crate::console::kpanic("sched: interruptible");
    }
    let previous_interrupts_enabled = cpu.previous_interrupts_enabled;
    let thread_ctx: *mut Context = core::ptr::addr_of_mut!(table.threads[idx].context);
    swtch(thread_ctx, core::ptr::addr_of!(cpu.scheduler_context));
    cpu.previous_interrupts_enabled = previous_interrupts_enabled;
}

/// Voluntarily gives up the CPU, staying `RUNNABLE`. `TABLE.lock()` is the
/// only interrupt-disable layer this needs to take; it already disables
/// interrupts on acquire, so wrapping it in another `push_intr_off` would
/// leave two layers held and trip `sched`'s `ncli == 1` check.
pub fn r#yield(idx: usize) {
    let mut table = TABLE.lock();
    table.threads[idx].state = EntityState::Runnable;
    unsafe { sched(&mut table, idx) };
}

/// Identical to [`r#yield`], but sets the MLFQ "relinquished voluntarily"
/// flag first (spec section 4.7's `yield_by_self`), so a process that
/// yields right before its quantum would have run out doesn't get to keep
/// its earned level. Inert under the other two policies.
pub fn yield_by_self(idx: usize) {
    {
        let mut table = TABLE.lock();
        table.threads[idx].need_reset_lv_tq = true;
    }
    r#yield(idx);
}

/// Blocks the calling thread on `channel`. If `lk` isn't already the
/// table lock, acquires the table lock first and releases `lk` - so any
/// wakeup that would fire must serialize after this sleeper is observably
/// `SLEEPING` (the miss-free-wakeup invariant, spec 4.7/5). If `lk` *is*
/// the table lock, it's assumed already held by the caller and is left
/// held on return, matching the source's `sleep(chan, &ptable.lock)`.
pub fn sleep(channel: usize, lk: &RawSpinlock) {
    sleep_impl(channel, lk, false);
}

/// Identical to [`sleep`], but sets the MLFQ "relinquished voluntarily"
/// flag before suspending (spec section 4.7's `sleep_by_self`), the same
/// anti-gaming mechanism [`yield_by_self`] applies to a voluntary sleep.
/// Inert under the other two policies.
pub fn sleep_by_self(channel: usize, lk: &RawSpinlock) {
    sleep_impl(channel, lk, true);
}

fn sleep_impl(channel: usize, lk: &RawSpinlock, by_self: bool) {
    let already_table_lock = core::ptr::eq(lk, TABLE.raw());
    if !already_table_lock {
        unsafe {
            TABLE.raw().acquire();
            lk.release();
        }
    }

    // Manual acquire/release above means there's no safe guard to borrow
    // here; the table lock is held either way by this point.
    let table = unsafe { &mut *TABLE.data_ptr() };
    let Some(idx) = current_thread_index(table) else {
        crate::console::kpanic("sleep: no current thread");
    };
    table.threads[idx].chan = channel;
    table.threads[idx].state = EntityState::Sleeping;
    table.threads[idx].need_reset_lv_tq |= by_self;
    table.policy.on_dequeue(&mut table.threads, idx);
    unsafe { sched(table, idx) };
    table.threads[idx].chan = 0;

    if !already_table_lock {
        unsafe {
            TABLE.raw().release();
            lk.acquire();
        }
    }
}

/// Wakes every `SLEEPING` thread whose channel equals `channel`.
pub fn wakeup(channel: usize) {
    let mut table = TABLE.lock();
    let table = &mut *table;
    for idx in 0..table.threads.len() {
        if table.threads[idx].state == EntityState::Sleeping && table.threads[idx].chan == channel {
            table.threads[idx].state = EntityState::Runnable;
            table.policy.on_enqueue(&mut table.threads, idx);
        }
    }
}

/// The thread index currently running on the calling CPU, if any. Takes
/// `&Table` only so callers that already hold the lock don't need to
/// justify reading per-CPU state separately; the lock itself isn't used.
pub fn current_thread_index(_table: &Table) -> Option<usize> {
    let cpu = unsafe { Cpu::current() };
    if cpu.running_thread == NONE {
        None
    } else {
        Some(cpu.running_thread)
    }
}

/// The per-CPU scheduler loop (spec section 4.3). Never returns.
pub fn run() -> ! {
    loop {
        // Briefly enable interrupts so a pending IPI on this hart gets
        // absorbed even if the previous dispatch left them off.
        unsafe { trap::enable_interrupts() };

        let mut table = TABLE.lock();
        let ticks = table.ticks;
        let Table { policy, threads, .. } = &mut *table;
        policy.on_tick_boundary(threads, ticks);
        let Some(idx) = policy.pick_next(threads) else {
            drop(table);
            continue;
        };

        let cpu = unsafe { Cpu::current() };
        cpu.running_thread = idx;
        let proc_idx = table.threads[idx].process_index;
        if proc_idx != NONE {
            unsafe { vm::switchuvm(table.processes[proc_idx].pagetable) };
        }
        table.threads[idx].state = EntityState::Running;

        let thread_ctx: *const Context = core::ptr::addr_of!(table.threads[idx].context);
        unsafe { swtch(core::ptr::addr_of_mut!(cpu.scheduler_context), thread_ctx) };

        cpu.running_thread = NONE;
        let Table { policy, threads, .. } = &mut *table;
        match threads[idx].state {
            EntityState::Runnable => policy.on_enqueue(threads, idx),
            EntityState::Sleeping | EntityState::Zombie => {}
            other => kprintln!("run: unexpected post-dispatch state {:?}", other),
        }
        drop(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeup_only_affects_matching_channel_sleepers() {
        {
            let mut table = TABLE.lock();
            table.threads[0].state = EntityState::Sleeping;
            table.threads[0].chan = 42;
            table.threads[1].state = EntityState::Sleeping;
            table.threads[1].chan = 99;
        }

        wakeup(42);

        {
            let table = TABLE.lock();
            assert_eq!(table.threads[0].state, EntityState::Runnable);
            assert_eq!(table.threads[1].state, EntityState::Sleeping);
        }
        let mut table = TABLE.lock();
        table.threads[0].reset();
        table.threads[1].reset();
    }
}

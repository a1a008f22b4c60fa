//! The trap/interrupt boundary. Timer ticks arrive here and call into
//! [`crate::proc::scheduler::r#yield`]; the return-to-user path checks
//! `killed` and drives `exit`. Both are owned by the trap implementation,
//! not by this crate - only the bits the locking primitives need
//! (interrupt nesting) live here.

use crate::proc::cpu::Cpu;

extern "C" {
    /// Are interrupts currently enabled on this hart?
    fn interrupts_enabled() -> i32;
    pub fn enable_interrupts();
    fn disable_interrupts();
    /// This hart's id. Must be called with interrupts disabled, since a
    /// thread can be moved to another CPU the moment they're re-enabled.
    fn hart_id() -> i32;
}

#[cfg(test)]
static TEST_INTR_ENABLED: AtomicI32 = AtomicI32::new(1);
#[cfg(test)]
static TEST_HART_ID: AtomicI32 = AtomicI32::new(0);

#[cfg(test)]
#[no_mangle]
extern "C" fn interrupts_enabled() -> i32 {
    TEST_INTR_ENABLED.load(Ordering::SeqCst)
}
#[cfg(test)]
#[no_mangle]
extern "C" fn enable_interrupts() {
    TEST_INTR_ENABLED.store(1, Ordering::SeqCst);
}
#[cfg(test)]
#[no_mangle]
extern "C" fn disable_interrupts() {
    TEST_INTR_ENABLED.store(0, Ordering::SeqCst);
}
#[cfg(test)]
#[no_mangle]
extern "C" fn hart_id() -> i32 {
    TEST_HART_ID.load(Ordering::SeqCst)
}

/// Test-only hook so scheduler tests can pretend to run on a specific hart.
#[cfg(test)]
pub fn set_test_hart_id(id: i32) {
    TEST_HART_ID.store(id, Ordering::SeqCst);
}

pub unsafe fn cpu_id() -> i32 {
    hart_id()
}

pub unsafe fn interrupts_are_enabled() -> bool {
    interrupts_enabled() != 0
}

/// `push_intr_off`/`pop_intr_off` nest: it takes two `pop`s to undo two
/// `push`es, and if interrupts were already off, the pair leaves them off.
/// Mirrors xv6's `pushcli`/`popcli`. Must be called with a valid current CPU.
pub unsafe fn push_intr_off() {
    let was_enabled = interrupts_enabled();
    let cpu = Cpu::current();
    disable_interrupts();
    if cpu.interrupt_disable_layers == 0 {
        cpu.previous_interrupts_enabled = was_enabled;
    }
    cpu.interrupt_disable_layers += 1;
}

pub unsafe fn pop_intr_off() {
    let cpu = Cpu::current();
    if interrupts_enabled() != 0 {
        panic!("pop_intr_off - interruptible");
    }
    if cpu.interrupt_disable_layers < 1 {
        panic!("pop_intr_off");
    }
    cpu.interrupt_disable_layers -= 1;
    if cpu.interrupt_disable_layers == 0 && cpu.previous_interrupts_enabled != 0 {
        enable_interrupts();
    }
}

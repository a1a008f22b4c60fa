//! Per-CPU state: which thread (if any) is running here, the context
//! `swtch`es back into the scheduler loop, and interrupt-nesting depth.

use crate::collab::trap;
use crate::param::{NCPU, NONE};
use crate::proc::context::Context;

#[repr(C)]
pub struct Cpu {
    /// Index into the thread table of the thread running here, or [`NONE`].
    pub running_thread: usize,
    /// `swtch()` here to enter the scheduler loop.
    pub scheduler_context: Context,
    /// Depth of `push_intr_off` nesting.
    pub interrupt_disable_layers: i32,
    /// Were interrupts enabled before the first `push_intr_off`?
    pub previous_interrupts_enabled: i32,
}
impl Cpu {
    pub const fn new() -> Cpu {
        Cpu {
            running_thread: NONE,
            scheduler_context: Context::new(),
            interrupt_disable_layers: 0,
            previous_interrupts_enabled: 0,
        }
    }

    /// Returns a mutable reference to the calling hart's `Cpu`.
    ///
    /// # Safety
    /// Interrupts must be disabled; otherwise the thread could migrate to
    /// another hart between reading the id and dereferencing it.
    pub unsafe fn current() -> &'static mut Cpu {
        let id = trap::cpu_id();
        &mut CPUS[id as usize]
    }
}
impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

pub static mut CPUS: [Cpu; NCPU] = [const { Cpu::new() }; NCPU];

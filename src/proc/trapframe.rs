//! The slice of a thread's trap state this crate actually touches. The
//! full register file lives with the trap/trampoline collaborator (see
//! spec section 6); `fork` and the syscall return path only ever need
//! the child's entry point and the return-value register.

#[repr(C)]
#[derive(Default, Copy, Clone)]
pub struct Trapframe {
    /// Saved user program counter; where the thread resumes on return.
    pub entry_pc: u64,
    /// User stack pointer.
    pub stack_pointer: u64,
    /// `a0`, the syscall/fork return-value register.
    pub a0: u64,
}
impl Trapframe {
    pub const fn new() -> Trapframe {
        Trapframe {
            entry_pc: 0,
            stack_pointer: 0,
            a0: 0,
        }
    }
}

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(dead_code)]
#![allow(clippy::missing_safety_doc)]

#[cfg(test)]
extern crate alloc;

pub mod collab;
pub mod console;
pub mod param;
pub mod proc;
pub mod sync;
pub mod syscall;
pub mod usertable;

#[cfg(not(test))]
extern "C" {
    /// Start and length of the embedded `init` binary, placed by the
    /// linker script; not owned by this crate.
    static INITCODE_START: u8;
    static INITCODE_LEN: usize;
}

/// Kernel entry point for the scheduling subsystem: builds process 1 out
/// of the embedded init binary, loads the user table (creating it with
/// just `root` on a blank disk), then enters the scheduler loop, forever.
#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn rust_main() -> ! {
    let init_code = unsafe { core::slice::from_raw_parts(&INITCODE_START as *const u8, INITCODE_LEN) };
    proc::process::userinit(syscall::forkret_addr(), init_code);

    if usertable::init_usertable().is_err() {
        console::kpanic("rust_main: user table already initialized");
    }
    proc::scheduler::run()
}

#[cfg(not(test))]
#[panic_handler]
fn panic_wrapper(_info: &core::panic::PanicInfo) -> ! {
    console::kpanic("rust panic")
}

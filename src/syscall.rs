//! Syscall dispatch (spec section 6's table, minus the filesystem/exec
//! calls that belong to other collaborators): decode the calling thread's
//! trap-frame arguments and route to the scheduling, thread, and
//! user-table operations this crate owns.

use crate::console::kprintln;
use crate::param::{ROOT_UID, USERNAME_MAXLEN, USER_PW_MAXLEN};
use crate::proc::scheduler::{self, current_thread_index};
use crate::proc::table::TABLE;
use crate::proc::{process, thread};
use crate::usertable;

extern "C" {
    fn argint(n: i32, out: *mut i32) -> i32;
    fn argaddr(n: i32, out: *mut u64) -> i32;
    /// Copies syscall argument `n` in as a nul-terminated string, at most
    /// `max` bytes. Returns the copied length (excluding the terminator),
    /// or -1.
    fn argstr(n: i32, buf: *mut u8, max: i32) -> i32;
    /// Kernel address a process or thread resumes at on its first
    /// dispatch; owned by the trap/trampoline collaborator, not this
    /// crate.
    fn forkret() -> !;
}

pub enum Syscall {
    Fork,
    Exit,
    Wait,
    Yield,
    Kill,
    SetPriority,
    ThreadCreate,
    ThreadExit,
    ThreadJoin,
    Login,
    AddUser,
    DeleteUser,
}
impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Fork),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Wait),
            4 => Ok(Syscall::Yield),
            5 => Ok(Syscall::Kill),
            6 => Ok(Syscall::SetPriority),
            7 => Ok(Syscall::ThreadCreate),
            8 => Ok(Syscall::ThreadExit),
            9 => Ok(Syscall::ThreadJoin),
            10 => Ok(Syscall::Login),
            11 => Ok(Syscall::AddUser),
            12 => Ok(Syscall::DeleteUser),
            _ => Err(()),
        }
    }
}

/// The trampoline address a freshly built process or thread resumes at on
/// its first dispatch. Exposed for the boot sequence's `userinit` call,
/// which needs the same address `fork`/`thread_create` use here.
pub fn forkret_addr() -> u64 {
    forkret as usize as u64
}

/// The process index of the thread currently running on this CPU.
fn current_process_index() -> usize {
    let table = TABLE.lock();
    match current_thread_index(&table) {
        Some(thread_idx) => table.threads[thread_idx].process_index,
        None => crate::console::kpanic("syscall: no current thread"),
    }
}

/// Reads argument `n` as a string into `buf`, returning the slice actually
/// filled (excluding the terminator) or `Err(())` on a bad user pointer.
unsafe fn arg_str<'b>(n: i32, buf: &'b mut [u8]) -> Result<&'b [u8], ()> {
    let len = argstr(n, buf.as_mut_ptr(), buf.len() as i32);
    if len < 0 {
        Err(())
    } else {
        Ok(&buf[..len as usize])
    }
}

impl Syscall {
    /// Dispatches to the operation, returning the value to stash in the
    /// caller's `a0`. `Exit`/`ThreadExit` never return to their caller.
    pub unsafe fn call(&self) -> i64 {
        match self {
            Syscall::Fork => match process::fork(forkret as usize as u64) {
                Ok(pid) => pid as i64,
                Err(()) => -1,
            },
            Syscall::Exit => {
                let mut status = 0i32;
                argint(0, &mut status);
                process::exit(current_process_index(), status);
            }
            Syscall::Wait => match process::wait(current_process_index()) {
                Ok(pid) => pid as i64,
                Err(()) => -1,
            },
            Syscall::Yield => {
                let table = TABLE.lock();
                let Some(idx) = current_thread_index(&table) else {
                    return -1;
                };
                drop(table);
                // A syscall-driven yield is the thread relinquishing the
                // CPU on its own behalf, not a tick-boundary preemption,
                // so it's the `by_self` variant that feeds MLFQ's
                // anti-gaming reset (spec section 4.7).
                scheduler::yield_by_self(idx);
                0
            }
            Syscall::Kill => {
                let mut pid = 0i32;
                argint(0, &mut pid);
                if process::kill(pid as u32) {
                    0
                } else {
                    -1
                }
            }
            Syscall::SetPriority => {
                let mut pid = 0i32;
                let mut priority = 0i32;
                argint(0, &mut pid);
                argint(1, &mut priority);
                let proc_idx = current_process_index();
                match process::setpriority(proc_idx, pid as u32, priority) {
                    Ok(()) => 0,
                    Err(()) => -1,
                }
            }
            Syscall::ThreadCreate => {
                let mut start = 0u64;
                let mut arg = 0u64;
                argaddr(0, &mut start);
                argaddr(1, &mut arg);
                let proc_idx = current_process_index();
                match thread::thread_create(proc_idx, forkret as usize as u64, start, arg) {
                    Ok(tid) => tid as i64,
                    Err(()) => -1,
                }
            }
            Syscall::ThreadExit => {
                let mut retval = 0i32;
                argint(0, &mut retval);
                thread::thread_exit(retval as u64);
            }
            Syscall::ThreadJoin => {
                let mut tid = 0i32;
                argint(0, &mut tid);
                let proc_idx = current_process_index();
                match thread::thread_join(proc_idx, tid as u32) {
                    Ok(retval) => retval as i64,
                    Err(()) => -1,
                }
            }
            Syscall::Login => {
                let mut username = [0u8; USERNAME_MAXLEN];
                let mut password = [0u8; USER_PW_MAXLEN];
                let Ok(username) = arg_str(0, &mut username) else {
                    return -1;
                };
                let Ok(password) = arg_str(1, &mut password) else {
                    return -1;
                };
                let proc_idx = current_process_index();
                match usertable::login(proc_idx, username, password) {
                    Ok(_) => 0,
                    Err(()) => -1,
                }
            }
            Syscall::AddUser => {
                let proc_idx = current_process_index();
                if TABLE.lock().processes[proc_idx].uid != ROOT_UID {
                    return -1;
                }
                let mut username = [0u8; USERNAME_MAXLEN];
                let mut password = [0u8; USER_PW_MAXLEN];
                let Ok(username) = arg_str(0, &mut username) else {
                    return -1;
                };
                let Ok(password) = arg_str(1, &mut password) else {
                    return -1;
                };
                match usertable::add_user(username, password) {
                    Ok(uid) => uid as i64,
                    Err(()) => -1,
                }
            }
            Syscall::DeleteUser => {
                let proc_idx = current_process_index();
                if TABLE.lock().processes[proc_idx].uid != ROOT_UID {
                    return -1;
                }
                let mut username = [0u8; USERNAME_MAXLEN];
                let Ok(username) = arg_str(0, &mut username) else {
                    return -1;
                };
                match usertable::delete_user(username) {
                    Ok(()) => 0,
                    Err(()) => -1,
                }
            }
        }
    }
}

/// Entry point from the trap handler: reads the syscall number out of
/// `a7`, dispatches, and stashes the result back into `a0`. Argument
/// fetching for the number itself is the trap collaborator's job; by the
/// time this runs, only dispatch remains.
pub unsafe fn syscall(num: usize) -> i64 {
    match Syscall::try_from(num) {
        Ok(call) => call.call(),
        Err(()) => {
            kprintln!("unknown syscall {}", num);
            -1
        }
    }
}

//! Process descriptors and the operations that allocate, fork, exit and
//! reap them (spec section 4.8). A process is a container for threads;
//! the schedulable work itself lives in [`crate::proc::thread`].

use crate::collab::fs::{self, InodeHandle, NO_INODE};
use crate::collab::vm::{self, PageTable};
use crate::param::{NOFILE, NONE, PROCNAME_LEN, ROOT_UID};
use crate::proc::policy::SchedPolicy;
use crate::proc::scheduler::{self, current_thread_index};
use crate::proc::state::EntityState;
use crate::proc::table::TABLE;
use crate::proc::thread;
use core::ptr;

/// Base offset for a process's `wait` channel, keeping it disjoint from
/// thread-join channels (see [`crate::proc::thread::thread_channel`]).
const WAIT_CHANNEL_BASE: usize = 0x7000_0000;

pub fn wait_channel(proc_idx: usize) -> usize {
    WAIT_CHANNEL_BASE + proc_idx
}

// SAFETY: `PageTable` is an opaque `*mut c_void` handle into the VM
// collaborator; all access to a `Process` is serialized through
// `TABLE`'s `Spinlock`, so sending it across threads is sound.
unsafe impl Send for Process {}

pub struct Process {
    pub state: EntityState,
    pub size: u64,
    pub pagetable: PageTable,
    pub pid: u32,
    pub parent_index: usize,
    pub open_files: [fs::FileHandle; NOFILE],
    pub cwd: InodeHandle,
    pub name: [u8; PROCNAME_LEN],
    pub killed: bool,
    pub main_thread: usize,
    pub running_thread: usize,
    pub exiting_thread: usize,
    pub thread_count: u32,
    /// Owning user, checked by the `addUser`/`deleteUser` syscalls against
    /// `ROOT_UID`. A freshly allocated process starts out as root, same as
    /// `init` before any `login` has run; `fork` copies it from the parent.
    pub uid: u32,
}
impl Process {
    pub const fn new() -> Process {
        Process {
            state: EntityState::Unused,
            size: 0,
            pagetable: ptr::null_mut(),
            pid: 0,
            parent_index: NONE,
            open_files: [fs::NO_FILE; NOFILE],
            cwd: NO_INODE,
            name: [0; PROCNAME_LEN],
            killed: false,
            main_thread: NONE,
            running_thread: NONE,
            exiting_thread: NONE,
            thread_count: 0,
            uid: ROOT_UID,
        }
    }

    pub(crate) fn reset(&mut self) {
        if !self.pagetable.is_null() {
            unsafe { vm::freevm(self.pagetable) };
        }
        *self = Process::new();
    }
}
impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates a process slot plus its main thread, entering the kernel at
/// `entry_trampoline` (spec section 4.1's `alloc_entity`, wrapped with the
/// process-level bookkeeping fork/exec need).
pub fn alloc(entry_trampoline: u64) -> Result<usize, ()> {
    let proc_idx = {
        let mut table = TABLE.lock();
        let proc_idx = table.processes.iter().position(|p| p.state == EntityState::Unused).ok_or(())?;
        table.processes[proc_idx].state = EntityState::Embryo;
        table.processes[proc_idx].pid = table.next_pid();
        proc_idx
    };

    let Ok(thread_idx) = thread::alloc_entity(entry_trampoline) else {
        let mut table = TABLE.lock();
        table.processes[proc_idx].reset();
        return Err(());
    };

    let pagetable = unsafe { vm::setupkvm() };
    if pagetable.is_null() {
        let mut table = TABLE.lock();
        table.threads[thread_idx].reset();
        table.processes[proc_idx].reset();
        return Err(());
    }

    let mut table = TABLE.lock();
    table.processes[proc_idx].pagetable = pagetable;
    table.processes[proc_idx].main_thread = thread_idx;
    table.processes[proc_idx].thread_count = 1;
    let pid = table.processes[proc_idx].pid;
    table.threads[thread_idx].process_index = proc_idx;
    table.threads[thread_idx].pid = pid;
    Ok(proc_idx)
}

/// Publishes a freshly-allocated process (and its main thread) as
/// `RUNNABLE`, inserting it into the active policy's queue.
pub fn publish_runnable(proc_idx: usize) {
    let mut table = TABLE.lock();
    let table = &mut *table;
    let thread_idx = table.processes[proc_idx].main_thread;
    table.processes[proc_idx].state = EntityState::Runnable;
    table.threads[thread_idx].state = EntityState::Runnable;
    table.policy.on_enqueue(&mut table.threads, thread_idx);
}

/// Builds process 1, `init`, directly from an embedded binary (spec
/// section 4.1's `alloc`, specialized the way the source's `userinit`
/// wires up the very first process). Panics on allocation failure, same
/// as the source: there is no one to report the error to yet.
pub fn userinit(entry_trampoline: u64, init_code: &[u8]) -> usize {
    let Ok(proc_idx) = alloc(entry_trampoline) else {
        crate::console::kpanic("userinit: out of memory");
    };

    let (pagetable, main_thread) = {
        let table = TABLE.lock();
        (table.processes[proc_idx].pagetable, table.processes[proc_idx].main_thread)
    };
    unsafe { vm::inituvm(pagetable, init_code.as_ptr(), init_code.len() as u32) };
    let cwd = unsafe { fs::namei(b"/\0".as_ptr()) };

    {
        let mut table = TABLE.lock();
        table.processes[proc_idx].size = crate::param::PGSIZE;
        table.threads[main_thread].trapframe.entry_pc = 0;
        table.threads[main_thread].trapframe.stack_pointer = crate::param::PGSIZE;
        let name = b"initcode\0";
        table.processes[proc_idx].name[..name.len()].copy_from_slice(name);
        table.processes[proc_idx].cwd = cwd;
        table.init_process = proc_idx;
    }

    publish_runnable(proc_idx);
    proc_idx
}

/// Duplicates the calling process: new address space, copied trap frame
/// (child's `a0` forced to 0), duplicated file descriptors and cwd. The
/// child is left `RUNNABLE` under the table lock.
pub fn fork(entry_trampoline: u64) -> Result<u32, ()> {
    let parent_idx = {
        let table = TABLE.lock();
        let Some(thread_idx) = current_thread_index(&table) else {
            return Err(());
        };
        table.threads[thread_idx].process_index
    };

    let child_idx = alloc(entry_trampoline)?;

    let (parent_pagetable, parent_size, parent_main_thread) = {
        let table = TABLE.lock();
        (
            table.processes[parent_idx].pagetable,
            table.processes[parent_idx].size,
            table.processes[parent_idx].main_thread,
        )
    };

    let new_pagetable = unsafe { vm::copyuvm(parent_pagetable, parent_size) };
    if new_pagetable.is_null() {
        let mut table = TABLE.lock();
        let child_main_thread = table.processes[child_idx].main_thread;
        table.processes[child_idx].reset();
        table.threads[child_main_thread].reset();
        return Err(());
    }

    let mut table = TABLE.lock();
    let table = &mut *table;
    let old_child_pagetable = table.processes[child_idx].pagetable;
    if !old_child_pagetable.is_null() {
        unsafe { vm::freevm(old_child_pagetable) };
    }
    table.processes[child_idx].pagetable = new_pagetable;
    let child_main_thread = table.processes[child_idx].main_thread;
    table.processes[child_idx].size = parent_size;
    table.threads[child_main_thread].trapframe = table.threads[parent_main_thread].trapframe;
    table.threads[child_main_thread].trapframe.a0 = 0;

    for i in 0..NOFILE {
        let fd = table.processes[parent_idx].open_files[i];
        if fd != fs::NO_FILE {
            table.processes[child_idx].open_files[i] = unsafe { fs::filedup(fd) };
        }
    }
    table.processes[child_idx].cwd = unsafe { fs::idup(table.processes[parent_idx].cwd) };
    table.processes[child_idx].parent_index = parent_idx;
    table.processes[child_idx].uid = table.processes[parent_idx].uid;

    let child_pid = table.processes[child_idx].pid;
    table.processes[child_idx].state = EntityState::Runnable;
    table.threads[child_main_thread].state = EntityState::Runnable;
    table.policy.on_enqueue(&mut table.threads, child_main_thread);
    Ok(child_pid)
}

/// Reassigns `proc_idx`'s children to `init_idx`. Caller must hold the
/// table lock.
fn reparent(table: &mut crate::proc::table::Table, proc_idx: usize, init_idx: usize) {
    for i in 0..table.processes.len() {
        if table.processes[i].parent_index == proc_idx {
            table.processes[i].parent_index = init_idx;
        }
    }
}

/// Terminates the calling process after all its threads have been
/// joined (spec section 4.8/4.9). Never returns; the caller (typically
/// the last `thread_exit`) must already have reaped every sibling.
pub fn exit(proc_idx: usize, status: i32) -> ! {
    {
        let table = TABLE.lock();
        if proc_idx == table.init_process {
            crate::console::kpanic("init exiting");
        }
    }

    thread::join_all_other_threads(proc_idx);

    {
        let mut table = TABLE.lock();
        for i in 0..NOFILE {
            let fd = table.processes[proc_idx].open_files[i];
            if fd != fs::NO_FILE {
                unsafe { fs::fileclose(fd) };
                table.processes[proc_idx].open_files[i] = fs::NO_FILE;
            }
        }
        let cwd = table.processes[proc_idx].cwd;
        if cwd != NO_INODE {
            let _op = fs::LogOperation::new();
            unsafe { fs::iput(cwd) };
        }
        table.processes[proc_idx].cwd = NO_INODE;
    }

    let (parent_idx, init_idx, thread_idx) = {
        let mut table = TABLE.lock();
        let init_idx = table.init_process;
        reparent(&mut table, proc_idx, init_idx);
        let parent_idx = table.processes[proc_idx].parent_index;
        let thread_idx = table.processes[proc_idx].main_thread;
        table.processes[proc_idx].state = EntityState::Zombie;
        table.threads[thread_idx].state = EntityState::Zombie;
        table.threads[thread_idx].retval = status as u64;
        (parent_idx, init_idx, thread_idx)
    };

    // Wake before sched(): once this thread is suspended as a ZOMBIE it
    // never runs again, so any wakeup after sched() would be dead code.
    if parent_idx != NONE {
        scheduler::wakeup(wait_channel(parent_idx));
    }
    scheduler::wakeup(wait_channel(init_idx));

    let mut table = TABLE.lock();
    unsafe { scheduler::sched(&mut table, thread_idx) };
    unreachable!("exited process resumed");
}

/// Scans for a `ZOMBIE` child of `proc_idx`; reaps and returns its pid, or
/// `Err(())` if there are no children or the caller has been killed.
/// Otherwise sleeps on the caller's own wait channel.
pub fn wait(proc_idx: usize) -> Result<u32, ()> {
    loop {
        let mut table = TABLE.lock();
        let mut has_children = false;
        for i in 0..table.processes.len() {
            if table.processes[i].parent_index != proc_idx {
                continue;
            }
            has_children = true;
            if table.processes[i].state == EntityState::Zombie {
                let pid = table.processes[i].pid;
                let main_thread = table.processes[i].main_thread;
                table.threads[main_thread].reset();
                table.processes[i].reset();
                return Ok(pid);
            }
        }
        if !has_children {
            return Err(());
        }
        if table.processes[proc_idx].killed {
            return Err(());
        }
        // `sleep` sees `lk == TABLE.raw()` and leaves the lock held for us;
        // `table` still owns that same acquisition when it drops below.
        scheduler::sleep(wait_channel(proc_idx), TABLE.raw());
    }
}

/// Sets `killed` on the process owning `pid` and wakes any of its
/// sleeping threads (spec section 4.10).
pub fn kill(pid: u32) -> bool {
    let mut table = TABLE.lock();
    let table = &mut *table;
    let Some(proc_idx) = table.processes.iter().position(|p| p.pid == pid && p.state != EntityState::Unused)
    else {
        return false;
    };
    table.processes[proc_idx].killed = true;
    for i in 0..table.threads.len() {
        if table.threads[i].process_index == proc_idx && table.threads[i].state == EntityState::Sleeping {
            table.threads[i].state = EntityState::Runnable;
            table.policy.on_enqueue(&mut table.threads, i);
        }
    }
    true
}

/// Re-sifts every thread of the process owning `pid` to `new_priority`
/// under the active policy (spec section 4.6's `setpriority`). Allowed
/// only if `pid`'s parent is `caller_idx`; `Err(())` if no such process
/// exists, it isn't a child of the caller, or the active policy has no
/// notion of priority.
pub fn setpriority(caller_idx: usize, pid: u32, new_priority: i32) -> Result<(), ()> {
    let mut table = TABLE.lock();
    let table = &mut *table;
    let proc_idx = table
        .processes
        .iter()
        .position(|p| p.pid == pid && p.state != EntityState::Unused)
        .ok_or(())?;
    if table.processes[proc_idx].parent_index != caller_idx {
        return Err(());
    }

    let mut changed_any = false;
    for i in 0..table.threads.len() {
        if table.threads[i].process_index == proc_idx && table.threads[i].state != EntityState::Unused {
            changed_any |= table.policy.on_priority_change(&mut table.threads, i, new_priority).is_ok();
        }
    }
    if changed_any {
        Ok(())
    } else {
        Err(())
    }
}

/// Sets the calling process's `uid`, the effect of a successful `login`
/// (spec section 6). The original's `change_user` wasn't among the
/// retrieved sources; this is the natural reading of its one call site in
/// `sys_login`.
pub fn change_user(proc_idx: usize, uid: u32) {
    TABLE.lock().processes[proc_idx].uid = uid;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_with_no_children_fails() {
        let proc_idx = {
            let mut table = TABLE.lock();
            let idx = table.processes.iter().position(|p| p.state == EntityState::Unused).unwrap();
            table.processes[idx].state = EntityState::Runnable;
            table.processes[idx].pid = 12345;
            idx
        };
        assert_eq!(wait(proc_idx), Err(()));
        TABLE.lock().processes[proc_idx].reset();
    }

    #[test]
    fn kill_marks_and_wakes_sleeping_threads() {
        let (proc_idx, thread_idx) = {
            let mut table = TABLE.lock();
            let proc_idx = table.processes.iter().position(|p| p.state == EntityState::Unused).unwrap();
            table.processes[proc_idx].state = EntityState::Runnable;
            table.processes[proc_idx].pid = 777;
            let thread_idx = table.threads.iter().position(|t| t.state == EntityState::Unused).unwrap();
            table.threads[thread_idx].process_index = proc_idx;
            table.threads[thread_idx].state = EntityState::Sleeping;
            table.threads[thread_idx].chan = 5;
            (proc_idx, thread_idx)
        };
        assert!(kill(777));
        let mut table = TABLE.lock();
        assert!(table.processes[proc_idx].killed);
        assert_eq!(table.threads[thread_idx].state, EntityState::Runnable);
        table.threads[thread_idx].reset();
        table.processes[proc_idx].reset();
    }

    #[test]
    fn setpriority_fails_for_unknown_pid() {
        assert_eq!(setpriority(0, 0xbeef, 1), Err(()));
    }

    #[test]
    fn setpriority_fails_for_non_child() {
        let proc_idx = {
            let mut table = TABLE.lock();
            let idx = table.processes.iter().position(|p| p.state == EntityState::Unused).unwrap();
            table.processes[idx].state = EntityState::Runnable;
            table.processes[idx].pid = 4242;
            table.processes[idx].parent_index = NONE;
            idx
        };
        assert_eq!(setpriority(0, 4242, 1), Err(()));
        TABLE.lock().processes[proc_idx].reset();
    }

    #[test]
    fn change_user_updates_process_uid() {
        let proc_idx = {
            let mut table = TABLE.lock();
            let idx = table.processes.iter().position(|p| p.state == EntityState::Unused).unwrap();
            table.processes[idx].state = EntityState::Runnable;
            idx
        };
        change_user(proc_idx, 42);
        let mut table = TABLE.lock();
        assert_eq!(table.processes[proc_idx].uid, 42);
        table.processes[proc_idx].reset();
    }
}

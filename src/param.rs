//! Compile-time capacity and tuning constants for the scheduling subsystem.
//!
//! Everything here used to also size the filesystem and device tables;
//! those live with the VM/FS collaborators now, so only the numbers the
//! scheduler core actually touches remain.

/// Maximum number of process descriptors.
pub const NPROC: usize = 64;
/// Maximum number of thread descriptors, shared across all processes.
pub const NTHREAD: usize = 128;
/// Maximum number of CPUs.
pub const NCPU: usize = 8;
/// Maximum number of open files per process.
pub const NOFILE: usize = 16;
/// Maximum length of a process name (for debugging).
pub const PROCNAME_LEN: usize = 16;

/// Sentinel index meaning "no entity" (no parent, no owning process, ...).
pub const NONE: usize = usize::MAX;

/// Page size in bytes, for user-stack growth math in [`crate::proc::thread`].
pub const PGSIZE: u64 = 4096;

/// Number of MLFQ priority levels (K in the design doc).
pub const MLFQ_LEVELS: usize = 3;
/// Capacity of each MLFQ level's heap. One extra slot for the slot-0 head cache.
pub const MLFQ_HEAP_CAP: usize = NTHREAD + 1;
/// Number of ticks between global MLFQ priority boosts.
pub const MLFQ_BOOST_INTERVAL: u64 = 100;

/// Time quantum granted on entry to MLFQ level `level`: `2 * level + 2`.
pub const fn mlfq_time_quantum(level: usize) -> u32 {
    2 * level as u32 + 2
}

/// Maximum number of entries in the user table.
pub const NUSER: usize = 10;
/// Maximum length of a username, including the nul terminator.
pub const USERNAME_MAXLEN: usize = 16;
/// Maximum length of a password, including the nul terminator.
pub const USER_PW_MAXLEN: usize = 16;
/// Reserved uid for the root account.
pub const ROOT_UID: u32 = 1;
/// Sentinel uid meaning "slot is empty".
pub const EMPTY_UID: u32 = 0;
/// Path to the persisted user table.
pub const PASSWD_PATH: &str = "/passwd";

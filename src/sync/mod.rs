//! Locking primitives. Spinlocks guard every in-kernel data structure;
//! sleep-locks wrap a condition variable on top of `sleep`/`wakeup` for
//! blocking resources (the user table; in the full system, inodes too).

pub mod sleeplock;
pub mod spinlock;

pub use sleeplock::Sleeplock;
pub use spinlock::Spinlock;

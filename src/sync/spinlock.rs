//! A spinning mutual-exclusion lock that disables interrupts on the
//! current hart for as long as it's held. Generalizes the teacher's
//! free-standing `Spinlock` into `Spinlock<T>` so the data it protects
//! (the table, a counter) lives behind the same guard that enforces
//! the locking discipline instead of beside it.

use crate::collab::trap::{pop_intr_off, push_intr_off};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// The bare locked/unlocked bit, with no data attached. Used where a lock's
/// *identity* matters on its own - e.g. `sleep`'s "is this already the lock
/// I'm about to release?" check - and as the building block for `Spinlock<T>`.
#[repr(C)]
pub struct RawSpinlock {
    locked: AtomicBool,
}
impl RawSpinlock {
    pub const fn new() -> RawSpinlock {
        RawSpinlock {
            locked: AtomicBool::new(false),
        }
    }
    pub unsafe fn acquire(&self) {
        push_intr_off();
        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }
    pub unsafe fn release(&self) {
        self.locked.store(false, Ordering::Release);
        pop_intr_off();
    }
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
impl Default for RawSpinlock {
    fn default() -> Self {
        Self::new()
    }
}
unsafe impl Sync for RawSpinlock {}

/// A spinlock protecting a `T`. Calling [`Spinlock::lock`] requires holding
/// no other spinlock with interrupts disabled exactly once, per entity
/// (the `ncli == 1` invariant `sched` checks before a context switch).
pub struct Spinlock<T> {
    raw: RawSpinlock,
    data: UnsafeCell<T>,
}
impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Spinlock<T> {
        Spinlock {
            raw: RawSpinlock::new(),
            data: UnsafeCell::new(data),
        }
    }
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        unsafe { self.raw.acquire() };
        SpinlockGuard { lock: self }
    }
    /// Exposes the raw lock bit for identity comparisons (e.g. in `sleep`),
    /// not for acquiring it directly.
    pub fn raw(&self) -> &RawSpinlock {
        &self.raw
    }
    /// Mutable access to the protected data from within a held guard, via a
    /// raw pointer rather than a borrow. Needed because `sched` performs a
    /// real stack switch that the borrow checker cannot see through: the
    /// data must still be reachable when control returns here, long after
    /// any safe `&mut` taken before the switch would have to have expired.
    ///
    /// # Safety
    /// Caller must hold this lock.
    pub unsafe fn data_ptr(&self) -> *mut T {
        self.data.get()
    }
}
unsafe impl<T: Send> Sync for Spinlock<T> {}

pub struct SpinlockGuard<'l, T> {
    lock: &'l Spinlock<T>,
}
impl<'l, T> core::ops::Deref for SpinlockGuard<'l, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}
impl<'l, T> core::ops::DerefMut for SpinlockGuard<'l, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}
impl<'l, T> SpinlockGuard<'l, T> {
    pub fn raw(&self) -> &RawSpinlock {
        &self.lock.raw
    }
}
impl<'l, T> Drop for SpinlockGuard<'l, T> {
    fn drop(&mut self) {
        unsafe { self.lock.raw.release() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_derefs_to_data() {
        let lock = Spinlock::new(41);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn raw_lock_tracks_state() {
        let raw = RawSpinlock::new();
        assert!(!raw.is_locked());
        unsafe {
            raw.acquire();
            assert!(raw.is_locked());
            raw.release();
        }
        assert!(!raw.is_locked());
    }
}

//! The lifecycle shared by process and thread descriptors. `SLEEPING` and
//! `RUNNING` only ever appear on threads; a process's own state tracks the
//! coarser `UNUSED -> EMBRYO -> RUNNABLE -> ZOMBIE` arc (see spec section 3).

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EntityState {
    #[default]
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

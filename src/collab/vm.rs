//! Paging / virtual-memory collaborator contract (see spec section 6).
//! The real allocator lives outside this crate; these are the entry
//! points the process/thread lifecycle calls into.

use core::ffi::c_void;

/// Opaque handle to a page table. Null means "no page table".
pub type PageTable = *mut c_void;

extern "C" {
    pub fn setupkvm() -> PageTable;
    pub fn inituvm(pagetable: PageTable, src: *const u8, len: u32);
    /// Returns the new size, or 0 on failure.
    pub fn allocuvm(pagetable: PageTable, old_size: u64, new_size: u64) -> u64;
    /// Returns the new size, or 0 on failure.
    pub fn deallocuvm(pagetable: PageTable, old_size: u64, new_size: u64) -> u64;
    /// Returns a new page table, or null on failure.
    pub fn copyuvm(pagetable: PageTable, size: u64) -> PageTable;
    pub fn freevm(pagetable: PageTable);
    pub fn switchuvm(pagetable: PageTable);
    /// Returns 0 on success, -1 on failure.
    pub fn copyout(pagetable: PageTable, dst_va: u64, src: *const u8, len: u64) -> i32;
    pub fn clearpteu(pagetable: PageTable, va: u64);

    /// Allocates one page-sized kernel stack, returning its opaque handle
    /// (the stack pointer used to seed a thread's context), or 0 on
    /// exhaustion. Physical-page allocation proper belongs to the VM
    /// collaborator even though it isn't part of the paging contract above.
    pub fn alloc_kernel_stack() -> u64;
    pub fn free_kernel_stack(stack: u64);
}

#[cfg(test)]
mod test_stubs {
    use super::*;
    use alloc::boxed::Box;
    use core::ptr::{null_mut, NonNull};

    #[no_mangle]
    extern "C" fn setupkvm() -> PageTable {
        Box::into_raw(Box::new(0u8)) as PageTable
    }
    #[no_mangle]
    extern "C" fn inituvm(_pagetable: PageTable, _src: *const u8, _len: u32) {}
    #[no_mangle]
    extern "C" fn allocuvm(_pagetable: PageTable, _old_size: u64, new_size: u64) -> u64 {
        new_size.max(1)
    }
    #[no_mangle]
    extern "C" fn deallocuvm(_pagetable: PageTable, _old_size: u64, new_size: u64) -> u64 {
        new_size
    }
    #[no_mangle]
    extern "C" fn copyuvm(_pagetable: PageTable, _size: u64) -> PageTable {
        Box::into_raw(Box::new(0u8)) as PageTable
    }
    #[no_mangle]
    extern "C" fn freevm(pagetable: PageTable) {
        if let Some(p) = NonNull::new(pagetable as *mut u8) {
            unsafe { drop(Box::from_raw(p.as_ptr())) };
        }
    }
    #[no_mangle]
    extern "C" fn switchuvm(_pagetable: PageTable) {}
    #[no_mangle]
    extern "C" fn copyout(_pagetable: PageTable, _dst_va: u64, _src: *const u8, _len: u64) -> i32 {
        0
    }
    #[no_mangle]
    extern "C" fn clearpteu(_pagetable: PageTable, _va: u64) {}

    #[no_mangle]
    extern "C" fn alloc_kernel_stack() -> u64 {
        Box::into_raw(Box::new([0u8; 4096])) as *mut u8 as u64
    }
    #[no_mangle]
    extern "C" fn free_kernel_stack(stack: u64) {
        if stack != 0 {
            unsafe { drop(Box::from_raw(stack as *mut [u8; 4096])) };
        }
    }

    #[allow(unused)]
    fn _keep_null_mut() -> PageTable {
        null_mut()
    }
}

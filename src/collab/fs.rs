//! Filesystem / inode-cache collaborator contract (see spec section 6).
//! Opaque handles stand in for `struct inode *` / `struct file *`; the
//! scheduler core only dups, closes and persists through them.

/// Opaque handle into the system-wide open file table.
pub type FileHandle = u32;
/// Opaque handle into the inode cache.
pub type InodeHandle = u32;

/// Sentinel meaning "no file"/"no inode".
pub const NO_FILE: FileHandle = 0;
pub const NO_INODE: InodeHandle = 0;

/// Inode kind for a plain file, passed to `create` (mirrors the
/// filesystem collaborator's `T_FILE`).
pub const T_FILE: i16 = 2;

extern "C" {
    pub fn namei(path: *const u8) -> InodeHandle;
    pub fn create(path: *const u8, kind: i16, major: i16, minor: i16) -> InodeHandle;
    pub fn ilock(ip: InodeHandle);
    pub fn iunlock(ip: InodeHandle);
    pub fn iput(ip: InodeHandle);
    pub fn iunlockput(ip: InodeHandle);
    pub fn idup(ip: InodeHandle) -> InodeHandle;
    pub fn readi(ip: InodeHandle, dst: *mut u8, offset: u32, n: u32) -> i32;
    pub fn writei(ip: InodeHandle, src: *const u8, offset: u32, n: u32) -> i32;
    pub fn iupdate(ip: InodeHandle);
    pub fn begin_op();
    pub fn end_op();
    pub fn filedup(f: FileHandle) -> FileHandle;
    pub fn fileclose(f: FileHandle);
}

/// RAII wrapper around `begin_op`/`end_op`, mirroring the way the teacher
/// scopes log transactions with a guard instead of matched free calls.
pub struct LogOperation;
impl LogOperation {
    pub fn new() -> LogOperation {
        unsafe { begin_op() };
        LogOperation
    }
}
impl Default for LogOperation {
    fn default() -> Self {
        Self::new()
    }
}
impl Drop for LogOperation {
    fn drop(&mut self) {
        unsafe { end_op() };
    }
}

#[cfg(test)]
mod test_stubs {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use std::collections::BTreeMap;
    use std::string::String;
    use std::sync::Mutex;
    use std::vec::Vec;

    // A tiny in-memory filesystem good enough to exercise the user table
    // persistence path in tests: files are byte blobs keyed by inode id.
    static NEXT_INODE: AtomicU32 = AtomicU32::new(1);
    static FILES: Mutex<BTreeMap<InodeHandle, (String, Vec<u8>)>> = Mutex::new(BTreeMap::new());

    fn path_to_string(path: *const u8) -> String {
        unsafe { core::ffi::CStr::from_ptr(path.cast()) }
            .to_string_lossy()
            .into_owned()
    }

    #[no_mangle]
    extern "C" fn namei(path: *const u8) -> InodeHandle {
        let path = path_to_string(path);
        let files = FILES.lock().unwrap();
        for (ino, (p, _)) in files.iter() {
            if *p == path {
                return *ino;
            }
        }
        NO_INODE
    }

    #[no_mangle]
    extern "C" fn create(path: *const u8, _kind: i16, _major: i16, _minor: i16) -> InodeHandle {
        let path = path_to_string(path);
        let ino = NEXT_INODE.fetch_add(1, Ordering::SeqCst);
        FILES.lock().unwrap().insert(ino, (path, Vec::new()));
        ino
    }
    #[no_mangle]
    extern "C" fn ilock(_ip: InodeHandle) {}
    #[no_mangle]
    extern "C" fn iunlock(_ip: InodeHandle) {}
    #[no_mangle]
    extern "C" fn iput(_ip: InodeHandle) {}
    #[no_mangle]
    extern "C" fn iunlockput(_ip: InodeHandle) {}
    #[no_mangle]
    extern "C" fn idup(ip: InodeHandle) -> InodeHandle {
        ip
    }
    #[no_mangle]
    extern "C" fn readi(ip: InodeHandle, dst: *mut u8, offset: u32, n: u32) -> i32 {
        let files = FILES.lock().unwrap();
        let Some((_, data)) = files.get(&ip) else {
            return -1;
        };
        let offset = offset as usize;
        let n = n as usize;
        if offset + n > data.len() {
            return -1;
        }
        unsafe { core::ptr::copy_nonoverlapping(data[offset..offset + n].as_ptr(), dst, n) };
        n as i32
    }
    #[no_mangle]
    extern "C" fn writei(ip: InodeHandle, src: *const u8, offset: u32, n: u32) -> i32 {
        let mut files = FILES.lock().unwrap();
        let Some((_, data)) = files.get_mut(&ip) else {
            return -1;
        };
        let offset = offset as usize;
        let n = n as usize;
        if data.len() < offset + n {
            data.resize(offset + n, 0);
        }
        let src_slice = unsafe { core::slice::from_raw_parts(src, n) };
        data[offset..offset + n].copy_from_slice(src_slice);
        n as i32
    }
    #[no_mangle]
    extern "C" fn iupdate(_ip: InodeHandle) {}
    #[no_mangle]
    extern "C" fn begin_op() {}
    #[no_mangle]
    extern "C" fn end_op() {}
    #[no_mangle]
    extern "C" fn filedup(f: FileHandle) -> FileHandle {
        f
    }
    #[no_mangle]
    extern "C" fn fileclose(_f: FileHandle) {}
}

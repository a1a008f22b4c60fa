//! The user table: username/password/uid records backing `login`,
//! `addUser` and `deleteUser` (spec section 6's on-disk format). A single
//! sleep-lock serializes mutators the same way the filesystem's inode
//! locks do, since a mutator's round trip to disk can block.

use crate::collab::fs::{self, InodeHandle, NO_INODE, T_FILE};
use crate::param::{EMPTY_UID, NUSER, PASSWD_PATH, ROOT_UID, USERNAME_MAXLEN, USER_PW_MAXLEN};
use crate::proc::process;
use crate::sync::sleeplock::Sleeplock;
use arrayvec::ArrayVec;

const RECORD_SIZE: usize = USERNAME_MAXLEN + USER_PW_MAXLEN + 4;
const TABLE_BLOB_SIZE: usize = 4 + NUSER * RECORD_SIZE;

/// `PASSWD_PATH` nul-terminated for the `namei`/`create` collaborators.
const PASSWD_PATH_C: &[u8] = b"/passwd\0";

#[derive(Copy, Clone, PartialEq, Eq)]
struct UserRecord {
    username: [u8; USERNAME_MAXLEN],
    password: [u8; USER_PW_MAXLEN],
    uid: u32,
}
impl UserRecord {
    const fn empty() -> UserRecord {
        UserRecord {
            username: [0; USERNAME_MAXLEN],
            password: [0; USER_PW_MAXLEN],
            uid: EMPTY_UID,
        }
    }

    fn root() -> UserRecord {
        UserRecord {
            username: pack_field(b"root"),
            password: pack_field(b"0000"),
            uid: ROOT_UID,
        }
    }
}

struct UserTable {
    initialized: bool,
    next_uid: u32,
    records: [UserRecord; NUSER],
    inode: InodeHandle,
}
impl UserTable {
    const fn new() -> UserTable {
        UserTable {
            initialized: false,
            next_uid: ROOT_UID + 1,
            records: [UserRecord::empty(); NUSER],
            inode: NO_INODE,
        }
    }
}

pub static UTABLE: Sleeplock<UserTable> = Sleeplock::new(UserTable::new());

/// Zero-pads (or truncates) `s` into a fixed-width field. Built on
/// `arrayvec` rather than a hand-rolled loop, the same way a caller would
/// assemble a bounded on-the-wire record before handing it to `writei`.
fn pack_field<const N: usize>(s: &[u8]) -> [u8; N] {
    let mut buf: ArrayVec<u8, N> = ArrayVec::new();
    let n = s.len().min(N);
    buf.try_extend_from_slice(&s[..n]).expect("n <= N by construction");
    while buf.len() < N {
        buf.push(0);
    }
    buf.into_inner().unwrap_or([0; N])
}

fn is_valid_username(s: &[u8]) -> bool {
    (2..USERNAME_MAXLEN).contains(&s.len())
}
fn is_valid_passwd(s: &[u8]) -> bool {
    (2..USER_PW_MAXLEN).contains(&s.len())
}

fn find_by_username(table: &UserTable, username: &[u8]) -> Option<usize> {
    let packed = pack_field::<USERNAME_MAXLEN>(username);
    table.records.iter().position(|r| r.uid != EMPTY_UID && r.username == packed)
}
fn find_by_uid(table: &UserTable, uid: u32) -> Option<usize> {
    table.records.iter().position(|r| r.uid != EMPTY_UID && r.uid == uid)
}

fn serialize(next_uid: u32, records: &[UserRecord; NUSER]) -> ArrayVec<u8, TABLE_BLOB_SIZE> {
    let mut blob = ArrayVec::new();
    blob.try_extend_from_slice(&next_uid.to_le_bytes()).unwrap();
    for r in records {
        blob.try_extend_from_slice(&r.username).unwrap();
        blob.try_extend_from_slice(&r.password).unwrap();
        blob.try_extend_from_slice(&r.uid.to_le_bytes()).unwrap();
    }
    blob
}

fn deserialize(buf: &[u8; TABLE_BLOB_SIZE]) -> (u32, [UserRecord; NUSER]) {
    let next_uid = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let mut records = [UserRecord::empty(); NUSER];
    let mut off = 4;
    for r in records.iter_mut() {
        r.username.copy_from_slice(&buf[off..off + USERNAME_MAXLEN]);
        off += USERNAME_MAXLEN;
        r.password.copy_from_slice(&buf[off..off + USER_PW_MAXLEN]);
        off += USER_PW_MAXLEN;
        r.uid = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
    }
    (next_uid, records)
}

/// Writes `table`'s in-memory state out to `ip`. Caller must already hold
/// both `UTABLE` and a log transaction (or the inode's own creation
/// transaction) around this call.
fn write_locked(table: &UserTable, ip: InodeHandle) {
    let blob = serialize(table.next_uid, &table.records);
    unsafe { fs::ilock(ip) };
    let n = unsafe { fs::writei(ip, blob.as_ptr(), 0, blob.len() as u32) };
    unsafe { fs::iunlock(ip) };
    if n != blob.len() as i32 {
        crate::console::kpanic("failed to write user table");
    }
}

/// Persists `table` to its backing inode inside its own log transaction
/// (spec 4.10's "fixed point of parse . write"), the way a mutator that
/// isn't already inside one needs to.
fn export_locked(table: &mut UserTable) {
    let _op = fs::LogOperation::new();
    write_locked(table, table.inode);
}

/// Loads `/passwd`, creating it (with only `root`/`0000`) if it doesn't
/// exist yet. Idempotent: a second call fails with `Err(())`.
pub fn init_usertable() -> Result<(), ()> {
    debug_assert_eq!(PASSWD_PATH.as_bytes(), &PASSWD_PATH_C[..PASSWD_PATH_C.len() - 1]);

    let mut table = UTABLE.lock();
    if table.initialized {
        return Err(());
    }

    let _op = fs::LogOperation::new();
    let mut ip = unsafe { fs::namei(PASSWD_PATH_C.as_ptr()) };
    if ip == NO_INODE {
        ip = unsafe { fs::create(PASSWD_PATH_C.as_ptr(), T_FILE, 0, 0) };
        if ip == NO_INODE {
            crate::console::kpanic("failed to create user table");
        }
        table.next_uid = ROOT_UID + 1;
        table.records = [UserRecord::empty(); NUSER];
        table.records[0] = UserRecord::root();
        table.inode = ip;
        write_locked(&table, ip);
    } else {
        unsafe { fs::ilock(ip) };
        let mut buf = [0u8; TABLE_BLOB_SIZE];
        let n = unsafe { fs::readi(ip, buf.as_mut_ptr(), 0, TABLE_BLOB_SIZE as u32) };
        unsafe { fs::iunlock(ip) };
        if n != TABLE_BLOB_SIZE as i32 {
            crate::console::kpanic("failed to read user table");
        }
        let (next_uid, records) = deserialize(&buf);
        table.next_uid = next_uid;
        table.records = records;
        table.inode = ip;
    }

    table.initialized = true;
    Ok(())
}

/// Looks up `uid` for (`username`, `password`), or `EMPTY_UID` if either
/// field is out of bounds, the name isn't registered, or the password
/// doesn't match. Unlike the source this is grounded on, the lock here is
/// a guard acquired after validation and dropped automatically - there's
/// no path that can release a lock it never took.
fn getuid(username: &[u8], password: &[u8]) -> u32 {
    if !is_valid_username(username) || !is_valid_passwd(password) {
        return EMPTY_UID;
    }
    let table = UTABLE.lock();
    let Some(idx) = find_by_username(&table, username) else {
        return EMPTY_UID;
    };
    if table.records[idx].password != pack_field::<USER_PW_MAXLEN>(password) {
        return EMPTY_UID;
    }
    table.records[idx].uid
}

/// Authenticates `username`/`password` and, on success, sets the calling
/// process's `uid` to the matched account.
pub fn login(proc_idx: usize, username: &[u8], password: &[u8]) -> Result<u32, ()> {
    let uid = getuid(username, password);
    if uid == EMPTY_UID {
        return Err(());
    }
    process::change_user(proc_idx, uid);
    Ok(uid)
}

/// Registers a new account, persisting the table on success. Rejects
/// invalid lengths, duplicate names, and a full table.
pub fn add_user(username: &[u8], password: &[u8]) -> Result<u32, ()> {
    if !is_valid_username(username) || !is_valid_passwd(password) {
        return Err(());
    }
    let mut table = UTABLE.lock();
    if find_by_username(&table, username).is_some() {
        return Err(());
    }
    let slot = table.records.iter().position(|r| r.uid == EMPTY_UID).ok_or(())?;

    let uid = table.next_uid;
    table.next_uid += 1;
    table.records[slot] = UserRecord {
        username: pack_field(username),
        password: pack_field(password),
        uid,
    };
    export_locked(&mut table);
    Ok(uid)
}

/// Removes an account by name. `root` can never be deleted.
pub fn delete_user(username: &[u8]) -> Result<(), ()> {
    if !is_valid_username(username) || username == b"root" {
        return Err(());
    }
    let mut table = UTABLE.lock();
    let idx = find_by_username(&table, username).ok_or(())?;
    table.records[idx] = UserRecord::empty();
    export_locked(&mut table);
    Ok(())
}

/// Fills `out` with the username owning `uid`, for resolving a process's
/// `uid` back to a display name.
pub fn get_username_with_uid(uid: u32, out: &mut [u8; USERNAME_MAXLEN]) -> Result<(), ()> {
    let table = UTABLE.lock();
    let idx = find_by_uid(&table, uid).ok_or(())?;
    *out = table.records[idx].username;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_table() {
        let mut table = UTABLE.lock();
        *table = UserTable::new();
    }

    #[test]
    fn boots_with_only_root() {
        reset_table();
        init_usertable().unwrap();
        assert_eq!(getuid(b"root", b"0000"), ROOT_UID);
        assert_eq!(getuid(b"root", b"wrong"), EMPTY_UID);
        assert_eq!(init_usertable(), Err(()));
    }

    #[test]
    fn add_then_login_then_delete_then_login_fails() {
        reset_table();
        init_usertable().unwrap();

        let uid = add_user(b"alice", b"hunter2").unwrap();
        assert_ne!(uid, EMPTY_UID);
        assert_eq!(getuid(b"alice", b"hunter2"), uid);

        assert_eq!(add_user(b"alice", b"other"), Err(()));

        delete_user(b"alice").unwrap();
        assert_eq!(getuid(b"alice", b"hunter2"), EMPTY_UID);
    }

    #[test]
    fn root_cannot_be_deleted() {
        reset_table();
        init_usertable().unwrap();
        assert_eq!(delete_user(b"root"), Err(()));
    }

    #[test]
    fn persists_across_reinit_after_reset() {
        reset_table();
        init_usertable().unwrap();
        add_user(b"bob", b"password").unwrap();

        // Simulate a reboot: drop the in-memory cache but keep the same
        // backing inode, then re-read it from "disk".
        {
            let mut table = UTABLE.lock();
            table.initialized = false;
            table.next_uid = ROOT_UID + 1;
            table.records = [UserRecord::empty(); NUSER];
        }
        init_usertable().unwrap();

        assert_ne!(getuid(b"bob", b"password"), EMPTY_UID);
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        reset_table();
        init_usertable().unwrap();
        assert_eq!(add_user(b"a", b"pw"), Err(()));
        assert_eq!(add_user(b"validname", b"p"), Err(()));
    }
}

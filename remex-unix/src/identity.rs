//! Privilege drop for child processes.

use std::ffi::CStr;

/// Switch the process to the given user: supplementary groups first, then
/// the gid, then the uid. Runs between fork and exec, so it goes through
/// libc directly. Must be called while still privileged; on failure the
/// process may be partially switched and the caller has to abort.
pub fn drop_privileges(user: &CStr, uid: u32, gid: u32) -> std::io::Result<()> {
    // SAFETY: `user` is a valid nul-terminated string for the duration of
    // the call; initgroups only reads it.
    let ret = unsafe { libc::initgroups(user.as_ptr(), gid as _) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: plain syscall wrappers with no pointer arguments.
    let ret = unsafe { libc::setgid(gid as libc::gid_t) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    let ret = unsafe { libc::setuid(uid as libc::uid_t) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

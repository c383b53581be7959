//! Launching the child: socket pairs, fork, child-side setup, exec.
//!
//! Everything the child needs — argv, environment, the run-as identity —
//! is prepared before fork, because between fork and exec only
//! async-signal-safe calls are allowed. The child talks to the parent
//! over stream socket pairs: one for stdin/stdout (plus stderr under
//! protocol version one), a second for stderr under version two.

use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use libc::c_char;
use nix::unistd::{fork, ForkResult};
use tokio::net::UnixStream;
use tracing::debug;

use remex_unix::identity::drop_privileges;
use remex_unix::process::close_fd_range;
use remex_unix::socket::stream_socketpair;

use super::Process;
use crate::command::CommandLine;
use crate::config::Rule;
use crate::errors::{EngineError, Result};

/// Exit status of a child that failed before or at exec: -1 as an
/// unsigned octet, distinguishable from a command's own exit 1.
const CHILD_EXEC_FAILURE: i32 = 255;

/// Environment variables owned by the engine; any inherited values are
/// replaced. These names are an interface contract with user commands.
const ENGINE_VARS: [&str; 5] = [
    "REMUSER",
    "REMOTE_USER",
    "REMOTE_ADDR",
    "REMOTE_HOST",
    "REMCTL_COMMAND",
];

pub(crate) struct SpawnParams<'a> {
    pub rule: &'a Rule,
    pub cmdline: CommandLine,
    /// Command token exported as `REMCTL_COMMAND`.
    pub command: &'a str,
    pub user: &'a str,
    pub ip_address: &'a str,
    pub hostname: Option<&'a str>,
    /// Give stderr its own socket pair (protocol version two and later).
    pub separate_stderr: bool,
}

/// Fork and exec the rule's program. On success the parent ends are
/// nonblocking and registered with the runtime, ready for the pump; the
/// child ends are closed in the parent.
///
/// A failure here means no child exists (socketpair or fork failed, or
/// the request could not be turned into an exec image); failures inside
/// the child after fork surface as exit status 255 instead.
pub(crate) fn spawn_child(params: SpawnParams<'_>) -> Result<Process> {
    let SpawnParams {
        rule,
        cmdline,
        command,
        user,
        ip_address,
        hostname,
        separate_stderr,
    } = params;

    let program = CString::new(rule.program.as_os_str().as_bytes().to_vec())
        .map_err(|_| EngineError::ChildSetup("program path contains a nul octet".to_string()))?;
    let argv: Vec<CString> = cmdline
        .argv
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes().to_vec())
                .map_err(|_| EngineError::ChildSetup("argument contains a nul octet".to_string()))
        })
        .collect::<Result<_>>()?;
    let envp = build_envp(command, user, ip_address, hostname)?;
    let run_as = match rule.run_as.as_ref().filter(|id| id.uid > 0) {
        Some(id) => Some((
            CString::new(id.user.as_str()).map_err(|_| {
                EngineError::ChildSetup("run-as user contains a nul octet".to_string())
            })?,
            id.uid,
            id.gid,
        )),
        None => None,
    };

    let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());
    let mut envp_ptrs: Vec<*const c_char> = envp.iter().map(|e| e.as_ptr()).collect();
    envp_ptrs.push(std::ptr::null());

    let (inout_parent, inout_child) =
        stream_socketpair().map_err(|source| EngineError::SocketPair {
            purpose: "stdin/stdout",
            source,
        })?;
    let stderr_pair = if separate_stderr {
        Some(
            stream_socketpair().map_err(|source| EngineError::SocketPair {
                purpose: "stderr",
                source,
            })?,
        )
    } else {
        None
    };

    let has_input = cmdline.stdin_payload.is_some();
    let (stderr_parent_fd, stderr_child_fd) = match &stderr_pair {
        Some((p, c)) => (p.as_raw_fd(), c.as_raw_fd()),
        None => (-1, -1),
    };

    // SAFETY: the child branch calls only async-signal-safe functions
    // (close/dup2/open/setgid/setuid/execve/_exit via child_exec) and
    // never returns; everything it touches was allocated before the fork.
    match unsafe { fork() }.map_err(|source| EngineError::Fork { source })? {
        ForkResult::Child => child_exec(
            inout_parent.as_raw_fd(),
            inout_child.as_raw_fd(),
            stderr_parent_fd,
            stderr_child_fd,
            has_input,
            &program,
            &argv_ptrs,
            &envp_ptrs,
            run_as.as_ref(),
        ),
        ForkResult::Parent { child } => {
            drop(inout_child);
            let stderr_parent = stderr_pair.map(|(parent, child_end)| {
                drop(child_end);
                parent
            });

            let stdinout = into_nonblocking_stream(inout_parent)?;
            let stderr = stderr_parent.map(into_nonblocking_stream).transpose()?;

            debug!(
                pid = child.as_raw(),
                program = %rule.program.display(),
                "launched child process"
            );
            Ok(Process {
                pid: child,
                status: 0,
                reaped: false,
                stdin_payload: cmdline.stdin_payload,
                stdinout: Some(stdinout),
                stderr,
                output: Vec::new(),
            })
        }
    }
}

/// Child-side setup between fork and exec. Restricted to
/// async-signal-safe calls; on any failure the child exits 255 without
/// writing anything about the command to its output streams.
fn child_exec(
    inout_parent_fd: RawFd,
    inout_child_fd: RawFd,
    stderr_parent_fd: RawFd,
    stderr_child_fd: RawFd,
    has_input: bool,
    program: &CStr,
    argv: &[*const c_char],
    envp: &[*const c_char],
    run_as: Option<&(CString, u32, u32)>,
) -> ! {
    // SAFETY: runs in the forked child before exec, so only
    // async-signal-safe calls are allowed and nothing here allocates.
    // The raw fds are the still-open socketpair ends inherited from the
    // parent, the argv/envp pointer arrays are nul-terminated views into
    // CStrings built before the fork, and every failure path ends in
    // _exit, so no Rust destructor ever runs in the child.
    unsafe {
        libc::close(inout_parent_fd);
        if stderr_parent_fd >= 0 {
            libc::close(stderr_parent_fd);
        }

        // Stdin is the socket when there is input to feed, /dev/null
        // otherwise so the command sees immediate EOF. A failed open is
        // tolerated: fd 0 then stays closed.
        if has_input {
            if libc::dup2(inout_child_fd, 0) < 0 {
                libc::_exit(CHILD_EXEC_FAILURE);
            }
        } else {
            libc::close(0);
            let fd = libc::open(c"/dev/null".as_ptr(), libc::O_RDONLY);
            if fd > 0 {
                libc::dup2(fd, 0);
                libc::close(fd);
            }
        }

        if libc::dup2(inout_child_fd, 1) < 0 {
            libc::_exit(CHILD_EXEC_FAILURE);
        }
        if stderr_child_fd >= 0 {
            if libc::dup2(stderr_child_fd, 2) < 0 {
                libc::_exit(CHILD_EXEC_FAILURE);
            }
            libc::close(stderr_child_fd);
        } else if libc::dup2(inout_child_fd, 2) < 0 {
            libc::_exit(CHILD_EXEC_FAILURE);
        }
        libc::close(inout_child_fd);

        // Descriptors leaked by host libraries that don't set
        // close-on-exec must not reach the command.
        close_fd_range(3, 16);

        // The host runtime ignores SIGPIPE process-wide and ignored
        // dispositions survive exec; the command must see the default.
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        if let Some((user, uid, gid)) = run_as {
            if drop_privileges(user, *uid, *gid).is_err() {
                libc::_exit(CHILD_EXEC_FAILURE);
            }
        }

        libc::execve(program.as_ptr(), argv.as_ptr(), envp.as_ptr());
        libc::_exit(CHILD_EXEC_FAILURE);
    }
}

/// Environment for the child: the server's own environment plus the
/// connection variables user commands rely on. `REMUSER` is kept
/// alongside `REMOTE_USER` for compatibility with older clients.
fn build_envp(
    command: &str,
    user: &str,
    ip_address: &str,
    hostname: Option<&str>,
) -> Result<Vec<CString>> {
    let mut envp = Vec::new();
    for (key, value) in std::env::vars_os() {
        if key
            .to_str()
            .is_some_and(|k| ENGINE_VARS.contains(&k))
        {
            continue;
        }
        let mut entry = key.into_encoded_bytes();
        entry.push(b'=');
        entry.extend(value.into_encoded_bytes());
        if let Ok(entry) = CString::new(entry) {
            envp.push(entry);
        }
    }
    envp.push(env_entry("REMUSER", user)?);
    envp.push(env_entry("REMOTE_USER", user)?);
    envp.push(env_entry("REMOTE_ADDR", ip_address)?);
    if let Some(hostname) = hostname {
        envp.push(env_entry("REMOTE_HOST", hostname)?);
    }
    envp.push(env_entry("REMCTL_COMMAND", command)?);
    Ok(envp)
}

fn env_entry(key: &str, value: &str) -> Result<CString> {
    CString::new(format!("{key}={value}"))
        .map_err(|_| EngineError::ChildSetup(format!("{key} value contains a nul octet")))
}

/// Hand a parent-side socket end to the runtime as a nonblocking stream.
fn into_nonblocking_stream(fd: OwnedFd) -> Result<UnixStream> {
    let stream = std::os::unix::net::UnixStream::from(fd);
    stream
        .set_nonblocking(true)
        .map_err(|source| EngineError::Channel { source })?;
    UnixStream::from_std(stream).map_err(|source| EngineError::Channel { source })
}

//! Pseudo-terminal (PTY) allocation and child process plumbing.
//!
//! Scripts run under a PTY so interpreters behave as if attached to an
//! interactive terminal (colour output, line buffering, prompts).

use anyhow::{anyhow, Result};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::ptr;

/// Everything the child needs, converted to C strings before `fork`.
pub(super) struct ChildSpec {
    pub(super) argv: Vec<CString>,
    pub(super) envp: Vec<CString>,
    pub(super) working_dir: CString,
}

/// Forks and execs a child process under a new PTY.
///
/// # Safety
///
/// This function performs low-level PTY allocation and process forking.
/// The caller must ensure:
/// - `spec` holds valid null-terminated C strings and a non-empty `argv`
/// - The returned file descriptor is eventually closed
/// - The returned pid is eventually reaped
///
/// The child process calls `_exit(127)` on any setup failure to avoid
/// undefined behavior from returning after `fork()`.
pub(super) unsafe fn spawn_pty_child(spec: &ChildSpec, rows: u16, cols: u16) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut winsize: libc::winsize = mem::zeroed();
    winsize.ws_row = rows.max(1);
    winsize.ws_col = cols.max(1);

    // Pointer arrays are built before fork so the child never allocates.
    let mut argv_ptrs: Vec<*const libc::c_char> = spec.argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());
    let mut envp_ptrs: Vec<*const libc::c_char> = spec.envp.iter().map(|s| s.as_ptr()).collect();
    envp_ptrs.push(ptr::null());

    #[allow(clippy::unnecessary_mut_passed)]
    // SAFETY: openpty expects valid pointers for master/slave/winsize; we pass stack locals.
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }

    // SAFETY: fork is called before any unsafe Rust invariants are relied on.
    let pid = libc::fork();
    if pid < 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(errno_error("fork failed"));
    }

    if pid == 0 {
        close_fd(master_fd);
        child_exec(slave_fd, &argv_ptrs, &envp_ptrs, &spec.working_dir);
    }

    close_fd(slave_fd);
    Ok((master_fd, pid))
}

/// Child process setup after fork: makes the PTY the controlling terminal and execs.
///
/// # Safety
///
/// Must only be called in the child process after `fork()`. This function
/// never returns: it either calls `execve()` or `_exit(127)`.
unsafe fn child_exec(
    slave_fd: RawFd,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
    working_dir: &CString,
) -> ! {
    let fail = |context: &[u8]| -> ! {
        // SAFETY: write is async-signal-safe and stderr is valid once dup2 ran (or inherited).
        let _ = libc::write(
            libc::STDERR_FILENO,
            context.as_ptr() as *const libc::c_void,
            context.len(),
        );
        libc::_exit(127);
    };

    if libc::setsid() == -1 {
        fail(b"rundown: setsid failed\n");
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
        fail(b"rundown: ioctl(TIOCSCTTY) failed\n");
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail(b"rundown: dup2 failed\n");
    }
    if slave_fd > libc::STDERR_FILENO {
        close_fd(slave_fd);
    }

    if libc::chdir(working_dir.as_ptr()) != 0 {
        fail(b"rundown: chdir failed\n");
    }

    // The Rust runtime ignores SIGPIPE; scripts expect the default disposition.
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);

    libc::execve(argv[0], argv.as_ptr(), envp.as_ptr());
    fail(b"rundown: execve failed\n");
}

/// Configure the PTY master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFL) failed"));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error("fcntl(F_SETFL) failed"));
    }
    Ok(())
}

/// Helper that formats OS errors with additional context.
pub(super) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or -1 to ignore).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}

/// Apply a window size to the PTY.
pub(super) fn set_winsize(master_fd: RawFd, rows: u16, cols: u16) -> Result<()> {
    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut ws: libc::winsize = unsafe { mem::zeroed() };
    ws.ws_row = rows.max(1);
    ws.ws_col = cols.max(1);
    // SAFETY: master_fd is open for the lifetime of the runner; ws is a valid winsize.
    let result = unsafe { libc::ioctl(master_fd, libc::TIOCSWINSZ, &ws) };
    if result != 0 {
        return Err(errno_error("ioctl(TIOCSWINSZ) failed"));
    }
    Ok(())
}

/// Block until `child_pid` exits; retries on EINTR.
pub(super) fn wait_child(child_pid: i32) -> Result<ExitStatus> {
    let mut status = 0;
    loop {
        // SAFETY: child_pid was forked by this runner and has not been reaped yet.
        let ret = unsafe { libc::waitpid(child_pid, &mut status, 0) };
        if ret == child_pid {
            return Ok(ExitStatus::from_raw(status));
        }
        let err = io::Error::last_os_error();
        if ret < 0 && err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(anyhow!("waitpid({child_pid}) failed: {err}"));
    }
}

/// Shell convention: the exit code, or 128 + signal number for signalled children.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

//! Kernel interface
//!
//! The process primitives the manager needs, behind a trait so the
//! scheduler and supervisor can run against a fake in tests.

use std::ffi::{CString, NulError};
use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execve, fork, ForkResult, Pid};

pub const LINUX_REBOOT_MAGIC1: libc::c_int = 0xfee1dead_u32 as libc::c_int;
pub const LINUX_REBOOT_MAGIC2: libc::c_int = 672274793;
pub const LINUX_REBOOT_CMD_POWER_OFF: libc::c_int = 0x4321fedc;
pub const LINUX_REBOOT_CMD_RESTART: libc::c_int = 0x01234567;

/// Status a child left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal
    Signaled(i32),
}

impl ExitStatus {
    /// Exit code, if the process exited normally
    pub fn code(self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(code),
            ExitStatus::Signaled(_) => None,
        }
    }

    pub fn success(self) -> bool {
        self == ExitStatus::Exited(0)
    }

    fn from_wait_status(status: WaitStatus) -> Option<(Pid, Self)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, ExitStatus::Exited(code))),
            WaitStatus::Signaled(pid, signal, _) => Some((pid, ExitStatus::Signaled(signal as i32))),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit {}", code),
            ExitStatus::Signaled(sig) => write!(f, "signal {}", sig),
        }
    }
}

/// Command code for the reboot syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootCommand {
    PowerOff,
    Restart,
}

impl RebootCommand {
    pub fn code(self) -> libc::c_int {
        match self {
            RebootCommand::PowerOff => LINUX_REBOOT_CMD_POWER_OFF,
            RebootCommand::Restart => LINUX_REBOOT_CMD_RESTART,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] NulError),

    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),
}

/// Process primitives used by the manager
pub trait Kernel {
    /// fork + execve. A child whose exec fails exits with status 127; the
    /// caller only learns about it when the child is reaped.
    fn spawn(&self, argv: &[String], envp: &[String]) -> Result<Pid, SpawnError>;

    /// Reap one exited child without blocking. `Ok(None)` means children
    /// exist but none has exited; `Err(ECHILD)` means there are no children.
    fn try_wait_any(&self) -> nix::Result<Option<(Pid, ExitStatus)>>;

    /// Block the whole thread until `pid` exits
    fn wait_blocking(&self, pid: Pid) -> nix::Result<ExitStatus>;

    /// Send `signal` to every process except ourselves
    fn signal_all(&self, signal: Signal) -> nix::Result<()>;

    /// Flush filesystem buffers
    fn sync(&self);

    /// Ask the kernel to restart or power off. Only returns on failure.
    fn reboot(&self, cmd: RebootCommand) -> nix::Result<()>;
}

/// The real thing
#[derive(Debug, Default)]
pub struct LinuxKernel;

impl Kernel for LinuxKernel {
    fn spawn(&self, argv: &[String], envp: &[String]) -> Result<Pid, SpawnError> {
        let program = argv.first().ok_or(SpawnError::EmptyCommand)?;

        // Everything the child touches is allocated before fork
        let path = CString::new(program.as_str())?;
        let args = argv
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let env = envp
            .iter()
            .map(|e| CString::new(e.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        // SAFETY: the child only calls execve and _exit, both async-signal-safe
        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => {
                let _ = execve(&path, &args, &env);
                unsafe { libc::_exit(127) }
            }
        }
    }

    fn try_wait_any(&self) -> nix::Result<Option<(Pid, ExitStatus)>> {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG))? {
                WaitStatus::StillAlive => return Ok(None),
                status => {
                    if let Some(reaped) = ExitStatus::from_wait_status(status) {
                        return Ok(Some(reaped));
                    }
                    // Stopped/continued notifications: keep looking
                }
            }
        }
    }

    fn wait_blocking(&self, pid: Pid) -> nix::Result<ExitStatus> {
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some((_, exit)) = ExitStatus::from_wait_status(status) {
                        return Ok(exit);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn signal_all(&self, signal: Signal) -> nix::Result<()> {
        kill(Pid::from_raw(-1), signal)
    }

    fn sync(&self) {
        nix::unistd::sync();
    }

    fn reboot(&self, cmd: RebootCommand) -> nix::Result<()> {
        // Raw syscall so the magic numbers are explicit
        let ret = unsafe {
            libc::syscall(
                libc::SYS_reboot,
                LINUX_REBOOT_MAGIC1,
                LINUX_REBOOT_MAGIC2,
                cmd.code(),
                std::ptr::null::<libc::c_void>(),
            )
        };
        Errno::result(ret).map(drop)
    }
}

//! PID 1 functionality
//!
//! Handles responsibilities specific to running as init (PID 1):
//! - Kernel process primitives (fork/exec/wait/reboot)
//! - Mounting essential filesystems and bringing up loopback
//! - The boot sequence and rescue shell
//! - Orderly shutdown

mod host;
mod kernel;
mod lifecycle;
mod mount;
mod network;
mod shutdown;
mod signals;

pub use host::{Host, HostError, LinuxHost};
pub use kernel::{
    ExitStatus, Kernel, LinuxKernel, RebootCommand, SpawnError, LINUX_REBOOT_CMD_POWER_OFF,
    LINUX_REBOOT_CMD_RESTART, LINUX_REBOOT_MAGIC1, LINUX_REBOOT_MAGIC2,
};
pub use lifecycle::RescueOutcome;
pub use mount::MountError;
pub use network::NetworkError;
pub use shutdown::{request_power_state, shutdown};
pub use signals::{ChildEvents, SignalHandler};

use std::process;

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    process::id() == 1
}

//! Signal handling for PID 1
//!
//! - SIGCHLD: wakes the reap loop early
//! - SIGTERM: power off
//! - SIGINT: reboot (Ctrl+Alt+Del)

use tokio::signal::unix::{signal, Signal, SignalKind};

use super::kernel::RebootCommand;

/// SIGCHLD notifications for the reap loop
pub struct ChildEvents {
    sigchld: Signal,
}

impl ChildEvents {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigchld: signal(SignalKind::child())?,
        })
    }

    /// Wait until at least one child changed state since the last call
    pub async fn recv(&mut self) {
        self.sigchld.recv().await;
    }
}

/// Shutdown requests delivered as signals
pub struct SignalHandler {
    sigterm: Signal,
    sigint: Signal,
}

impl SignalHandler {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next shutdown request
    pub async fn wait(&mut self) -> RebootCommand {
        tokio::select! {
            _ = self.sigterm.recv() => RebootCommand::PowerOff,
            _ = self.sigint.recv() => RebootCommand::Restart,
        }
    }
}

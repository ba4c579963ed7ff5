//! Reboot and power-off for PID 1
//!
//! 1. Send SIGTERM to remaining processes
//! 2. Wait briefly for graceful exit
//! 3. Send SIGKILL to stragglers
//! 4. Sync filesystems
//! 5. Call reboot() syscall

use std::time::Duration;
use tokio::time::sleep;

use nix::sys::signal::Signal;

use super::kernel::{Kernel, RebootCommand};

/// Execute the shutdown sequence. PID 1 never returns from here.
pub async fn shutdown(kernel: &dyn Kernel, cmd: RebootCommand, grace: Duration) -> ! {
    if let Err(e) = request_power_state(kernel, cmd, grace).await {
        log::error!("reboot() failed: {}", e);
    }
    // The kernel is expected to act before we get here
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// Everything up to and including the reboot syscall
pub async fn request_power_state(
    kernel: &dyn Kernel,
    cmd: RebootCommand,
    grace: Duration,
) -> nix::Result<()> {
    match cmd {
        RebootCommand::Restart => log::info!("Rebooting..."),
        RebootCommand::PowerOff => log::info!("Powering off..."),
    }

    terminate_all_processes(kernel, grace).await;

    log::info!("Syncing filesystems");
    kernel.sync();

    kernel.reboot(cmd)
}

/// Send SIGTERM then SIGKILL to all processes
async fn terminate_all_processes(kernel: &dyn Kernel, grace: Duration) {
    log::info!("Sending SIGTERM to all processes");
    if let Err(e) = kernel.signal_all(Signal::SIGTERM) {
        // ESRCH: nothing left to signal
        log::debug!("kill(-1, SIGTERM): {}", e);
        return;
    }

    sleep(grace).await;

    log::info!("Sending SIGKILL to remaining processes");
    let _ = kernel.signal_all(Signal::SIGKILL);

    // Brief pause for kernel cleanup
    sleep(Duration::from_millis(100)).await;
}

//! Boot sequence, interactive session and rescue shell

use std::rc::Rc;

use tokio::task::spawn_local;

use super::kernel::{ExitStatus, RebootCommand};
use super::shutdown::shutdown;
use super::signals::SignalHandler;
use crate::manager::{Manager, StartError};

/// What the operator asked for when leaving the rescue shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescueOutcome {
    /// `exit`: carry on with whatever is still running
    Resume,
    /// `exit 2`
    Reboot,
    /// `exit 3`
    PowerOff,
}

impl RescueOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(2) => Self::Reboot,
            Some(3) => Self::PowerOff,
            _ => Self::Resume,
        }
    }
}

impl Manager {
    /// Start the boot chain and the session side by side
    pub fn boot(self: &Rc<Self>) {
        log::info!("Booting...");
        spawn_local(Rc::clone(self).run_boot_chain());
        spawn_local(Rc::clone(self).run_session());
    }

    /// Power off or reboot when SIGTERM or SIGINT arrives
    pub fn watch_signals(self: &Rc<Self>, mut handler: SignalHandler) {
        let this = Rc::clone(self);
        spawn_local(async move {
            let cmd = handler.wait().await;
            this.power(cmd).await;
        });
    }

    async fn run_boot_chain(self: Rc<Self>) {
        match self.reach_boot_target().await {
            None | Some(RescueOutcome::Resume) => {}
            Some(RescueOutcome::Reboot) => self.power(RebootCommand::Restart).await,
            Some(RescueOutcome::PowerOff) => self.power(RebootCommand::PowerOff).await,
        }
    }

    /// Start the boot target; on failure, hand over to the rescue shell
    pub(crate) async fn reach_boot_target(self: &Rc<Self>) -> Option<RescueOutcome> {
        let target = self.config().boot_target.clone();
        match self.start_unit(&target, &[]).wait().await {
            Ok(()) => {
                log::info!("Boot target {} reached", target);
                None
            }
            Err(e) => {
                log::error!("Boot error: {}", e);
                Some(self.run_rescue_shell())
            }
        }
    }

    /// Run the rescue shell in the foreground
    ///
    /// Blocks the whole runtime until the shell exits: nothing else should
    /// compete with the operator for the console.
    pub fn run_rescue_shell(&self) -> RescueOutcome {
        log::warn!("Dropping to rescue shell...");
        log::warn!("Type 'exit' to continue boot, 'exit 2' to reboot, 'exit 3' to power off.");

        self.set_suspended(true);
        let outcome = match self.supervisor().spawn(&self.config().rescue_command) {
            Ok(pid) => {
                let status = self.kernel().wait_blocking(pid);
                self.supervisor().release(pid);
                match status {
                    Ok(status) => RescueOutcome::from_status(status),
                    Err(e) => {
                        log::error!("Waiting for rescue shell failed: {}", e);
                        RescueOutcome::Resume
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to spawn rescue shell: {}", e);
                RescueOutcome::Resume
            }
        };
        self.set_suspended(false);

        if outcome == RescueOutcome::Resume {
            log::info!("Resuming boot...");
        }
        outcome
    }

    async fn run_session(self: Rc<Self>) {
        if let Err(e) = self.wait_foundation().await {
            log::error!("Not starting session: {}", e);
            return;
        }

        log::info!("Services ready. Spawning shell...");
        match self.supervisor().spawn_and_await(&self.config().session_command) {
            Ok(session) => {
                session.exited().await;
            }
            Err(e) => log::error!("Failed to spawn session shell: {}", e),
        }

        log::info!("Shell exited. Shutting down...");
        self.power(RebootCommand::PowerOff).await
    }

    /// Wait until every foundation unit is ready
    pub(crate) async fn wait_foundation(self: &Rc<Self>) -> Result<(), StartError> {
        let signals: Vec<_> = self
            .config()
            .foundation_units
            .iter()
            .map(|name| self.start_unit(name, &[]))
            .collect();
        for signal in signals {
            signal.wait().await?;
        }
        Ok(())
    }

    pub async fn power(&self, cmd: RebootCommand) -> ! {
        self.begin_shutdown();
        shutdown(self.kernel(), cmd, self.config().shutdown_grace).await
    }

    /// Freeze the unit set: no restarts and no new starts from here on, so
    /// nothing respawns between SIGTERM and SIGKILL
    pub(crate) fn begin_shutdown(&self) {
        if !self.supervisor().is_stopping() {
            log::info!("Stopping service restarts");
            self.supervisor().stop_restarts();
        }
    }
}

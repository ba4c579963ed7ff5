//! Native start actions for the built-in units

use std::path::Path;
use std::rc::Rc;

use super::{Manager, StartError};
use crate::units::Builtin;

const DBUS_DIRS: &[&str] = &["/run/dbus", "/var/lib/dbus"];
const DBUS_UUIDGEN: &str = "/usr/bin/dbus-uuidgen --ensure";
const DBUS_DAEMON: &str = "/usr/bin/dbus-daemon --system --fork";

const NETWORK_MANAGER: &str = "/usr/sbin/NetworkManager";

const ELOGIND_PATHS: &[&str] = &["/usr/libexec/elogind", "/usr/lib/elogind/elogind"];
const LIGHTDM_DIRS: &[&str] = &[
    "/var/lib/lightdm",
    "/var/lib/lightdm/data",
    "/var/log/lightdm",
    "/var/cache/lightdm",
];

impl Manager {
    pub(super) async fn run_builtin(self: &Rc<Self>, builtin: Builtin) -> Result<(), StartError> {
        let unit = builtin.name();
        match builtin {
            Builtin::Mounts => self.host.mount_all().map_err(|e| StartError::action(unit, e)),
            Builtin::Network => self
                .host
                .network_start()
                .map_err(|e| StartError::action(unit, e)),
            Builtin::Hostname => self
                .host
                .set_hostname()
                .map_err(|e| StartError::action(unit, e)),
            Builtin::Dbus => self.start_dbus(unit).await,
            Builtin::NetworkManager => self.start_network_manager(unit),
            Builtin::UserSessions => self.start_user_sessions(unit),
            Builtin::PlymouthQuit => Ok(()),
        }
    }

    async fn start_dbus(&self, unit: &str) -> Result<(), StartError> {
        for dir in DBUS_DIRS {
            self.host
                .ensure_dir(Path::new(dir))
                .map_err(|e| StartError::action(unit, e))?;
        }

        // The daemon refuses to start without a machine id
        let uuidgen = self
            .supervisor
            .spawn_and_await(DBUS_UUIDGEN)
            .map_err(|e| StartError::spawn(unit, e))?;
        match uuidgen.exited().await {
            Some(status) if status.success() => {}
            Some(status) => log::warn!("dbus-uuidgen exited with {}", status),
            None => log::warn!("dbus-uuidgen was never reaped"),
        }

        // With --fork the parent exits once the bus socket is listening
        let daemon = self
            .supervisor
            .spawn_and_await(DBUS_DAEMON)
            .map_err(|e| StartError::spawn(unit, e))?;
        match daemon.exited().await {
            Some(status) if status.success() => {
                log::info!("D-Bus system bus is up");
                Ok(())
            }
            Some(status) => Err(StartError::action(
                unit,
                format!("dbus-daemon exited with {}", status),
            )),
            None => Err(StartError::action(unit, "dbus-daemon was never reaped")),
        }
    }

    fn start_network_manager(&self, unit: &str) -> Result<(), StartError> {
        let completion = self
            .supervisor
            .spawn_and_await(NETWORK_MANAGER)
            .map_err(|e| StartError::spawn(unit, e))?;
        log::info!("Started NetworkManager (PID {})", completion.pid());

        tokio::task::spawn_local(async move {
            if let Some(status) = completion.exited().await {
                log::warn!("NetworkManager exited ({})", status);
            }
        });
        Ok(())
    }

    fn start_user_sessions(&self, unit: &str) -> Result<(), StartError> {
        let elogind = ELOGIND_PATHS
            .iter()
            .copied()
            .find(|path| self.host.is_executable(Path::new(path)));

        match elogind {
            Some(path) => {
                self.host
                    .ensure_dir(Path::new("/run/systemd"))
                    .map_err(|e| StartError::action(unit, e))?;
                let pid = self
                    .supervisor
                    .spawn(path)
                    .map_err(|e| StartError::spawn(unit, e))?;
                log::info!("Started elogind (PID {})", pid);
            }
            None => log::debug!("elogind not installed"),
        }

        for dir in LIGHTDM_DIRS {
            if let Err(e) = self.host.ensure_dir(Path::new(dir)) {
                log::debug!("{}: {}", dir, e);
            }
        }
        Ok(())
    }
}

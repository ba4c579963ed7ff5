//! Network bring-up and hostname for the `network` and `hostname` units

use std::fs;
use std::path::Path;
use std::process::Command;

use nix::unistd::{access, AccessFlags};

const IP_PATHS: &[&str] = &["/sbin/ip", "/bin/ip", "/usr/bin/ip", "/usr/sbin/ip"];
const HELPER_PATH: &str = "/sbin:/usr/sbin:/bin:/usr/bin";
const HOSTNAME_PATH: &str = "/etc/hostname";
const FALLBACK_HOSTNAME: &str = "localhost";

/// Check X_OK on a path
pub fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
}

/// Bring up the loopback interface
///
/// A missing `ip` binary is not an error: the machine boots without lo.
pub fn start() -> Result<(), NetworkError> {
    log::info!("Bringing up loopback...");

    let Some(ip) = IP_PATHS.iter().map(Path::new).find(|p| is_executable(p)) else {
        log::info!("'ip' command not found, skipping loopback setup");
        return Ok(());
    };

    // Blocking on purpose: network must be up before dependents proceed
    let status = Command::new(ip)
        .args(["link", "set", "lo", "up"])
        .env_clear()
        .env("PATH", HELPER_PATH)
        .status()
        .map_err(|e| NetworkError::Command {
            command: format!("{} link set lo up", ip.display()),
            source: e,
        })?;

    if !status.success() {
        return Err(NetworkError::Status(status.code().unwrap_or(-1)));
    }
    Ok(())
}

/// Set the hostname from /etc/hostname
pub fn set_hostname() -> Result<(), NetworkError> {
    let hostname = read_hostname(fs::read_to_string(HOSTNAME_PATH).ok().as_deref());
    log::info!("Setting hostname to {}", hostname);
    nix::unistd::sethostname(&hostname).map_err(NetworkError::Hostname)
}

fn read_hostname(content: Option<&str>) -> String {
    content
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(FALLBACK_HOSTNAME)
        .to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to run {command}: {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ip link returned {0}")]
    Status(i32),

    #[error("sethostname failed: {0}")]
    Hostname(#[source] nix::Error),
}

//! Init configuration
//!
//! Everything tunable lives here with its default. There is no config file:
//! PID 1 builds `InitConfig::default()` and tests shrink the durations.

use std::path::PathBuf;
use std::time::Duration;

/// Directories scanned for `.service` and `.target` files
pub const UNIT_DIRS: &[&str] = &["/usr/lib/systemd/system", "/usr/lib/systemd/user"];

/// Environment handed to every spawned process
pub const SERVICE_ENV: &[&str] = &[
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
    "TERM=linux",
    "HOME=/root",
    "USER=root",
];

#[derive(Debug, Clone)]
pub struct InitConfig {
    pub unit_dirs: Vec<PathBuf>,
    /// Final unit the boot chain pulls in
    pub boot_target: String,
    /// Units that must be ready before the interactive session is spawned
    pub foundation_units: Vec<String>,
    pub session_command: String,
    pub rescue_command: String,
    pub service_env: Vec<String>,

    /// Readiness heuristic: how long a freshly spawned service is given
    /// before dependents are released. There is no sd_notify support.
    pub settle_delay: Duration,
    /// Reap loop wake-up interval when no SIGCHLD arrives
    pub idle_interval: Duration,
    /// Pause after an unexpected waitpid error
    pub error_backoff: Duration,

    // Crash-loop detection for Restart=always
    pub crash_window: Duration,
    pub crash_threshold: usize,
    pub crash_cooldown: Duration,

    /// Time between SIGTERM and SIGKILL at shutdown
    pub shutdown_grace: Duration,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            unit_dirs: UNIT_DIRS.iter().map(PathBuf::from).collect(),
            boot_target: "lightdm.service".to_string(),
            foundation_units: vec!["mounts".into(), "network".into(), "hostname".into()],
            session_command: "/bin/bash".to_string(),
            rescue_command: "/bin/sh".to_string(),
            service_env: SERVICE_ENV.iter().map(|s| s.to_string()).collect(),
            settle_delay: Duration::from_millis(100),
            idle_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(5),
            crash_window: Duration::from_secs(15),
            crash_threshold: 5,
            crash_cooldown: Duration::from_secs(5 * 60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

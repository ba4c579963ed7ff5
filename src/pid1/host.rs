//! Machine setup actions used by the built-in units

use std::path::Path;

use super::mount::{self, MountError};
use super::network::{self, NetworkError};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Idempotent setup steps invoked as the body of built-in units
pub trait Host {
    fn mount_all(&self) -> Result<(), HostError>;
    fn network_start(&self) -> Result<(), HostError>;
    fn set_hostname(&self) -> Result<(), HostError>;
    /// mkdir -p
    fn ensure_dir(&self, path: &Path) -> Result<(), HostError>;
    fn is_executable(&self, path: &Path) -> bool;
}

#[derive(Debug, Default)]
pub struct LinuxHost;

impl Host for LinuxHost {
    fn mount_all(&self) -> Result<(), HostError> {
        Ok(mount::mount_all()?)
    }

    fn network_start(&self) -> Result<(), HostError> {
        Ok(network::start()?)
    }

    fn set_hostname(&self) -> Result<(), HostError> {
        Ok(network::set_hostname()?)
    }

    fn ensure_dir(&self, path: &Path) -> Result<(), HostError> {
        std::fs::create_dir_all(path).map_err(|e| HostError::CreateDir {
            path: path.display().to_string(),
            source: e,
        })
    }

    fn is_executable(&self, path: &Path) -> bool {
        network::is_executable(path)
    }
}

//! Built-in units
//!
//! These units have no unit file. Their start action is native code run by
//! the manager, and they take precedence over on-disk units of the same name.

use super::{StartAction, UnitDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Pseudo-filesystems and /etc/fstab
    Mounts,
    /// Loopback interface
    Network,
    /// /etc/hostname
    Hostname,
    /// System message bus
    Dbus,
    NetworkManager,
    /// elogind and lightdm state directories
    UserSessions,
    /// Placeholder so display managers can order after it
    PlymouthQuit,
}

impl Builtin {
    pub const ALL: [Builtin; 7] = [
        Builtin::Mounts,
        Builtin::Network,
        Builtin::Hostname,
        Builtin::Dbus,
        Builtin::NetworkManager,
        Builtin::UserSessions,
        Builtin::PlymouthQuit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mounts => "mounts",
            Self::Network => "network",
            Self::Hostname => "hostname",
            Self::Dbus => "dbus",
            Self::NetworkManager => "network-manager",
            Self::UserSessions => "systemd-user-sessions.service",
            Self::PlymouthQuit => "plymouth-quit.service",
        }
    }

    pub fn dependencies(self) -> &'static [&'static str] {
        match self {
            Self::Mounts | Self::PlymouthQuit => &[],
            Self::Network => &["mounts"],
            Self::Hostname => &["mounts", "network"],
            Self::Dbus => &["mounts", "network", "hostname"],
            Self::NetworkManager => &["mounts", "network", "hostname", "dbus"],
            Self::UserSessions => &["mounts", "network", "hostname", "dbus", "network-manager"],
        }
    }

    pub fn definition(self) -> UnitDefinition {
        UnitDefinition {
            dependencies: self.dependencies().iter().map(|d| d.to_string()).collect(),
            start: StartAction::Builtin(self),
            ..UnitDefinition::default()
        }
    }
}

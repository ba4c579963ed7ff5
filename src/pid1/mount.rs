//! Filesystem setup for the `mounts` unit
//!
//! Mounts the virtual filesystems required for a functioning Linux system,
//! then everything in /etc/fstab:
//! - /proc, /sys (mandatory)
//! - /dev as devtmpfs, or tmpfs populated with essential device nodes
//! - /dev/pts, /run, /tmp
//!
//! Already-mounted virtual filesystems are skipped, so running this twice is
//! harmless. An fstab entry for a target that is already mounted (the tmpfs
//! on /tmp, the root filesystem) is applied as a remount instead.

use nix::mount::{mount, MsFlags};
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use crate::fstab;

/// Mount information for an essential filesystem
struct MountPoint {
    source: &'static str,
    target: &'static str,
    fstype: &'static str,
    flags: MsFlags,
    data: Option<&'static str>,
}

const NOSUID_NODEV_NOEXEC: MsFlags = MsFlags::MS_NOSUID
    .union(MsFlags::MS_NODEV)
    .union(MsFlags::MS_NOEXEC);

const KERNEL_MOUNTS: &[MountPoint] = &[
    MountPoint {
        source: "proc",
        target: "/proc",
        fstype: "proc",
        flags: NOSUID_NODEV_NOEXEC,
        data: None,
    },
    MountPoint {
        source: "sysfs",
        target: "/sys",
        fstype: "sysfs",
        flags: NOSUID_NODEV_NOEXEC,
        data: None,
    },
];

const DEVTMPFS: MountPoint = MountPoint {
    source: "devtmpfs",
    target: "/dev",
    fstype: "devtmpfs",
    flags: MsFlags::MS_NOSUID,
    data: Some("mode=0755"),
};

const DEV_TMPFS_FALLBACK: MountPoint = MountPoint {
    source: "tmpfs",
    target: "/dev",
    fstype: "tmpfs",
    flags: MsFlags::MS_NOSUID,
    data: Some("mode=0755"),
};

const RUNTIME_MOUNTS: &[MountPoint] = &[
    MountPoint {
        source: "devpts",
        target: "/dev/pts",
        fstype: "devpts",
        flags: MsFlags::MS_NOSUID.union(MsFlags::MS_NOEXEC),
        data: Some("mode=0620,gid=5"),
    },
    MountPoint {
        source: "tmpfs",
        target: "/run",
        fstype: "tmpfs",
        flags: MsFlags::MS_NOSUID.union(MsFlags::MS_NODEV),
        data: Some("mode=0755"),
    },
    MountPoint {
        source: "tmpfs",
        target: "/tmp",
        fstype: "tmpfs",
        flags: MsFlags::empty(),
        data: None,
    },
];

/// Character devices created when /dev is a plain tmpfs: (path, mode, major, minor)
const DEVICE_NODES: &[(&str, u32, u64, u64)] = &[
    ("/dev/null", 0o666, 1, 3),
    ("/dev/zero", 0o666, 1, 5),
    ("/dev/full", 0o666, 1, 7),
    ("/dev/random", 0o666, 1, 8),
    ("/dev/urandom", 0o666, 1, 9),
    ("/dev/tty", 0o666, 5, 0),
    ("/dev/console", 0o600, 5, 1),
    ("/dev/ptmx", 0o666, 5, 2),
    // Framebuffer, DRI and input for Xorg
    ("/dev/fb0", 0o660, 29, 0),
    ("/dev/dri/card0", 0o660, 226, 0),
    ("/dev/dri/renderD128", 0o660, 226, 128),
    ("/dev/input/mice", 0o660, 13, 63),
    ("/dev/input/event0", 0o660, 13, 64),
];

/// Number of virtual terminals (/dev/tty0../dev/tty7)
const VT_COUNT: u64 = 8;

const DEV_SYMLINKS: &[(&str, &str)] = &[
    ("/proc/self/fd", "/dev/fd"),
    ("/proc/self/fd/0", "/dev/stdin"),
    ("/proc/self/fd/1", "/dev/stdout"),
    ("/proc/self/fd/2", "/dev/stderr"),
];

const FSTAB_PATH: &str = "/etc/fstab";

/// Mount pseudo-filesystems and process /etc/fstab
///
/// Failures of the pseudo-filesystems are returned; fstab entries are
/// best effort.
pub fn mount_all() -> Result<(), MountError> {
    log::info!("Mounting pseudo-filesystems...");

    for mp in KERNEL_MOUNTS {
        mount_one(mp)?;
    }

    if let Err(e) = mount_one(&DEVTMPFS) {
        log::warn!("{}, falling back to tmpfs", e);
        mount_one(&DEV_TMPFS_FALLBACK)?;
        populate_dev();
    }

    for (target, link) in DEV_SYMLINKS {
        if !Path::new(link).exists() {
            if let Err(e) = symlink(target, link) {
                log::debug!("Failed to link {} -> {}: {}", link, target, e);
            }
        }
    }

    for mp in RUNTIME_MOUNTS {
        mount_one(mp)?;
    }

    mount_fstab();
    Ok(())
}

/// Mount a single filesystem
fn mount_one(mp: &MountPoint) -> Result<(), MountError> {
    let target = Path::new(mp.target);

    if is_mountpoint(target) {
        log::debug!("{} already mounted", mp.target);
        return Ok(());
    }

    // Create mount point if needed
    if !target.exists() {
        fs::create_dir_all(target).map_err(|e| MountError::CreateDir {
            path: mp.target.to_string(),
            source: e,
        })?;
    }

    mount(Some(mp.source), target, Some(mp.fstype), mp.flags, mp.data).map_err(|e| {
        MountError::Mount {
            target: mp.target.to_string(),
            fstype: mp.fstype.to_string(),
            source: e,
        }
    })?;

    log::info!("Mounted {} on {}", mp.fstype, mp.target);
    Ok(())
}

/// Create essential device nodes on a tmpfs /dev (best effort)
fn populate_dev() {
    let vts = (0..VT_COUNT).map(|n| (format!("/dev/tty{}", n), 0o666, 4, n));
    let nodes = DEVICE_NODES
        .iter()
        .map(|&(path, mode, major, minor)| (path.to_string(), mode, major, minor))
        .chain(vts);

    for (path, mode, major, minor) in nodes {
        let path = Path::new(&path);
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = mknod(
            path,
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(mode),
            makedev(major, minor),
        ) {
            log::debug!("Failed to create {}: {}", path.display(), e);
        }
    }
}

fn mount_fstab() {
    log::info!("Processing {}...", FSTAB_PATH);

    let content = match fs::read_to_string(FSTAB_PATH) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("Cannot read {}: {}", FSTAB_PATH, e);
            return;
        }
    };

    for entry in fstab::boot_entries(&content) {
        let target = Path::new(&entry.mount_point);
        let remount = is_mountpoint(target);
        if remount {
            log::info!("Remounting {} with fstab options", entry.mount_point);
        }

        let (flags, data) = fstab_mount_args(&entry, remount);
        let data = (!data.is_empty()).then_some(data.as_str());

        match mount(
            Some(entry.fs_spec.as_str()),
            target,
            Some(entry.fs_type.as_str()),
            flags,
            data,
        ) {
            Ok(()) => log::info!("Mounted {}", entry.mount_point),
            Err(e) => log::warn!("Failed to mount {}: {}", entry.mount_point, e),
        }
    }
}

/// mount(2) flags and data for an fstab entry
fn fstab_mount_args(entry: &fstab::FstabEntry, remount: bool) -> (MsFlags, String) {
    let (mut flags, data) = entry.mount_flags();
    if remount {
        flags |= MsFlags::MS_REMOUNT;
    }
    (flags, data)
}

/// Check if a path is a mount point
fn is_mountpoint(path: &Path) -> bool {
    // Check /proc/mounts if available
    if let Ok(mounts) = fs::read_to_string("/proc/mounts") {
        let path_str = path.to_string_lossy();
        return mounts
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|point| point == path_str);
    }

    // Fallback: compare device IDs (parent vs target)
    let parent = match path.parent() {
        Some(p) if p.exists() && path.exists() => p,
        _ => return false,
    };

    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(path), fs::metadata(parent)) {
        (Ok(target_meta), Ok(parent_meta)) => target_meta.dev() != parent_meta.dev(),
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to mount {fstype} on {target}: {source}")]
    Mount {
        target: String,
        fstype: String,
        #[source]
        source: nix::Error,
    },
}

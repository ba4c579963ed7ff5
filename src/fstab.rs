//! Fstab parser
//!
//! Turns /etc/fstab lines into mount requests for the `mounts` unit.
//!
//! Fstab format:
//! ```text
//! # <file system>  <mount point>  <type>  <options>  <dump>  <pass>
//! UUID=xxx         /              ext4    defaults   0       1
//! /dev/sda1        /boot          ext4    defaults   0       2
//! ```

use nix::mount::MsFlags;

/// A parsed fstab entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// Device, UUID, LABEL, or path to mount
    pub fs_spec: String,
    /// Mount point path
    pub mount_point: String,
    /// Filesystem type (ext4, btrfs, swap, etc.)
    pub fs_type: String,
    /// Mount options (comma-separated), empty when the column is missing
    pub options: String,
}

impl FstabEntry {
    /// Check if this is a swap entry
    pub fn is_swap(&self) -> bool {
        self.fs_type == "swap" || self.mount_point == "none" || self.mount_point == "swap"
    }

    /// Check if this should be mounted at boot (not noauto)
    pub fn is_auto(&self) -> bool {
        !self.options.split(',').any(|o| o.trim() == "noauto")
    }

    /// Split options into mount(2) flags and the filesystem data string
    pub fn mount_flags(&self) -> (MsFlags, String) {
        let mut flags = MsFlags::empty();
        let mut data: Vec<&str> = Vec::new();

        for opt in self.options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            match opt {
                "ro" => flags |= MsFlags::MS_RDONLY,
                "noatime" => flags |= MsFlags::MS_NOATIME,
                "nosuid" => flags |= MsFlags::MS_NOSUID,
                "nodev" => flags |= MsFlags::MS_NODEV,
                "noexec" => flags |= MsFlags::MS_NOEXEC,
                "rw" | "defaults" => {}
                other => data.push(other),
            }
        }

        (flags, data.join(","))
    }
}

/// Parse fstab content
pub fn parse_fstab_content(content: &str) -> Vec<FstabEntry> {
    content.lines().filter_map(parse_fstab_line).collect()
}

/// Parse a single fstab line
fn parse_fstab_line(line: &str) -> Option<FstabEntry> {
    let line = line.trim();

    // Skip empty lines and comments
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();

    // Need at least fs_spec, mount_point and type
    if fields.len() < 3 {
        return None;
    }

    Some(FstabEntry {
        fs_spec: fields[0].to_string(),
        mount_point: fields[1].to_string(),
        fs_type: fields[2].to_string(),
        options: fields.get(3).map(|s| s.to_string()).unwrap_or_default(),
    })
}

/// Entries that should be mounted at boot (excludes swap, noauto)
pub fn boot_entries(content: &str) -> Vec<FstabEntry> {
    parse_fstab_content(content)
        .into_iter()
        .filter(|e| !e.is_swap() && e.is_auto())
        .collect()
}

//! Mounted file store enumeration.
//!
//! Walks the mount table, drops pseudo filesystems, and joins in
//! capacity and inode figures from `df`. Every source here is
//! best-effort: an unreadable mount table yields an empty list and a
//! failed `df` leaves the size fields at zero.

use crate::source::RawSourceAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Filesystem types that expose no real storage.
const PSEUDO_FS_TYPES: &[&str] = &[
    "anon_inodefs",
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "efivarfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nfsd",
    "overlay",
    "proc",
    "procfs",
    "pstore",
    "ramfs",
    "rootfs",
    "securityfs",
    "selinuxfs",
    "sunrpc",
    "sysfs",
    "tracefs",
];

/// Mount point prefixes under which tmpfs mounts are system plumbing
/// rather than user-visible storage.
const PSEUDO_MOUNT_PREFIXES: &[&str] = &["/run", "/sys", "/dev", "/proc"];

/// One mounted, non-pseudo file store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStore {
    /// Short name, the last path component of the mount point.
    pub name: String,

    /// Backing volume (device path or remote source).
    pub volume: String,

    /// Mount point.
    pub mount: String,

    /// Filesystem type.
    pub fs_type: String,

    /// Total capacity in bytes (0 when unknown).
    pub total_space: u64,

    /// Space usable by unprivileged callers, in bytes (0 when unknown).
    pub usable_space: u64,

    /// Total inode count (0 when unknown).
    pub total_inodes: u64,

    /// Free inode count (0 when unknown).
    pub free_inodes: u64,
}

/// Enumerate mounted file stores.
///
/// Reads the process's own mount table, filters pseudo filesystems,
/// then joins byte and inode figures from one `df -P -k` and one
/// `df -P -k -i` invocation keyed by mount point. Never fails; worst
/// case is an empty list.
pub fn collect_file_stores(adapter: &dyn RawSourceAdapter) -> Vec<FileStore> {
    let lines = match adapter.read_text_file("/proc/self/mounts") {
        Ok(lines) => lines,
        Err(err) => {
            debug!(error = %err, "mount table unreadable");
            return Vec::new();
        }
    };

    let sizes = df_by_mount(adapter, &["df", "-P", "-k"]);
    let inodes = df_by_mount(adapter, &["df", "-P", "-k", "-i"]);

    let mut stores = Vec::new();
    for line in &lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let volume = unescape_mount_field(fields[0]);
        let mount = unescape_mount_field(fields[1]);
        let fs_type = fields[2].to_string();
        if is_pseudo(&fs_type, &mount) {
            continue;
        }

        let mut store = FileStore {
            name: mount_name(&mount),
            volume,
            mount: mount.clone(),
            fs_type,
            ..Default::default()
        };
        if let Some(&(total_kib, avail_kib)) = sizes.get(&mount) {
            store.total_space = total_kib.saturating_mul(1024);
            store.usable_space = avail_kib.saturating_mul(1024);
        }
        if let Some(&(total, free)) = inodes.get(&mount) {
            store.total_inodes = total;
            store.free_inodes = free;
        }
        stores.push(store);
    }
    stores
}

fn is_pseudo(fs_type: &str, mount: &str) -> bool {
    if PSEUDO_FS_TYPES.contains(&fs_type) {
        return true;
    }
    fs_type == "tmpfs" && PSEUDO_MOUNT_PREFIXES.iter().any(|p| mount.starts_with(p))
}

/// Last path component of a mount point, keeping `/` for the root.
fn mount_name(mount: &str) -> String {
    match mount.rsplit('/').next() {
        Some("") | None => "/".to_string(),
        Some(last) => last.to_string(),
    }
}

/// The mount table escapes whitespace and backslashes octally.
fn unescape_mount_field(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Parse POSIX `df` output into (total, available) pairs keyed by mount
/// point. The mount point is everything after the fifth field, so
/// mounts containing spaces survive the join.
fn df_by_mount(adapter: &dyn RawSourceAdapter, argv: &[&str]) -> HashMap<String, (u64, u64)> {
    let mut by_mount = HashMap::new();
    let lines = match adapter.run_command(argv) {
        Ok(lines) => lines,
        Err(err) => {
            debug!(error = %err, command = argv.join(" "), "df unavailable");
            return by_mount;
        }
    };
    // First line is the POSIX header.
    for line in lines.iter().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        let total = fields[1].parse::<u64>().unwrap_or(0);
        let available = fields[3].parse::<u64>().unwrap_or(0);
        let mount = fields[5..].join(" ");
        by_mount.insert(mount, (total, available));
    }
    by_mount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSourceAdapter;

    fn mounts() -> Vec<&'static str> {
        vec![
            "/dev/sda2 / ext4 rw,relatime 0 0",
            "proc /proc proc rw,nosuid 0 0",
            "sysfs /sys sysfs rw,nosuid 0 0",
            "tmpfs /run tmpfs rw,nosuid,mode=755 0 0",
            "tmpfs /tmp tmpfs rw,nosuid 0 0",
            "/dev/sdb1 /mnt/backup\\040disk xfs rw 0 0",
        ]
    }

    #[test]
    fn test_pseudo_filesystems_are_skipped() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/self/mounts", &mounts())
            .with_command(&["df", "-P", "-k"], &[])
            .with_command(&["df", "-P", "-k", "-i"], &[]);
        let stores = collect_file_stores(&adapter);
        let mounts: Vec<&str> = stores.iter().map(|s| s.mount.as_str()).collect();
        assert_eq!(mounts, vec!["/", "/tmp", "/mnt/backup disk"]);
    }

    #[test]
    fn test_df_sizes_are_joined_by_mount() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/self/mounts", &mounts())
            .with_command(
                &["df", "-P", "-k"],
                &[
                    "Filesystem 1024-blocks Used Available Capacity Mounted on",
                    "/dev/sda2 102400 51200 40960 56% /",
                    "/dev/sdb1 204800 1024 203776 1% /mnt/backup disk",
                ],
            )
            .with_command(
                &["df", "-P", "-k", "-i"],
                &[
                    "Filesystem Inodes IUsed IFree IUse% Mounted on",
                    "/dev/sda2 65536 1000 64536 2% /",
                ],
            );
        let stores = collect_file_stores(&adapter);

        let root = stores.iter().find(|s| s.mount == "/").unwrap();
        assert_eq!(root.name, "/");
        assert_eq!(root.volume, "/dev/sda2");
        assert_eq!(root.fs_type, "ext4");
        assert_eq!(root.total_space, 102_400 * 1024);
        assert_eq!(root.usable_space, 40_960 * 1024);
        assert_eq!(root.total_inodes, 65_536);
        assert_eq!(root.free_inodes, 64_536);

        let backup = stores.iter().find(|s| s.mount == "/mnt/backup disk").unwrap();
        assert_eq!(backup.name, "backup disk");
        assert_eq!(backup.total_space, 204_800 * 1024);
        assert_eq!(backup.total_inodes, 0);
    }

    #[test]
    fn test_df_failure_degrades_to_zero_sizes() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/self/mounts", &["/dev/sda2 / ext4 rw 0 0"]);
        let stores = collect_file_stores(&adapter);
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].total_space, 0);
        assert_eq!(stores[0].total_inodes, 0);
    }

    #[test]
    fn test_unreadable_mount_table_yields_empty_list() {
        let adapter = MockSourceAdapter::new();
        assert!(collect_file_stores(&adapter).is_empty());
    }
}

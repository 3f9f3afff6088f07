//! Linux raw source adapter over procfs, sysfs, and /etc.
//!
//! Reads raw fields only. `/proc/[pid]/stat` numbers stay in clock
//! ticks and pages; conversion to milliseconds and bytes happens in the
//! reconciler. The adapter is rooted at `/` in production and at a
//! scratch directory in tests.
//!
//! # Data Sources
//! - `/proc/[pid]/stat` - core bulk fields (state, times, memory)
//! - `/proc/[pid]/io` - cumulative I/O counters
//! - `/proc/[pid]/status`, `exe`, `cwd`, `cmdline`, `fd/` - detail pass
//! - `/etc/passwd`, `/etc/group` - principal name resolution
//! - `ps` - legacy bulk fallback when procfs enumeration yields nothing

use super::{
    BulkProcessSample, ProcessDetailSample, RawSourceAdapter, SourceError, SourceResult,
    StaticFact,
};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::debug;

/// Raw source adapter for Linux hosts.
pub struct LinuxSourceAdapter {
    root: PathBuf,
    users: OnceLock<HashMap<u32, String>>,
    groups: OnceLock<HashMap<u32, String>>,
}

impl Default for LinuxSourceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxSourceAdapter {
    /// Adapter rooted at the real filesystem.
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Adapter rooted at an alternate directory (fake /proc and /etc
    /// trees in tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            users: OnceLock::new(),
            groups: OnceLock::new(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn users(&self) -> &HashMap<u32, String> {
        self.users.get_or_init(|| {
            parse_principal_file(&self.resolve("/etc/passwd"), 2)
        })
    }

    fn groups(&self) -> &HashMap<u32, String> {
        self.groups.get_or_init(|| {
            parse_principal_file(&self.resolve("/etc/group"), 2)
        })
    }

    /// Parse `/proc/[pid]/stat` content into a bulk sample.
    ///
    /// Returns `None` for empty or truncated content: a process that
    /// vanished mid-enumeration leaves an unreadable stat entry, and the
    /// reconciler drops that single pid.
    fn parse_stat(pid: u32, content: &str) -> Option<BulkProcessSample> {
        // comm is parenthesized and may itself contain spaces or parens.
        let open = content.find('(')?;
        let close = content.rfind(')')?;
        let name = content.get(open + 1..close)?.to_string();
        let rest = content.get(close + 2..)?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        // state is overall field 3; everything after comm is 0-indexed
        // from there, so overall field k sits at index k - 3.
        if fields.len() < 22 {
            return None;
        }
        let num = |idx: usize| fields[idx].parse::<u64>().unwrap_or(0);
        Some(BulkProcessSample {
            pid,
            name,
            state: fields[0].chars().next().unwrap_or('?'),
            parent_pid: num(1) as u32,
            user_ticks: num(11),
            kernel_ticks: num(12),
            priority: fields[15].parse::<i32>().unwrap_or(0),
            thread_count: num(17) as u32,
            start_ticks: num(19),
            virtual_bytes: num(20),
            rss_pages: num(21),
            bytes_read: 0,
            bytes_written: 0,
        })
    }

    /// Read cumulative storage I/O counters from `/proc/[pid]/io`.
    ///
    /// Frequently permission-denied for other users' processes; the
    /// counters stay zero in that case.
    fn read_io_counters(&self, pid: u32, sample: &mut BulkProcessSample) {
        let path = format!("/proc/{}/io", pid);
        let Ok(lines) = self.read_text_file(&path) else {
            return;
        };
        for line in lines {
            if let Some(value) = line.strip_prefix("read_bytes:") {
                sample.bytes_read = value.trim().parse().unwrap_or(0);
            } else if let Some(value) = line.strip_prefix("write_bytes:") {
                sample.bytes_written = value.trim().parse().unwrap_or(0);
            }
        }
    }

    fn uptime_seconds(&self) -> Option<f64> {
        let lines = self.read_text_file("/proc/uptime").ok()?;
        lines
            .first()?
            .split_whitespace()
            .next()?
            .parse::<f64>()
            .ok()
    }
}

fn map_io_error(err: &std::io::Error) -> SourceError {
    match err.kind() {
        std::io::ErrorKind::NotFound => SourceError::NotFound,
        std::io::ErrorKind::PermissionDenied => SourceError::AccessDenied,
        _ => SourceError::Unavailable,
    }
}

/// Parse an `/etc/passwd`-style colon-delimited file into id -> name.
///
/// `id_field` is the 0-based field index holding the numeric id (2 for
/// both passwd uid and group gid).
fn parse_principal_file(path: &Path, id_field: usize) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let Ok(content) = fs::read_to_string(path) else {
        return map;
    };
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() <= id_field {
            continue;
        }
        if let Ok(id) = fields[id_field].parse::<u32>() {
            map.entry(id).or_insert_with(|| fields[0].to_string());
        }
    }
    map
}

/// Parse a `ps` cumulative cpu time column (`[[dd-]hh:]mm:ss`) to seconds.
fn parse_cpu_time_seconds(value: &str) -> u64 {
    let (days, rest) = match value.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().unwrap_or(0), rest),
        None => (0, value),
    };
    let parts: Vec<&str> = rest.split(':').collect();
    let mut secs = 0u64;
    for part in &parts {
        secs = secs * 60 + part.parse::<u64>().unwrap_or(0);
    }
    days * 86_400 + secs
}

impl RawSourceAdapter for LinuxSourceAdapter {
    fn read_text_file(&self, path: &str) -> SourceResult<Vec<String>> {
        match fs::read_to_string(self.resolve(path)) {
            Ok(content) => Ok(content.lines().map(|l| l.to_string()).collect()),
            Err(err) => Err(map_io_error(&err)),
        }
    }

    fn run_command(&self, argv: &[&str]) -> SourceResult<Vec<String>> {
        let (program, args) = argv.split_first().ok_or(SourceError::Unavailable)?;
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| {
                debug!(command = program, error = %err, "command execution failed");
                SourceError::Unavailable
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().map(|l| l.to_string()).collect())
    }

    fn list_directory(&self, path: &str) -> SourceResult<Vec<String>> {
        let entries = fs::read_dir(self.resolve(path)).map_err(|err| map_io_error(&err))?;
        let mut names = Vec::new();
        for entry in entries.flatten() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    fn read_link(&self, path: &str) -> SourceResult<String> {
        fs::read_link(self.resolve(path))
            .map(|target| target.to_string_lossy().to_string())
            .map_err(|err| map_io_error(&err))
    }

    fn read_file_head(&self, path: &str, n: usize) -> SourceResult<Vec<u8>> {
        let file = fs::File::open(self.resolve(path)).map_err(|err| map_io_error(&err))?;
        let mut buf = vec![0u8; n];
        let mut handle = file.take(n as u64);
        let mut read = 0;
        while read < n {
            match handle.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(count) => read += count,
                Err(err) => return Err(map_io_error(&err)),
            }
        }
        buf.truncate(read);
        Ok(buf)
    }

    fn query_bulk_processes(
        &self,
        filter: Option<&BTreeSet<u32>>,
    ) -> SourceResult<Vec<BulkProcessSample>> {
        let entries = self.list_directory("/proc")?;
        let mut samples = Vec::new();
        for name in entries {
            let Ok(pid) = name.parse::<u32>() else {
                continue;
            };
            if let Some(pids) = filter {
                if !pids.contains(&pid) {
                    continue;
                }
            }
            let stat = match self.read_text_file(&format!("/proc/{}/stat", pid)) {
                Ok(lines) => lines.join(" "),
                // Vanished between the listing and the read.
                Err(_) => continue,
            };
            let Some(mut sample) = Self::parse_stat(pid, &stat) else {
                debug!(pid, "unparseable stat entry, dropping pid");
                continue;
            };
            self.read_io_counters(pid, &mut sample);
            samples.push(sample);
        }
        Ok(samples)
    }

    fn query_bulk_processes_fallback(
        &self,
        filter: Option<&BTreeSet<u32>>,
    ) -> SourceResult<Vec<BulkProcessSample>> {
        let lines = self.run_command(&[
            "ps",
            "-eo",
            "pid=,ppid=,state=,pri=,nlwp=,etimes=,time=,vsz=,rss=,comm=",
        ])?;
        let uptime = self.uptime_seconds().unwrap_or(0.0);
        let hz = self.static_fact(StaticFact::ClkTck).unwrap_or(100) as u64;
        let page_size = self.static_fact(StaticFact::PageSize).unwrap_or(4096) as u64;

        let mut samples = Vec::new();
        for line in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                continue;
            }
            let Ok(pid) = fields[0].parse::<u32>() else {
                continue;
            };
            if let Some(pids) = filter {
                if !pids.contains(&pid) {
                    continue;
                }
            }
            let etimes = fields[5].parse::<f64>().unwrap_or(0.0);
            let start_secs = (uptime - etimes).max(0.0);
            let cpu_secs = parse_cpu_time_seconds(fields[6]);
            let vsz_kib = fields[7].parse::<u64>().unwrap_or(0);
            let rss_kib = fields[8].parse::<u64>().unwrap_or(0);
            samples.push(BulkProcessSample {
                pid,
                parent_pid: fields[1].parse().unwrap_or(0),
                state: fields[2].chars().next().unwrap_or('?'),
                priority: fields[3].parse().unwrap_or(0),
                thread_count: fields[4].parse().unwrap_or(1),
                start_ticks: (start_secs * hz as f64) as u64,
                // ps reports one combined cpu time column
                user_ticks: cpu_secs * hz,
                kernel_ticks: 0,
                virtual_bytes: vsz_kib * 1024,
                rss_pages: rss_kib * 1024 / page_size.max(1),
                bytes_read: 0,
                bytes_written: 0,
                name: fields[9..].join(" "),
            });
        }
        Ok(samples)
    }

    fn query_process_detail(&self, pid: u32) -> SourceResult<ProcessDetailSample> {
        let status = self.read_text_file(&format!("/proc/{}/status", pid))?;

        let mut detail = ProcessDetailSample::default();
        for line in &status {
            if let Some(rest) = line.strip_prefix("Uid:") {
                detail.user_id = rest.split_whitespace().next().and_then(|v| v.parse().ok());
            } else if let Some(rest) = line.strip_prefix("Gid:") {
                detail.group_id = rest.split_whitespace().next().and_then(|v| v.parse().ok());
            }
        }
        detail.user = detail.user_id.and_then(|uid| self.users().get(&uid).cloned());
        detail.group = detail.group_id.and_then(|gid| self.groups().get(&gid).cloned());

        detail.path = self.read_link(&format!("/proc/{}/exe", pid)).ok();
        detail.cwd = self.read_link(&format!("/proc/{}/cwd", pid)).ok();
        detail.command_line = self
            .read_text_file(&format!("/proc/{}/cmdline", pid))
            .ok()
            .map(|lines| lines.join(" ").replace('\0', " ").trim().to_string())
            .filter(|cmd| !cmd.is_empty());
        detail.open_files = self
            .list_directory(&format!("/proc/{}/fd", pid))
            .ok()
            .map(|entries| entries.len() as u64);

        // ELF header byte 5: 1 = 32-bit, 2 = 64-bit.
        if let Some(path) = &detail.path {
            if let Ok(head) = self.read_file_head(path, 5) {
                if head.len() == 5 {
                    detail.bitness = Some(if head[4] == 1 { 32 } else { 64 });
                }
            }
        }
        Ok(detail)
    }

    fn static_fact(&self, fact: StaticFact) -> Option<i64> {
        match fact {
            StaticFact::PageSize => {
                let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
                Some(if size > 0 { size as i64 } else { 4096 })
            }
            StaticFact::ClkTck => {
                let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
                Some(if tck > 0 { tck as i64 } else { 100 })
            }
            StaticFact::KernelBootSecs => {
                let lines = self.read_text_file("/proc/stat").ok()?;
                lines.iter().find_map(|line| {
                    line.strip_prefix("btime")
                        .and_then(|rest| rest.trim().parse::<i64>().ok())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SELF_STAT: &str = "1234 (fake proc) S 1 1234 1234 0 -1 4194304 100 0 0 0 \
        250 150 0 0 20 0 4 0 5000 104857600 2560 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";

    fn scratch_adapter() -> (tempfile::TempDir, LinuxSourceAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LinuxSourceAdapter::with_root(dir.path());
        (dir, adapter)
    }

    #[test]
    fn test_parse_stat_extracts_fields() {
        let sample = LinuxSourceAdapter::parse_stat(1234, SELF_STAT).unwrap();
        assert_eq!(sample.pid, 1234);
        assert_eq!(sample.name, "fake proc");
        assert_eq!(sample.state, 'S');
        assert_eq!(sample.parent_pid, 1);
        assert_eq!(sample.user_ticks, 250);
        assert_eq!(sample.kernel_ticks, 150);
        assert_eq!(sample.priority, 20);
        assert_eq!(sample.thread_count, 4);
        assert_eq!(sample.start_ticks, 5000);
        assert_eq!(sample.virtual_bytes, 104_857_600);
        assert_eq!(sample.rss_pages, 2560);
    }

    #[test]
    fn test_parse_stat_rejects_empty_and_truncated() {
        assert!(LinuxSourceAdapter::parse_stat(1, "").is_none());
        assert!(LinuxSourceAdapter::parse_stat(1, "1 (x) S 1 2").is_none());
    }

    #[test]
    fn test_parse_stat_comm_with_parens() {
        let stat = SELF_STAT.replace("(fake proc)", "(a (weird) name)");
        let sample = LinuxSourceAdapter::parse_stat(1234, &stat).unwrap();
        assert_eq!(sample.name, "a (weird) name");
    }

    #[test]
    fn test_read_text_file_missing_is_not_found() {
        let (_dir, adapter) = scratch_adapter();
        assert_eq!(
            adapter.read_text_file("/etc/os-release"),
            Err(SourceError::NotFound)
        );
    }

    #[test]
    fn test_bulk_pass_reads_fake_proc_tree() {
        let (dir, adapter) = scratch_adapter();
        fs::create_dir_all(dir.path().join("proc/1234")).unwrap();
        fs::write(dir.path().join("proc/1234/stat"), SELF_STAT).unwrap();
        fs::write(
            dir.path().join("proc/1234/io"),
            "rchar: 99\nread_bytes: 4096\nwrite_bytes: 8192\n",
        )
        .unwrap();
        // Non-numeric entries are skipped.
        fs::create_dir_all(dir.path().join("proc/sys")).unwrap();

        let samples = adapter.query_bulk_processes(None).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].pid, 1234);
        assert_eq!(samples[0].bytes_read, 4096);
        assert_eq!(samples[0].bytes_written, 8192);
    }

    #[test]
    fn test_bulk_pass_drops_pid_with_empty_stat() {
        let (dir, adapter) = scratch_adapter();
        fs::create_dir_all(dir.path().join("proc/7")).unwrap();
        fs::write(dir.path().join("proc/7/stat"), "").unwrap();
        let samples = adapter.query_bulk_processes(None).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_bulk_pass_prefilters_pids() {
        let (dir, adapter) = scratch_adapter();
        for pid in [10, 20] {
            fs::create_dir_all(dir.path().join(format!("proc/{}", pid))).unwrap();
            fs::write(
                dir.path().join(format!("proc/{}/stat", pid)),
                SELF_STAT.replacen("1234", &pid.to_string(), 1),
            )
            .unwrap();
        }
        let filter: BTreeSet<u32> = [20].into_iter().collect();
        let samples = adapter.query_bulk_processes(Some(&filter)).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].pid, 20);
    }

    #[test]
    fn test_detail_resolves_principals_from_etc() {
        let (dir, adapter) = scratch_adapter();
        fs::create_dir_all(dir.path().join("proc/42")).unwrap();
        fs::write(
            dir.path().join("proc/42/status"),
            "Name:\tfake\nUid:\t1000\t1000\t1000\t1000\nGid:\t1001\t1001\t1001\t1001\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(
            dir.path().join("etc/passwd"),
            "root:x:0:0:root:/root:/bin/bash\nalice:x:1000:1000::/home/alice:/bin/sh\n",
        )
        .unwrap();
        fs::write(dir.path().join("etc/group"), "staff:x:1001:\n").unwrap();

        let detail = adapter.query_process_detail(42).unwrap();
        assert_eq!(detail.user_id, Some(1000));
        assert_eq!(detail.user.as_deref(), Some("alice"));
        assert_eq!(detail.group_id, Some(1001));
        assert_eq!(detail.group.as_deref(), Some("staff"));
        assert!(detail.path.is_none());
        assert!(detail.bitness.is_none());
    }

    #[test]
    fn test_detail_for_vanished_pid_is_not_found() {
        let (_dir, adapter) = scratch_adapter();
        assert_eq!(
            adapter.query_process_detail(99999),
            Err(SourceError::NotFound)
        );
    }

    #[test]
    fn test_cpu_time_parsing() {
        assert_eq!(parse_cpu_time_seconds("00:05"), 5);
        assert_eq!(parse_cpu_time_seconds("02:03:04"), 7384);
        assert_eq!(parse_cpu_time_seconds("1-00:00:01"), 86_401);
        assert_eq!(parse_cpu_time_seconds("garbage"), 0);
    }

    #[test]
    fn test_static_facts_have_sane_defaults() {
        let (_dir, adapter) = scratch_adapter();
        assert!(adapter.static_fact(StaticFact::PageSize).unwrap() >= 512);
        assert!(adapter.static_fact(StaticFact::ClkTck).unwrap() > 0);
        // No /proc/stat in the scratch root.
        assert_eq!(adapter.static_fact(StaticFact::KernelBootSecs), None);
    }
}

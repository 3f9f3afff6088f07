//! Process snapshot reconciliation.
//!
//! Builds canonical process records from two asymmetric passes: a cheap
//! bulk enumeration of every process, and an expensive per-process
//! detail pass (tens of milliseconds per pid on some platforms) that
//! can be skipped wholesale. Records are merged in a pid-keyed map;
//! a process that exits between the passes keeps its partial bulk
//! record with detail fields at their defaults.
//!
//! The snapshot never fails: a total enumeration failure yields an
//! empty list, which is a valid (if degraded) answer for a best-effort
//! fact gatherer.

use crate::counters;
use crate::facts::StaticFacts;
use crate::source::{BulkProcessSample, ProcessDetailSample, RawSourceAdapter};
use clap::ValueEnum;
use hs_common::ProcessId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Process execution state.
///
/// Mapped from the platform's single-character status code:
/// R running, S sleeping, D waiting (uninterruptible), Z zombie,
/// T stopped. Anything unrecognized maps to Other, never to an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Sleeping,
    Waiting,
    Zombie,
    Stopped,
    #[default]
    Other,
}

impl ProcessState {
    /// Map a platform status code into the six-way state enum.
    pub fn from_code(code: char) -> Self {
        match code {
            'R' => ProcessState::Running,
            'S' => ProcessState::Sleeping,
            'D' => ProcessState::Waiting,
            'Z' => ProcessState::Zombie,
            'T' => ProcessState::Stopped,
            _ => ProcessState::Other,
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Running => "running",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Waiting => "waiting",
            ProcessState::Zombie => "zombie",
            ProcessState::Stopped => "stopped",
            ProcessState::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A canonical process record for one snapshot.
///
/// Created fresh per snapshot request and never mutated after the
/// reconciler returns it. The pid is the natural key within one
/// snapshot only; pids are reused across snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID.
    pub pid: ProcessId,

    /// Parent process ID.
    pub parent_pid: ProcessId,

    /// Process name (basename only).
    pub name: String,

    /// Executable path (detail pass).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Full command line (detail pass).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_line: String,

    /// Owning user name (detail pass).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Owning user id (detail pass).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,

    /// Owning group name (detail pass).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,

    /// Owning group id (detail pass).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u32>,

    /// Current execution state.
    pub state: ProcessState,

    /// Scheduler priority.
    pub priority: i32,

    /// Number of threads.
    pub thread_count: u32,

    /// Virtual memory size in bytes.
    pub virtual_size: u64,

    /// Resident set size in bytes.
    pub resident_set_size: u64,

    /// Bytes read from storage.
    pub bytes_read: u64,

    /// Bytes written to storage.
    pub bytes_written: u64,

    /// Start time in milliseconds since the epoch, clamped so it never
    /// exceeds the snapshot time.
    pub start_time_ms: i64,

    /// Snapshot time minus start time; never negative.
    pub up_time_ms: i64,

    /// CPU time in user mode, milliseconds.
    pub user_time_ms: u64,

    /// CPU time in kernel mode, milliseconds.
    pub kernel_time_ms: u64,

    /// Open file/handle count (detail pass; 0 when unknown).
    pub open_files: u64,

    /// Executable bitness, 32 or 64 (detail pass; 0 when unknown).
    pub bitness: u8,

    /// Current working directory (detail pass).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cwd: String,
}

/// Post-reconciliation ordering of snapshot records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Keep map order (ascending pid).
    #[default]
    Unsorted,
    /// Ascending pid.
    Pid,
    /// Descending cpu time (user + kernel).
    Cpu,
    /// Descending resident set size.
    Memory,
}

/// Options for a process snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Restrict both passes to these pids (None = all processes).
    pub filter_pids: Option<BTreeSet<u32>>,

    /// Run the expensive per-process detail pass.
    pub include_slow_fields: bool,

    /// Post-processing sort order.
    pub sort: SortKey,

    /// Truncate the result to this many records (0 = all).
    pub limit: usize,
}

/// Take a process snapshot.
///
/// Pass 1 enumerates every process in one bulk call, falling back to a
/// legacy bulk source when the primary yields nothing. Pass 2, only
/// when `include_slow_fields` is set, fetches per-process detail for
/// pids present in the Pass-1 map; a pid that vanished in between
/// keeps its partial record. Worst case is an empty list, never an
/// error.
pub fn snapshot_processes(
    adapter: &dyn RawSourceAdapter,
    facts: &StaticFacts,
    options: &SnapshotOptions,
) -> Vec<ProcessRecord> {
    let now_ms = counters::wall_clock_ms();
    let filter = options.filter_pids.as_ref();

    let mut samples = adapter.query_bulk_processes(filter).unwrap_or_default();
    if samples.is_empty() {
        debug!("primary bulk source yielded nothing, trying fallback enumeration");
        samples = adapter
            .query_bulk_processes_fallback(filter)
            .unwrap_or_default();
    }

    let mut map: BTreeMap<u32, ProcessRecord> = BTreeMap::new();
    for sample in samples {
        // Re-apply the filter: not every bulk source can pre-filter,
        // and skipping excluded pids here avoids wasted detail calls.
        if let Some(pids) = filter {
            if !pids.contains(&sample.pid) {
                continue;
            }
        }
        map.insert(sample.pid, record_from_bulk(&sample, facts, now_ms));
    }

    if map.is_empty() {
        // Both bulk sources failed. With an explicit pid set we can
        // still answer from the detail source alone.
        if let (Some(pids), true) = (filter, options.include_slow_fields) {
            for &pid in pids {
                match adapter.query_process_detail(pid) {
                    Ok(detail) => {
                        let sample = BulkProcessSample { pid, ..Default::default() };
                        let mut record = record_from_bulk(&sample, facts, now_ms);
                        apply_detail(&mut record, detail);
                        map.insert(pid, record);
                    }
                    Err(err) => debug!(pid, error = %err, "detail-only lookup failed"),
                }
            }
        }
    } else if options.include_slow_fields {
        for (pid, record) in map.iter_mut() {
            match adapter.query_process_detail(*pid) {
                Ok(detail) => apply_detail(record, detail),
                // The process likely exited between passes; keep the
                // partial bulk record.
                Err(err) => {
                    debug!(pid, error = %err, "process detail unavailable, keeping partial record");
                }
            }
        }
    }

    // Bulk and detail sources cannot report our own live cwd.
    let own_pid = std::process::id();
    if let Some(record) = map.get_mut(&own_pid) {
        if record.cwd.is_empty() {
            if let Ok(cwd) = std::env::current_dir() {
                record.cwd = cwd.to_string_lossy().to_string();
            }
        }
    }

    let mut records: Vec<ProcessRecord> = map.into_values().collect();
    sort_records(&mut records, options.sort);
    if options.limit > 0 && records.len() > options.limit {
        records.truncate(options.limit);
    }
    records
}

/// Build a record from one bulk sample, converting ticks to
/// milliseconds and pages to bytes.
fn record_from_bulk(
    sample: &BulkProcessSample,
    facts: &StaticFacts,
    now_ms: i64,
) -> ProcessRecord {
    let hz = facts.clk_tck.max(1);
    let mut start_time_ms =
        facts.boot_time_ms.saturating_add((sample.start_ticks.saturating_mul(1000) / hz) as i64);
    // The boot-time estimate can be a few ms off; a process started
    // within that window of boot could otherwise appear to start in
    // the future.
    if start_time_ms >= now_ms {
        start_time_ms = now_ms - 1;
    }
    ProcessRecord {
        pid: ProcessId(sample.pid),
        parent_pid: ProcessId(sample.parent_pid),
        name: sample.name.clone(),
        path: String::new(),
        command_line: String::new(),
        user: String::new(),
        user_id: None,
        group: String::new(),
        group_id: None,
        state: ProcessState::from_code(sample.state),
        priority: sample.priority,
        thread_count: sample.thread_count,
        virtual_size: sample.virtual_bytes,
        resident_set_size: sample.rss_pages.saturating_mul(facts.page_size),
        bytes_read: sample.bytes_read,
        bytes_written: sample.bytes_written,
        start_time_ms,
        up_time_ms: now_ms - start_time_ms,
        user_time_ms: sample.user_ticks.saturating_mul(1000) / hz,
        kernel_time_ms: sample.kernel_ticks.saturating_mul(1000) / hz,
        open_files: 0,
        bitness: 0,
        cwd: String::new(),
    }
}

/// Merge detail-pass fields into a bulk record. Absent detail fields
/// leave the bulk values untouched.
fn apply_detail(record: &mut ProcessRecord, detail: ProcessDetailSample) {
    if let Some(path) = detail.path {
        record.path = path;
    }
    if let Some(command_line) = detail.command_line {
        record.command_line = command_line;
    }
    if let Some(cwd) = detail.cwd {
        record.cwd = cwd;
    }
    if let Some(user) = detail.user {
        record.user = user;
    }
    if let Some(group) = detail.group {
        record.group = group;
    }
    record.user_id = detail.user_id.or(record.user_id);
    record.group_id = detail.group_id.or(record.group_id);
    if let Some(open_files) = detail.open_files {
        record.open_files = open_files;
    }
    if let Some(bitness) = detail.bitness {
        record.bitness = bitness;
    }
}

/// Pure post-processing over the merged list.
fn sort_records(records: &mut [ProcessRecord], sort: SortKey) {
    match sort {
        SortKey::Unsorted => {}
        SortKey::Pid => records.sort_by_key(|r| r.pid),
        SortKey::Cpu => {
            records.sort_by_key(|r| std::cmp::Reverse(r.user_time_ms + r.kernel_time_ms))
        }
        SortKey::Memory => records.sort_by_key(|r| std::cmp::Reverse(r.resident_set_size)),
    }
}

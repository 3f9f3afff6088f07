//! Raw source adapters for platform-specific fact gathering.
//!
//! Everything the core consumes from a platform goes through the
//! [`RawSourceAdapter`] trait: text files, command output, bulk process
//! enumeration, per-process detail, and cached static facts. Adapters
//! return raw strings and numbers only; merging, precedence, clamping,
//! and race tolerance live in the resolvers.
//!
//! Implementations:
//! - [`linux::LinuxSourceAdapter`]: procfs/sysfs/`/etc` reader
//! - [`mock::MockSourceAdapter`]: scripted responses for tests

pub mod linux;
pub mod mock;

pub use linux::LinuxSourceAdapter;
pub use mock::MockSourceAdapter;

use std::collections::BTreeSet;
use thiserror::Error;

/// The three-way unavailability signal for raw sources.
///
/// Every variant is recoverable: strategies fall through to the next
/// source and the reconciler keeps partial records. No `SourceError`
/// escapes the two public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Source does not exist on this platform, or errored wholesale.
    #[error("source unavailable")]
    Unavailable,

    /// A per-object lookup found nothing (e.g. the process exited).
    #[error("object not found")]
    NotFound,

    /// The source exists but the caller may not read it.
    #[error("access denied")]
    AccessDenied,
}

/// Result type for raw source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Static facts an adapter can report about the host.
///
/// These are stable for the process lifetime and cached by
/// [`crate::facts::StaticFacts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticFact {
    /// Memory page size in bytes.
    PageSize,
    /// Clock ticks per second (USER_HZ).
    ClkTck,
    /// Kernel boot marker, seconds since the epoch (btime).
    KernelBootSecs,
}

/// One process as seen by the bulk enumeration pass.
///
/// Raw fields only: times are in clock ticks, RSS is in pages. The
/// reconciler converts to milliseconds and bytes using static facts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkProcessSample {
    pub pid: u32,
    pub name: String,
    pub parent_pid: u32,
    /// Single-character status code as reported by the platform.
    pub state: char,
    pub priority: i32,
    pub thread_count: u32,
    /// Start time in clock ticks since boot.
    pub start_ticks: u64,
    pub user_ticks: u64,
    pub kernel_ticks: u64,
    pub virtual_bytes: u64,
    /// Resident set size in pages.
    pub rss_pages: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Expensive per-process fields from the detail pass.
///
/// Every field is optional: a missing value means the underlying probe
/// was unavailable for this process, not that the pass failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessDetailSample {
    pub path: Option<String>,
    pub command_line: Option<String>,
    pub cwd: Option<String>,
    pub user_id: Option<u32>,
    pub user: Option<String>,
    pub group_id: Option<u32>,
    pub group: Option<String>,
    pub open_files: Option<u64>,
    /// 32 or 64, from the executable header.
    pub bitness: Option<u8>,
}

/// Uniform capability surface exposed by platform collaborators.
///
/// Object-safe so resolvers can be written once against `&dyn
/// RawSourceAdapter` and tested with scripted fakes. Adapters are
/// read-only and safe for concurrent use.
pub trait RawSourceAdapter {
    /// Read a text file as lines.
    fn read_text_file(&self, path: &str) -> SourceResult<Vec<String>>;

    /// Run a command and capture stdout as lines.
    fn run_command(&self, argv: &[&str]) -> SourceResult<Vec<String>>;

    /// List the entry names of a directory.
    fn list_directory(&self, path: &str) -> SourceResult<Vec<String>>;

    /// Resolve a symbolic link to its target path.
    fn read_link(&self, path: &str) -> SourceResult<String>;

    /// Read the first `n` bytes of a file.
    fn read_file_head(&self, path: &str, n: usize) -> SourceResult<Vec<u8>>;

    /// Enumerate all processes in one cheap pass.
    ///
    /// When `filter` is supplied, adapters that can pre-filter should;
    /// the reconciler re-applies the filter either way.
    fn query_bulk_processes(
        &self,
        filter: Option<&BTreeSet<u32>>,
    ) -> SourceResult<Vec<BulkProcessSample>>;

    /// Alternate bulk source used when the primary yields zero entries.
    fn query_bulk_processes_fallback(
        &self,
        _filter: Option<&BTreeSet<u32>>,
    ) -> SourceResult<Vec<BulkProcessSample>> {
        Err(SourceError::Unavailable)
    }

    /// Fetch expensive per-process detail.
    ///
    /// Returns `NotFound` or `AccessDenied` when the process exited
    /// between passes; the reconciler keeps the partial record.
    fn query_process_detail(&self, pid: u32) -> SourceResult<ProcessDetailSample>;

    /// Query a cached static fact.
    fn static_fact(&self, fact: StaticFact) -> Option<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        assert_eq!(SourceError::Unavailable.to_string(), "source unavailable");
        assert_eq!(SourceError::NotFound.to_string(), "object not found");
        assert_eq!(SourceError::AccessDenied.to_string(), "access denied");
    }

    #[test]
    fn test_bulk_sample_default_is_zeroed() {
        let sample = BulkProcessSample::default();
        assert_eq!(sample.pid, 0);
        assert_eq!(sample.start_ticks, 0);
        assert_eq!(sample.state, '\0');
    }

    #[test]
    fn test_detail_sample_default_has_no_fields() {
        let detail = ProcessDetailSample::default();
        assert!(detail.path.is_none());
        assert!(detail.user.is_none());
        assert!(detail.open_files.is_none());
    }
}

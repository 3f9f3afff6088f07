//! Scripted source adapter for testing.
//!
//! `MockSourceAdapter` replays canned responses for every capability of
//! [`RawSourceAdapter`], including injected per-pid failures to simulate
//! processes vanishing between the bulk and detail passes. Builder-style
//! setters keep test setup terse:
//!
//! ```ignore
//! let adapter = MockSourceAdapter::new()
//!     .with_file("/etc/os-release", &["NAME=\"Ubuntu\"", "VERSION=\"14.04.4 LTS, Trusty Tahr\""])
//!     .with_bulk_sample(BulkProcessSample { pid: 10, ..Default::default() })
//!     .with_detail_error(10, SourceError::NotFound);
//! ```

use super::{
    BulkProcessSample, ProcessDetailSample, RawSourceAdapter, SourceError, SourceResult,
    StaticFact,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted adapter replaying canned platform responses.
#[derive(Default)]
pub struct MockSourceAdapter {
    files: HashMap<String, Vec<String>>,
    commands: HashMap<Vec<String>, Vec<String>>,
    directories: HashMap<String, Vec<String>>,
    links: HashMap<String, String>,
    file_heads: HashMap<String, Vec<u8>>,
    bulk: Vec<BulkProcessSample>,
    bulk_error: Option<SourceError>,
    bulk_fallback: Vec<BulkProcessSample>,
    details: HashMap<u32, SourceResult<ProcessDetailSample>>,
    facts: HashMap<StaticFact, i64>,
    detail_calls: AtomicUsize,
}

impl MockSourceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a readable text file.
    pub fn with_file(mut self, path: &str, lines: &[&str]) -> Self {
        self.files
            .insert(path.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Script a command's stdout.
    pub fn with_command(mut self, argv: &[&str], lines: &[&str]) -> Self {
        self.commands.insert(
            argv.iter().map(|a| a.to_string()).collect(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    /// Script a directory listing.
    pub fn with_directory(mut self, path: &str, entries: &[&str]) -> Self {
        self.directories.insert(
            path.to_string(),
            entries.iter().map(|e| e.to_string()).collect(),
        );
        self
    }

    /// Script a symlink target.
    pub fn with_link(mut self, path: &str, target: &str) -> Self {
        self.links.insert(path.to_string(), target.to_string());
        self
    }

    /// Script the head bytes of a file.
    pub fn with_file_head(mut self, path: &str, bytes: &[u8]) -> Self {
        self.file_heads.insert(path.to_string(), bytes.to_vec());
        self
    }

    /// Add one bulk enumeration sample.
    pub fn with_bulk_sample(mut self, sample: BulkProcessSample) -> Self {
        self.bulk.push(sample);
        self
    }

    /// Make the primary bulk source fail outright.
    pub fn with_bulk_error(mut self, error: SourceError) -> Self {
        self.bulk_error = Some(error);
        self
    }

    /// Add one sample to the fallback bulk source.
    pub fn with_fallback_sample(mut self, sample: BulkProcessSample) -> Self {
        self.bulk_fallback.push(sample);
        self
    }

    /// Script a successful detail lookup for a pid.
    pub fn with_detail(mut self, pid: u32, detail: ProcessDetailSample) -> Self {
        self.details.insert(pid, Ok(detail));
        self
    }

    /// Inject a detail-pass failure for a pid (simulated race).
    pub fn with_detail_error(mut self, pid: u32, error: SourceError) -> Self {
        self.details.insert(pid, Err(error));
        self
    }

    /// Script a static fact value.
    pub fn with_fact(mut self, fact: StaticFact, value: i64) -> Self {
        self.facts.insert(fact, value);
        self
    }

    /// Number of detail lookups performed so far.
    pub fn detail_call_count(&self) -> usize {
        self.detail_calls.load(Ordering::Relaxed)
    }
}

fn apply_filter(
    samples: &[BulkProcessSample],
    filter: Option<&BTreeSet<u32>>,
) -> Vec<BulkProcessSample> {
    samples
        .iter()
        .filter(|s| filter.map_or(true, |pids| pids.contains(&s.pid)))
        .cloned()
        .collect()
}

impl RawSourceAdapter for MockSourceAdapter {
    fn read_text_file(&self, path: &str) -> SourceResult<Vec<String>> {
        self.files
            .get(path)
            .cloned()
            .ok_or(SourceError::NotFound)
    }

    fn run_command(&self, argv: &[&str]) -> SourceResult<Vec<String>> {
        let key: Vec<String> = argv.iter().map(|a| a.to_string()).collect();
        self.commands
            .get(&key)
            .cloned()
            .ok_or(SourceError::Unavailable)
    }

    fn list_directory(&self, path: &str) -> SourceResult<Vec<String>> {
        self.directories
            .get(path)
            .cloned()
            .ok_or(SourceError::NotFound)
    }

    fn read_link(&self, path: &str) -> SourceResult<String> {
        self.links.get(path).cloned().ok_or(SourceError::NotFound)
    }

    fn read_file_head(&self, path: &str, n: usize) -> SourceResult<Vec<u8>> {
        self.file_heads
            .get(path)
            .map(|bytes| bytes.iter().take(n).copied().collect())
            .ok_or(SourceError::NotFound)
    }

    fn query_bulk_processes(
        &self,
        filter: Option<&BTreeSet<u32>>,
    ) -> SourceResult<Vec<BulkProcessSample>> {
        if let Some(error) = self.bulk_error {
            return Err(error);
        }
        Ok(apply_filter(&self.bulk, filter))
    }

    fn query_bulk_processes_fallback(
        &self,
        filter: Option<&BTreeSet<u32>>,
    ) -> SourceResult<Vec<BulkProcessSample>> {
        if self.bulk_fallback.is_empty() {
            return Err(SourceError::Unavailable);
        }
        Ok(apply_filter(&self.bulk_fallback, filter))
    }

    fn query_process_detail(&self, pid: u32) -> SourceResult<ProcessDetailSample> {
        self.detail_calls.fetch_add(1, Ordering::Relaxed);
        match self.details.get(&pid) {
            Some(Ok(detail)) => Ok(detail.clone()),
            Some(Err(error)) => Err(*error),
            None => Err(SourceError::NotFound),
        }
    }

    fn static_fact(&self, fact: StaticFact) -> Option<i64> {
        self.facts.get(&fact).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscripted_sources_are_unavailable() {
        let adapter = MockSourceAdapter::new();
        assert_eq!(adapter.read_text_file("/etc/x"), Err(SourceError::NotFound));
        assert_eq!(
            adapter.run_command(&["lsb_release", "-a"]),
            Err(SourceError::Unavailable)
        );
        assert_eq!(adapter.query_process_detail(1), Err(SourceError::NotFound));
    }

    #[test]
    fn test_bulk_filter_is_applied() {
        let adapter = MockSourceAdapter::new()
            .with_bulk_sample(BulkProcessSample { pid: 1, ..Default::default() })
            .with_bulk_sample(BulkProcessSample { pid: 2, ..Default::default() });
        let filter: BTreeSet<u32> = [2].into_iter().collect();
        let samples = adapter.query_bulk_processes(Some(&filter)).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].pid, 2);
    }

    #[test]
    fn test_detail_calls_are_counted() {
        let adapter = MockSourceAdapter::new()
            .with_detail_error(5, SourceError::AccessDenied);
        assert_eq!(adapter.query_process_detail(5), Err(SourceError::AccessDenied));
        let _ = adapter.query_process_detail(6);
        assert_eq!(adapter.detail_call_count(), 2);
    }
}

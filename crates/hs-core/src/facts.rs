//! Process-wide static facts.
//!
//! The page size, tick rate, and boot time are stable for the process
//! lifetime. They are gathered once at startup into an explicit
//! read-only struct and passed by reference into the resolvers, so the
//! resolvers carry no hidden global state and tests can inject fact
//! values directly.

use crate::counters;
use crate::source::{RawSourceAdapter, StaticFact};
use serde::{Deserialize, Serialize};

/// Read-only host facts computed once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFacts {
    /// Memory page size in bytes.
    pub page_size: u64,

    /// Clock ticks per second (USER_HZ).
    pub clk_tck: u64,

    /// Estimated boot time in milliseconds since the epoch
    /// (dual-sample estimate, display-grade only).
    pub boot_time_ms: i64,

    /// Kernel boot marker in whole seconds since the epoch.
    pub boot_epoch_secs: i64,
}

impl StaticFacts {
    /// Gather facts from the adapter, with conventional defaults where
    /// a fact is unavailable.
    pub fn gather(adapter: &dyn RawSourceAdapter) -> Self {
        StaticFacts {
            page_size: adapter
                .static_fact(StaticFact::PageSize)
                .filter(|v| *v > 0)
                .unwrap_or(4096) as u64,
            clk_tck: adapter
                .static_fact(StaticFact::ClkTck)
                .filter(|v| *v > 0)
                .unwrap_or(100) as u64,
            boot_time_ms: counters::estimate_boot_time_ms(adapter),
            boot_epoch_secs: counters::kernel_boot_epoch_secs(adapter),
        }
    }

    /// Facts with fixed values for tests.
    pub fn fixed(page_size: u64, clk_tck: u64, boot_time_ms: i64) -> Self {
        StaticFacts {
            page_size,
            clk_tck,
            boot_time_ms,
            boot_epoch_secs: boot_time_ms / 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSourceAdapter;

    #[test]
    fn test_gather_uses_adapter_facts() {
        let adapter = MockSourceAdapter::new()
            .with_fact(StaticFact::PageSize, 16384)
            .with_fact(StaticFact::ClkTck, 250)
            .with_file("/proc/uptime", &["100.00 200.00"])
            .with_file("/proc/stat", &["btime 1700000000"]);
        let facts = StaticFacts::gather(&adapter);
        assert_eq!(facts.page_size, 16384);
        assert_eq!(facts.clk_tck, 250);
        assert_eq!(facts.boot_epoch_secs, 1_700_000_000);
        assert!(facts.boot_time_ms > 0);
    }

    #[test]
    fn test_gather_defaults_when_unavailable() {
        let adapter = MockSourceAdapter::new();
        let facts = StaticFacts::gather(&adapter);
        assert_eq!(facts.page_size, 4096);
        assert_eq!(facts.clk_tck, 100);
    }

    #[test]
    fn test_fixed_facts_for_injection() {
        let facts = StaticFacts::fixed(4096, 100, 1_700_000_000_000);
        assert_eq!(facts.boot_epoch_secs, 1_700_000_000);
    }
}

//! Counter normalization utilities.
//!
//! Raw OS counters carry unsigned 64-bit semantics but are stored in
//! signed 64-bit containers throughout the data model. The widening
//! casts here preserve the bit pattern, and all downstream arithmetic
//! (deltas, comparisons) is done in the unsigned domain so that values
//! above `i64::MAX` are never corrupted or misordered.
//!
//! Also hosts the boot-time estimators shared by the process reconciler:
//! a dual-sample uptime average (display-grade, a few ms of jitter) and
//! the kernel's boot marker with an uptime-based fallback.

use crate::source::RawSourceAdapter;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Widen an unsigned counter into a signed container, preserving the
/// bit pattern. Values above `i64::MAX` become negative when read as
/// signed; compare them with [`unsigned_cmp`], never directly.
pub fn to_signed_widening(raw: u64) -> i64 {
    raw as i64
}

/// Recover the unsigned counter value from its signed container.
pub fn to_unsigned(stored: i64) -> u64 {
    stored as u64
}

/// Wraparound-aware counter delta in the unsigned domain.
pub fn unsigned_delta(newer: i64, older: i64) -> u64 {
    to_unsigned(newer).wrapping_sub(to_unsigned(older))
}

/// Compare two widened counters by their unsigned values.
pub fn unsigned_cmp(a: i64, b: i64) -> Ordering {
    to_unsigned(a).cmp(&to_unsigned(b))
}

/// One raw counter observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSample {
    /// Unsigned counter value in a signed container.
    pub raw: i64,

    /// Wall-clock time of the observation in milliseconds.
    pub timestamp_ms: i64,
}

impl CounterSample {
    /// Capture a sample at the current wall-clock time.
    pub fn now(raw: u64) -> Self {
        CounterSample {
            raw: to_signed_widening(raw),
            timestamp_ms: wall_clock_ms(),
        }
    }

    /// Counter increase since an older sample, wraparound-aware.
    pub fn delta_since(&self, older: &CounterSample) -> u64 {
        unsigned_delta(self.raw, older.raw)
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn read_uptime_seconds(adapter: &dyn RawSourceAdapter) -> Option<f64> {
    let lines = adapter.read_text_file("/proc/uptime").ok()?;
    lines
        .first()?
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
}

/// Estimate boot time in milliseconds since the epoch.
///
/// The uptime file is only precise to hundredths of a second, so two
/// samples bracketing one wall-clock read are averaged to reduce
/// rounding error. The combined uptime is 2x seconds; multiplying by
/// 500 converts to milliseconds and halves in one step. The result can
/// be a few milliseconds off and must not be used for ordering
/// guarantees.
///
/// When uptime is unreadable, falls back to the kernel boot marker, and
/// finally to the current time.
pub fn estimate_boot_time_ms(adapter: &dyn RawSourceAdapter) -> i64 {
    let first = read_uptime_seconds(adapter);
    let now = wall_clock_ms();
    let second = read_uptime_seconds(adapter);
    match (first, second) {
        (Some(u1), Some(u2)) => now - (500.0 * (u1 + u2) + 0.5) as i64,
        _ => kernel_boot_epoch_secs(adapter) * 1000,
    }
}

/// Boot time in whole seconds from the kernel's `btime` marker, falling
/// back to current time minus uptime, and finally to the current time.
pub fn kernel_boot_epoch_secs(adapter: &dyn RawSourceAdapter) -> i64 {
    let now_secs = wall_clock_ms() / 1000;
    if let Ok(lines) = adapter.read_text_file("/proc/stat") {
        for line in lines {
            if let Some(rest) = line.strip_prefix("btime") {
                if let Ok(btime) = rest.trim().parse::<i64>() {
                    return btime;
                }
            }
        }
    }
    match read_uptime_seconds(adapter) {
        Some(uptime) => now_secs - uptime as i64,
        None => now_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSourceAdapter;
    use proptest::prelude::*;

    #[test]
    fn test_widening_preserves_bit_pattern_above_signed_max() {
        let raw = i64::MAX as u64 + 1;
        let stored = to_signed_widening(raw);
        assert!(stored < 0);
        assert_eq!(to_unsigned(stored), raw);
    }

    #[test]
    fn test_unsigned_cmp_orders_past_signed_boundary() {
        let below = to_signed_widening(i64::MAX as u64);
        let above = to_signed_widening(i64::MAX as u64 + 1);
        assert_eq!(unsigned_cmp(above, below), Ordering::Greater);
        // Naive signed comparison would invert this.
        assert!(above < below);
    }

    #[test]
    fn test_unsigned_delta_across_wraparound() {
        let older = to_signed_widening(u64::MAX - 9);
        let newer = to_signed_widening(5);
        assert_eq!(unsigned_delta(newer, older), 15);
    }

    #[test]
    fn test_counter_sample_delta() {
        let older = CounterSample { raw: to_signed_widening(100), timestamp_ms: 1 };
        let newer = CounterSample { raw: to_signed_widening(350), timestamp_ms: 2 };
        assert_eq!(newer.delta_since(&older), 250);
    }

    #[test]
    fn test_boot_estimates_within_jitter_bound() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/uptime", &["35678.12 102341.30"]);
        let first = estimate_boot_time_ms(&adapter);
        let second = estimate_boot_time_ms(&adapter);
        assert!((first - second).abs() <= 10, "jitter {} ms", first - second);
    }

    #[test]
    fn test_boot_estimate_falls_back_to_btime() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/stat", &["cpu  1 2 3 4", "btime 1700000000", "ctxt 99"]);
        assert_eq!(estimate_boot_time_ms(&adapter), 1_700_000_000_000);
    }

    #[test]
    fn test_kernel_boot_prefers_btime_over_uptime() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/stat", &["btime 1700000000"])
            .with_file("/proc/uptime", &["1000.00 2000.00"]);
        assert_eq!(kernel_boot_epoch_secs(&adapter), 1_700_000_000);
    }

    #[test]
    fn test_kernel_boot_uptime_fallback_is_in_the_past() {
        let adapter = MockSourceAdapter::new()
            .with_file("/proc/uptime", &["1000.00 2000.00"]);
        let boot = kernel_boot_epoch_secs(&adapter);
        assert!(boot <= wall_clock_ms() / 1000 - 999);
    }

    proptest! {
        #[test]
        fn prop_widening_round_trips(raw in any::<u64>()) {
            prop_assert_eq!(to_unsigned(to_signed_widening(raw)), raw);
        }

        #[test]
        fn prop_delta_inverts_wrapping_add(base in any::<u64>(), step in any::<u64>()) {
            let older = to_signed_widening(base);
            let newer = to_signed_widening(base.wrapping_add(step));
            prop_assert_eq!(unsigned_delta(newer, older), step);
        }
    }
}

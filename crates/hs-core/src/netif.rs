//! Network interface enumeration.
//!
//! Enumerates interfaces by listing their sysfs class directory, reads
//! the per-interface attribute files, and attributes addresses from one
//! `ip -o addr` invocation. Traffic counters carry unsigned 64-bit
//! semantics and are stored widened per the counter normalizer rules;
//! read deltas with [`crate::counters::unsigned_delta`].

use crate::counters::{self, to_signed_widening};
use crate::source::RawSourceAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One network interface with a consistent traffic sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    /// Interface name.
    pub name: String,

    /// Hardware (MAC) address, empty when absent.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mac: String,

    /// Maximum transmission unit (0 when unknown).
    pub mtu: u32,

    /// Link speed in bits per second (0 when unknown or link down).
    pub speed: u64,

    /// IPv4 addresses without prefix length.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipv4: Vec<String>,

    /// IPv6 addresses without prefix length.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipv6: Vec<String>,

    /// Bytes received; u64 bit pattern in a signed container.
    pub bytes_recv: i64,

    /// Bytes sent; u64 bit pattern in a signed container.
    pub bytes_sent: i64,

    /// Packets received; u64 bit pattern in a signed container.
    pub packets_recv: i64,

    /// Packets sent; u64 bit pattern in a signed container.
    pub packets_sent: i64,

    /// Receive errors; u64 bit pattern in a signed container.
    pub in_errors: i64,

    /// Transmit errors; u64 bit pattern in a signed container.
    pub out_errors: i64,

    /// Wall-clock time of the counter sample in milliseconds.
    pub timestamp_ms: i64,
}

/// Enumerate network interfaces with current traffic counters.
///
/// An interface missing attribute files keeps zero/empty defaults for
/// those attributes; an unlistable class directory yields an empty
/// list. Never fails.
pub fn collect_net_interfaces(adapter: &dyn RawSourceAdapter) -> Vec<NetInterface> {
    let mut names = match adapter.list_directory("/sys/class/net") {
        Ok(names) => names,
        Err(err) => {
            debug!(error = %err, "interface class directory unlistable");
            return Vec::new();
        }
    };
    names.sort();

    let addresses = addresses_by_interface(adapter);

    let mut interfaces = Vec::new();
    for name in names {
        let base = format!("/sys/class/net/{}", name);
        let mut interface = NetInterface {
            name: name.clone(),
            mac: read_attribute(adapter, &base, "address"),
            mtu: read_attribute(adapter, &base, "mtu").parse().unwrap_or(0),
            speed: link_speed_bps(&read_attribute(adapter, &base, "speed")),
            bytes_recv: read_counter(adapter, &base, "rx_bytes"),
            bytes_sent: read_counter(adapter, &base, "tx_bytes"),
            packets_recv: read_counter(adapter, &base, "rx_packets"),
            packets_sent: read_counter(adapter, &base, "tx_packets"),
            in_errors: read_counter(adapter, &base, "rx_errors"),
            out_errors: read_counter(adapter, &base, "tx_errors"),
            timestamp_ms: counters::wall_clock_ms(),
            ..Default::default()
        };
        if let Some((ipv4, ipv6)) = addresses.get(&name) {
            interface.ipv4 = ipv4.clone();
            interface.ipv6 = ipv6.clone();
        }
        interfaces.push(interface);
    }
    interfaces
}

/// First line of an interface attribute file, or empty.
fn read_attribute(adapter: &dyn RawSourceAdapter, base: &str, attribute: &str) -> String {
    adapter
        .read_text_file(&format!("{}/{}", base, attribute))
        .ok()
        .and_then(|lines| lines.into_iter().next())
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}

/// The speed attribute is megabits per second; a down link reports -1.
fn link_speed_bps(attribute: &str) -> u64 {
    match attribute.parse::<i64>() {
        Ok(mbps) if mbps > 0 => mbps as u64 * 1_000_000,
        _ => 0,
    }
}

/// One statistics counter, widened into its signed container.
fn read_counter(adapter: &dyn RawSourceAdapter, base: &str, counter: &str) -> i64 {
    let raw = read_attribute(adapter, &format!("{}/statistics", base), counter)
        .parse::<u64>()
        .unwrap_or(0);
    to_signed_widening(raw)
}

/// Parse `ip -o addr` into per-interface (ipv4, ipv6) address lists.
///
/// Each output line is `<idx>: <name> <family> <addr>/<prefix> ...`;
/// the prefix length is stripped.
fn addresses_by_interface(
    adapter: &dyn RawSourceAdapter,
) -> HashMap<String, (Vec<String>, Vec<String>)> {
    let mut by_interface: HashMap<String, (Vec<String>, Vec<String>)> = HashMap::new();
    let lines = match adapter.run_command(&["ip", "-o", "addr"]) {
        Ok(lines) => lines,
        Err(err) => {
            debug!(error = %err, "address listing unavailable");
            return by_interface;
        }
    };
    for line in &lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let name = fields[1].to_string();
        let address = fields[3].split('/').next().unwrap_or("").to_string();
        if address.is_empty() {
            continue;
        }
        let entry = by_interface.entry(name).or_default();
        match fields[2] {
            "inet" => entry.0.push(address),
            "inet6" => entry.1.push(address),
            _ => {}
        }
    }
    by_interface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::to_unsigned;
    use crate::source::MockSourceAdapter;

    fn scripted() -> MockSourceAdapter {
        MockSourceAdapter::new()
            .with_directory("/sys/class/net", &["lo", "eth0"])
            .with_file("/sys/class/net/eth0/address", &["aa:bb:cc:dd:ee:ff"])
            .with_file("/sys/class/net/eth0/mtu", &["1500"])
            .with_file("/sys/class/net/eth0/speed", &["1000"])
            .with_file("/sys/class/net/eth0/statistics/rx_bytes", &["123456"])
            .with_file("/sys/class/net/eth0/statistics/tx_bytes", &["654321"])
            .with_file("/sys/class/net/eth0/statistics/rx_packets", &["100"])
            .with_file("/sys/class/net/eth0/statistics/tx_packets", &["200"])
            .with_file("/sys/class/net/eth0/statistics/rx_errors", &["1"])
            .with_file("/sys/class/net/eth0/statistics/tx_errors", &["2"])
            .with_file("/sys/class/net/lo/mtu", &["65536"])
            .with_command(
                &["ip", "-o", "addr"],
                &[
                    "1: lo    inet 127.0.0.1/8 scope host lo",
                    "2: eth0    inet 192.168.1.5/24 brd 192.168.1.255 scope global eth0",
                    "2: eth0    inet6 fe80::1/64 scope link",
                ],
            )
    }

    #[test]
    fn test_interfaces_are_enumerated_sorted() {
        let interfaces = collect_net_interfaces(&scripted());
        let names: Vec<&str> = interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "lo"]);
    }

    #[test]
    fn test_attributes_and_counters() {
        let interfaces = collect_net_interfaces(&scripted());
        let eth0 = interfaces.iter().find(|i| i.name == "eth0").unwrap();
        assert_eq!(eth0.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(eth0.mtu, 1500);
        assert_eq!(eth0.speed, 1_000_000_000);
        assert_eq!(to_unsigned(eth0.bytes_recv), 123_456);
        assert_eq!(to_unsigned(eth0.bytes_sent), 654_321);
        assert_eq!(to_unsigned(eth0.in_errors), 1);
        assert!(eth0.timestamp_ms > 0);
        assert_eq!(eth0.ipv4, vec!["192.168.1.5"]);
        assert_eq!(eth0.ipv6, vec!["fe80::1"]);
    }

    #[test]
    fn test_missing_attributes_default() {
        let interfaces = collect_net_interfaces(&scripted());
        let lo = interfaces.iter().find(|i| i.name == "lo").unwrap();
        assert_eq!(lo.mtu, 65_536);
        assert!(lo.mac.is_empty());
        assert_eq!(lo.speed, 0);
        assert_eq!(lo.bytes_recv, 0);
        assert_eq!(lo.ipv4, vec!["127.0.0.1"]);
    }

    #[test]
    fn test_down_link_speed_is_zero() {
        assert_eq!(link_speed_bps("-1"), 0);
        assert_eq!(link_speed_bps(""), 0);
        assert_eq!(link_speed_bps("2500"), 2_500_000_000);
    }

    #[test]
    fn test_counter_above_signed_max_survives_widening() {
        let big = (i64::MAX as u64 + 42).to_string();
        let adapter = MockSourceAdapter::new()
            .with_directory("/sys/class/net", &["eth0"])
            .with_file("/sys/class/net/eth0/statistics/rx_bytes", &[big.as_str()]);
        let interfaces = collect_net_interfaces(&adapter);
        assert!(interfaces[0].bytes_recv < 0);
        assert_eq!(to_unsigned(interfaces[0].bytes_recv), i64::MAX as u64 + 42);
    }

    #[test]
    fn test_unlistable_class_directory_yields_empty() {
        assert!(collect_net_interfaces(&MockSourceAdapter::new()).is_empty());
    }
}

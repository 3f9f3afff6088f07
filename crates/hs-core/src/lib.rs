//! hostsnap core library.
//!
//! Point-in-time collection of OS and hardware facts, normalized into a
//! uniform data model:
//! - OS identity resolution via an ordered cascade of release-file and
//!   command strategies
//! - Process snapshots reconciled from a cheap bulk pass and an optional
//!   expensive per-process detail pass
//! - Counter normalization (unsigned-in-signed widening, boot-time
//!   estimation) shared by the collectors
//! - File-store and network-interface collectors
//!
//! All platform access goes through the [`source::RawSourceAdapter`]
//! capability trait; the resolvers themselves are platform-agnostic.
//! The binary entry point is in `main.rs`.

pub mod counters;
pub mod facts;
pub mod fstore;
pub mod logging;
pub mod netif;
pub mod osident;
pub mod snapshot;
pub mod source;

pub use facts::StaticFacts;
pub use fstore::{collect_file_stores, FileStore};
pub use netif::{collect_net_interfaces, NetInterface};
pub use osident::{resolve_os_identity, OsIdentity};
pub use snapshot::{snapshot_processes, ProcessRecord, ProcessState, SnapshotOptions, SortKey};
pub use source::{RawSourceAdapter, SourceError, SourceResult};

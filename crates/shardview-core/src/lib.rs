//! Shardview Core
//!
//! Core types, errors, and constants for shardview, a shard membership tracker
//! that keeps a consistent view of which endpoints serve which shards.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `CONNECTION_TIMEOUT_MS_MAX`)
//! - Errors are returned, never panics

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod telemetry;

pub use config::{RegistryConfig, ShardviewConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use io::{ManualClock, TimeProvider, WallClockTime};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};

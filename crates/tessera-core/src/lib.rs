//! Tessera Core — shared errors, configuration, and the expiring cache.
//!
//! This crate provides the foundational types used across all Tessera crates.
//! It has no internal Tessera dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`config`]: File/env/default configuration loading
//! - [`cache`]: Generic TTL cache with injectable monotonic clocks

pub mod cache;
pub mod config;
pub mod error;

// Re-export key types at crate root for convenience
pub use cache::{CacheEntry, Clock, ManualClock, MonotonicClock, TtlCache};
pub use config::{CacheConfig, QueryConfig, RerankConfig, TesseraConfig};
pub use error::{Error, Result};

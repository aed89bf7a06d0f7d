#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Sizing and load-factor policy shared by every table.
pub mod config;

/// Errors reported by allocation and configuration.
pub mod error;

/// A HashMap implementation using separate chaining.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

pub mod hash_table;

/// Memory and collision statistics.
#[cfg(feature = "stats")]
pub mod stats;

pub use config::Config;
pub use error::AllocError;
pub use error::ConfigError;
pub use error::Error;
pub use error::Storage;
#[cfg(any(feature = "std", feature = "foldhash"))]
pub use hash_map::DefaultHashBuilder;
pub use hash_map::HashMap;
pub use hash_table::HashTable;
#[cfg(feature = "stats")]
pub use stats::TableStats;

use alloc::collections::TryReserveError;
use core::fmt;

/// The kind of storage that could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// The array of buckets owned by the table.
    BucketArray,
    /// The entry array owned by a single bucket.
    BucketEntries,
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::BucketArray => f.write_str("bucket array"),
            Storage::BucketEntries => f.write_str("bucket entries"),
        }
    }
}

/// Backing storage for the table could not be allocated.
///
/// Returned by insertion, [`resize`] and the fallible constructors. The
/// operation that failed leaves the table in a consistent state: a failed
/// [`resize`] leaves it exactly as it was, and a failed insertion inserts
/// nothing.
///
/// [`resize`]: crate::HashTable::resize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to allocate {storage} storage")]
pub struct AllocError {
    storage: Storage,
    #[source]
    source: TryReserveError,
}

impl AllocError {
    pub(crate) fn new(storage: Storage, source: TryReserveError) -> Self {
        Self { storage, source }
    }

    /// Which storage could not be allocated.
    pub fn storage(&self) -> Storage {
        self.storage
    }
}

/// A [`Config`](crate::Config) violates one of its constraints.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The minimum capacity must be at least one bucket.
    #[error("minimum capacity must be non-zero")]
    ZeroMinCapacity,
    /// Buckets must start with room for at least one entry.
    #[error("bucket size must be non-zero")]
    ZeroBucketSize,
    /// The grow threshold is NaN, infinite or not positive.
    #[error("maximum load {0} must be finite and positive")]
    InvalidMaxLoad(f64),
    /// The shrink threshold is NaN or infinite.
    #[error("minimum load {0} must be finite")]
    InvalidMinLoad(f64),
    /// Shrinking right after a grow would oscillate.
    #[error("minimum load {min_load} must be less than half of maximum load {max_load}")]
    Oscillating {
        /// The configured shrink threshold.
        min_load: f64,
        /// The configured grow threshold.
        max_load: f64,
    },
}

/// Errors reported when constructing a table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The initial bucket array could not be allocated.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

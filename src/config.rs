use crate::error::ConfigError;

/// Default number of buckets for a new table, and the floor for shrinking.
pub const DEFAULT_MIN_CAPACITY: usize = 16;

/// Default number of entries a bucket allocates room for on first insertion.
pub const DEFAULT_BUCKET_SIZE: usize = 1;

/// Default load factor above which the table doubles its bucket count.
pub const DEFAULT_MAX_LOAD: f64 = 0.8;

/// Default load factor below which the table halves its bucket count.
pub const DEFAULT_MIN_LOAD: f64 = 0.2;

/// Sizing and load-factor policy for a table.
///
/// The load factor of a table is `len / capacity`, where capacity is the
/// number of buckets. After an insertion pushes the load factor above
/// `max_load` the bucket count doubles; after a removal drops it below
/// `min_load` the bucket count halves, but never below `min_capacity`.
/// Either threshold may be disabled.
///
/// # Examples
///
/// ```rust
/// use chain_hash::Config;
///
/// let config = Config::default()
///     .with_initial_capacity(64)
///     .with_max_load(2.0)
///     .with_min_load(-1.0);
///
/// assert_eq!(config.max_load(), Some(2.0));
/// assert_eq!(config.min_load(), None);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    initial_capacity: usize,
    min_capacity: usize,
    bucket_size: usize,
    max_load: Option<f64>,
    min_load: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_MIN_CAPACITY,
            min_capacity: DEFAULT_MIN_CAPACITY,
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_load: Some(DEFAULT_MAX_LOAD),
            min_load: Some(DEFAULT_MIN_LOAD),
        }
    }
}

/// Maps the negative "never triggers" sentinel to `None`.
fn threshold(load: f64) -> Option<f64> {
    if load < 0.0 { None } else { Some(load) }
}

impl Config {
    /// Number of buckets allocated at construction.
    ///
    /// Values below [`min_capacity`](Self::min_capacity) are raised to it.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Floor on the bucket count, for both construction and shrinking.
    pub fn with_min_capacity(mut self, capacity: usize) -> Self {
        self.min_capacity = capacity;
        self
    }

    /// Entries allocated by a bucket's first insertion. Later growth doubles.
    pub fn with_bucket_size(mut self, size: usize) -> Self {
        self.bucket_size = size;
        self
    }

    /// Grow threshold. A negative value disables growth.
    pub fn with_max_load(mut self, load: f64) -> Self {
        self.max_load = threshold(load);
        self
    }

    /// Shrink threshold. A negative value disables shrinking.
    pub fn with_min_load(mut self, load: f64) -> Self {
        self.min_load = threshold(load);
        self
    }

    /// Never grow automatically.
    pub fn without_max_load(mut self) -> Self {
        self.max_load = None;
        self
    }

    /// Never shrink automatically.
    pub fn without_min_load(mut self) -> Self {
        self.min_load = None;
        self
    }

    /// The bucket count a table built from this configuration starts with.
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity.max(self.min_capacity)
    }

    /// The lowest bucket count a table will shrink or resize to.
    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    /// The first allocation size of a bucket's entry array.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// The grow threshold, if enabled.
    pub fn max_load(&self) -> Option<f64> {
        self.max_load
    }

    /// The shrink threshold, if enabled.
    pub fn min_load(&self) -> Option<f64> {
        self.min_load
    }

    /// Checks the constraints every table relies on.
    ///
    /// When both thresholds are enabled `min_load` must be below half of
    /// `max_load`, otherwise the halving that follows a removal right after
    /// a doubling would immediately be undone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_capacity == 0 {
            return Err(ConfigError::ZeroMinCapacity);
        }
        if self.bucket_size == 0 {
            return Err(ConfigError::ZeroBucketSize);
        }
        if let Some(max_load) = self.max_load
            && (!max_load.is_finite() || max_load <= 0.0)
        {
            return Err(ConfigError::InvalidMaxLoad(max_load));
        }
        if let Some(min_load) = self.min_load
            && !min_load.is_finite()
        {
            return Err(ConfigError::InvalidMinLoad(min_load));
        }
        if let (Some(min_load), Some(max_load)) = (self.min_load, self.max_load)
            && min_load >= max_load / 2.0
        {
            return Err(ConfigError::Oscillating { min_load, max_load });
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn should_grow(&self, len: usize, capacity: usize) -> bool {
        self.max_load
            .is_some_and(|max_load| len as f64 / capacity as f64 > max_load)
    }

    #[inline]
    pub(crate) fn should_shrink(&self, len: usize, capacity: usize) -> bool {
        capacity > self.min_capacity
            && self
                .min_load
                .is_some_and(|min_load| (len as f64 / capacity as f64) < min_load)
    }
}

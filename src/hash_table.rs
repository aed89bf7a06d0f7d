//! A separate-chaining hash table driven by caller-supplied hashes.
//!
//! [`HashTable`] stores key/value pairs in an array of buckets. Each bucket
//! owns a growable array of entries that hashed to the same slot, so
//! collisions cost a short linear scan rather than a pointer chase. The
//! table does not know how to hash or compare keys: every operation takes
//! the 32-bit hash of the key and an equality predicate. See
//! [`HashMap`](crate::HashMap) for a front end that derives both from
//! `Hash + Eq`.

use alloc::collections::TryReserveError;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::mem;

use crate::config::Config;
use crate::config::DEFAULT_MIN_CAPACITY;
use crate::error::AllocError;
use crate::error::Error;
use crate::error::Storage;

#[derive(Clone)]
struct Entry<K, V> {
    hash: u32,
    key: K,
    value: V,
}

/// The smallest power-of-two multiple of `bucket_size` that holds `count`
/// entries, i.e. the capacity a bucket reaches by doubling.
#[inline]
fn doubled_capacity(count: usize, bucket_size: usize) -> usize {
    let mut capacity = bucket_size;
    while capacity < count {
        capacity = capacity.saturating_mul(2);
    }
    capacity
}

#[derive(Clone)]
struct Bucket<K, V> {
    entries: Vec<Entry<K, V>>,
}

impl<K, V> Debug for Bucket<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|entry| (&entry.key, &entry.value)))
            .finish()
    }
}

impl<K, V> Bucket<K, V> {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Allocates exactly the storage doubling would have produced for
    /// `count` entries.
    fn with_room_for(count: usize, bucket_size: usize) -> Result<Self, TryReserveError> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(doubled_capacity(count, bucket_size))?;
        Ok(Self { entries })
    }

    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.entries.len() == self.entries.capacity()
    }

    #[inline]
    fn position(&self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.hash == hash && eq(&entry.key))
    }

    /// Makes room for one more entry, doubling the storage when full.
    fn grow(&mut self, bucket_size: usize) -> Result<(), TryReserveError> {
        let capacity = self.entries.capacity();
        let target = if capacity == 0 {
            bucket_size
        } else {
            capacity.saturating_mul(2)
        };
        self.entries.try_reserve_exact(target - self.entries.len())
    }

    /// Removes the entry at `index`, shifting later entries down by one.
    ///
    /// Storage halves when less than half full, but never below
    /// `bucket_size` while entries remain.
    fn remove(&mut self, index: usize, bucket_size: usize) -> Entry<K, V> {
        let entry = self.entries.remove(index);

        let capacity = self.entries.capacity();
        if self.entries.is_empty() {
            self.entries = Vec::new();
        } else if capacity > bucket_size && self.entries.len() * 2 < capacity {
            self.entries.shrink_to((capacity / 2).max(bucket_size));
        }

        entry
    }
}

/// A hash table using separate chaining with per-bucket growable arrays.
///
/// `HashTable<K, V>` maps keys to values. The caller supplies a 32-bit hash
/// for every operation along with an equality predicate; equal keys must
/// produce equal hashes. Entries live in bucket `hash % capacity`, where
/// capacity is the number of buckets.
///
/// The bucket count follows the table's [`Config`]: it doubles after an
/// insertion raises the load factor above `max_load`, and halves (down to
/// `min_capacity`) after a removal drops it below `min_load`.
///
/// ## Performance Characteristics
///
/// - **Lookup**: a hash filter then a comparator call per candidate in one
///   bucket. A poor hash function degrades a bucket scan to O(n).
/// - **Memory**: one `Vec` header per bucket, plus a cached `u32` hash per
///   entry. Bucket storage is allocated on first insertion.
///
/// ## Example
///
/// ```rust
/// use chain_hash::HashTable;
///
/// // A u32 is its own hash.
/// let mut table = HashTable::new();
/// table.set(7, 7u32, "seven", |a, b| a == b)?;
/// table.set(23, 23u32, "twenty-three", |a, b| a == b)?;
///
/// assert_eq!(table.get(7, |&k| k == 7), Some(&"seven"));
/// assert!(!table.contains(8, |&k| k == 8));
/// assert_eq!(table.delete(23, |&k| k == 23), Some((23, "twenty-three")));
/// assert_eq!(table.len(), 1);
/// # Ok::<(), chain_hash::AllocError>(())
/// ```
#[derive(Clone)]
pub struct HashTable<K, V> {
    buckets: Vec<Bucket<K, V>>,
    len: usize,
    config: Config,

    /// Allocations left before the next one is refused.
    #[cfg(test)]
    fail_after: core::cell::Cell<Option<usize>>,
}

impl<K, V> Debug for HashTable<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("capacity", &self.buckets.len())
            .field("buckets", &self.buckets)
            .finish()
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty table with the default [`Config`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MIN_CAPACITY)
    }

    /// Creates an empty table with `capacity` buckets and the default load
    /// policy.
    ///
    /// Capacity counts buckets, not entries, and is raised to the default
    /// minimum of 16 if smaller.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::HashTable;
    /// #
    /// let table: HashTable<u32, u32> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 100);
    ///
    /// let table: HashTable<u32, u32> = HashTable::with_capacity(0);
    /// assert_eq!(table.capacity(), 16);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let config = Config::default().with_initial_capacity(capacity);
        let mut buckets = Vec::with_capacity(config.initial_capacity());
        buckets.resize_with(config.initial_capacity(), Bucket::new);
        Self::from_parts(buckets, config)
    }

    /// Creates an empty table following `config`.
    ///
    /// Fails if the configuration is invalid or the bucket array cannot be
    /// allocated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::Config;
    /// # use chain_hash::HashTable;
    /// #
    /// let config = Config::default().with_initial_capacity(32).with_max_load(2.0);
    /// let table: HashTable<u32, u32> = HashTable::try_with_config(config)?;
    /// assert_eq!(table.capacity(), 32);
    ///
    /// let bad = Config::default().with_max_load(0.8).with_min_load(0.5);
    /// assert!(HashTable::<u32, u32>::try_with_config(bad).is_err());
    /// # Ok::<(), chain_hash::Error>(())
    /// ```
    pub fn try_with_config(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let buckets = Self::empty_buckets(config.initial_capacity())?;
        Ok(Self::from_parts(buckets, config))
    }

    /// Like [`with_capacity`](Self::with_capacity), but reports failure to
    /// allocate the bucket array instead of aborting.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::HashTable;
    /// #
    /// let table: HashTable<u32, u32> = HashTable::try_with_capacity(64)?;
    /// assert_eq!(table.capacity(), 64);
    ///
    /// assert!(HashTable::<u32, u32>::try_with_capacity(usize::MAX).is_err());
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn try_with_capacity(capacity: usize) -> Result<Self, AllocError> {
        let config = Config::default().with_initial_capacity(capacity);
        let buckets = Self::empty_buckets(config.initial_capacity())?;
        Ok(Self::from_parts(buckets, config))
    }

    fn empty_buckets(capacity: usize) -> Result<Vec<Bucket<K, V>>, AllocError> {
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(capacity)
            .map_err(|err| AllocError::new(Storage::BucketArray, err))?;
        buckets.resize_with(capacity, Bucket::new);
        Ok(buckets)
    }

    fn from_parts(buckets: Vec<Bucket<K, V>>, config: Config) -> Self {
        Self {
            buckets,
            len: 0,
            config,
            #[cfg(test)]
            fail_after: core::cell::Cell::new(None),
        }
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the sizing and load-factor policy of this table.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current load factor, `len / capacity`.
    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.buckets.len() as f64
    }

    #[inline(always)]
    fn bucket_index(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    #[inline]
    fn find_index(&self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<(usize, usize)> {
        let bucket_index = self.bucket_index(hash);
        self.buckets[bucket_index]
            .position(hash, eq)
            .map(|index| (bucket_index, index))
    }

    /// Gates every allocation so tests can make any one of them fail.
    #[inline(always)]
    fn check_alloc(&self) -> Result<(), TryReserveError> {
        #[cfg(test)]
        if let Some(remaining) = self.fail_after.get() {
            if remaining == 0 {
                return Err(tests::injected_failure());
            }
            self.fail_after.set(Some(remaining - 1));
        }

        Ok(())
    }

    /// Returns a reference to the value stored under the matching key.
    ///
    /// Entries in the target bucket are compared by hash first; `eq` runs
    /// only for entries whose cached hash equals `hash`.
    pub fn get(&self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<&V> {
        self.get_key_value(hash, eq).map(|(_, value)| value)
    }

    /// Returns the stored key and value for the matching key.
    pub fn get_key_value(&self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<(&K, &V)> {
        let (bucket_index, index) = self.find_index(hash, eq)?;
        let entry = &self.buckets[bucket_index].entries[index];
        Some((&entry.key, &entry.value))
    }

    /// Returns a mutable reference to the value stored under the matching
    /// key.
    pub fn get_mut(&mut self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<&mut V> {
        let (bucket_index, index) = self.find_index(hash, eq)?;
        Some(&mut self.buckets[bucket_index].entries[index].value)
    }

    /// Returns `true` if the table holds the matching key.
    pub fn contains(&self, hash: u32, eq: impl Fn(&K) -> bool) -> bool {
        self.find_index(hash, eq).is_some()
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// `eq` compares a stored key against `key`. If a matching entry exists
    /// its value is replaced in place and the old value returned; the stored
    /// key and the length are unchanged. Otherwise a new entry is appended
    /// to its bucket and `None` returned.
    ///
    /// After appending, the table doubles its bucket count if the load
    /// factor now exceeds `max_load`. The insertion stands even if that
    /// resize cannot allocate; only failure to grow the target bucket
    /// itself is reported, and then nothing is inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::Config;
    /// # use chain_hash::HashTable;
    /// #
    /// let config = Config::default().with_max_load(0.8);
    /// let mut table = HashTable::try_with_config(config)?;
    /// for key in 0..12u32 {
    ///     table.set(key, key, (), |a, b| a == b)?;
    /// }
    /// assert_eq!(table.capacity(), 16);
    ///
    /// // 13 / 16 > 0.8
    /// table.set(12, 12, (), |a, b| a == b)?;
    /// assert_eq!(table.capacity(), 32);
    /// # Ok::<(), chain_hash::Error>(())
    /// ```
    pub fn set(
        &mut self,
        hash: u32,
        key: K,
        value: V,
        eq: impl Fn(&K, &K) -> bool,
    ) -> Result<Option<V>, AllocError> {
        let bucket_index = self.bucket_index(hash);
        if let Some(index) = self.buckets[bucket_index].position(hash, |stored| eq(stored, &key)) {
            let entry = &mut self.buckets[bucket_index].entries[index];
            return Ok(Some(mem::replace(&mut entry.value, value)));
        }

        if self.buckets[bucket_index].is_full() {
            self.grow_bucket(bucket_index)?;
        }
        self.buckets[bucket_index]
            .entries
            .push(Entry { hash, key, value });
        self.len += 1;

        if self.config.should_grow(self.len, self.buckets.len()) {
            self.grow();
        }

        Ok(None)
    }

    #[cold]
    fn grow_bucket(&mut self, bucket_index: usize) -> Result<(), AllocError> {
        let bucket_size = self.config.bucket_size();
        log::trace!(
            "growing bucket {bucket_index} beyond {} entries",
            self.buckets[bucket_index].len()
        );

        self.check_alloc()
            .and_then(|()| self.buckets[bucket_index].grow(bucket_size))
            .map_err(|err| AllocError::new(Storage::BucketEntries, err))
    }

    #[cold]
    fn grow(&mut self) {
        let Some(target) = self.buckets.len().checked_mul(2) else {
            log::warn!(
                "keeping {} buckets at load {:.3}, doubling overflows usize",
                self.buckets.len(),
                self.load_factor()
            );
            return;
        };

        if let Err(err) = self.resize(target) {
            log::warn!(
                "keeping {} buckets at load {:.3}, grow to {target} failed: {err}",
                self.buckets.len(),
                self.load_factor()
            );
        }
    }

    /// Removes the matching key, returning the stored key and value.
    ///
    /// Later entries in the same bucket shift down, so their relative order
    /// is kept. A bucket left less than half full releases part of its
    /// storage. Independently, if the load factor drops below `min_load`
    /// and the table is above its minimum capacity, the bucket count halves
    /// (never below the minimum). Absent keys return `None` and leave the
    /// table untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.set(1, 1u32, 'a', |a, b| a == b)?;
    ///
    /// assert_eq!(table.delete(1, |&k| k == 1), Some((1, 'a')));
    /// assert_eq!(table.delete(1, |&k| k == 1), None);
    /// assert!(table.is_empty());
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn delete(&mut self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        let (bucket_index, index) = self.find_index(hash, eq)?;
        let bucket_size = self.config.bucket_size();
        let entry = self.buckets[bucket_index].remove(index, bucket_size);
        self.len -= 1;

        if self.config.should_shrink(self.len, self.buckets.len()) {
            self.shrink();
        }

        Some((entry.key, entry.value))
    }

    #[cold]
    fn shrink(&mut self) {
        let target = (self.buckets.len() / 2).max(self.config.min_capacity());
        if let Err(err) = self.resize(target) {
            log::warn!(
                "keeping {} buckets at load {:.3}, shrink to {target} failed: {err}",
                self.buckets.len(),
                self.load_factor()
            );
        }
    }

    /// Rehashes every entry into `capacity` buckets.
    ///
    /// `capacity` is raised to the configured minimum if smaller. All new
    /// storage is allocated before any entry moves, so on failure the table
    /// is left exactly as it was. Entries that share a new bucket keep
    /// their relative iteration order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for key in 0..10u32 {
    ///     table.set(key, key, key * 2, |a, b| a == b)?;
    /// }
    ///
    /// table.resize(64)?;
    /// assert_eq!(table.capacity(), 64);
    /// assert_eq!(table.get(9, |&k| k == 9), Some(&18));
    ///
    /// assert!(table.resize(usize::MAX).is_err());
    /// assert_eq!(table.capacity(), 64);
    /// assert_eq!(table.len(), 10);
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn resize(&mut self, capacity: usize) -> Result<(), AllocError> {
        let capacity = capacity.max(self.config.min_capacity());
        let buckets = self.rehash_layout(capacity)?;

        let old_capacity = self.buckets.len();
        let old_buckets = mem::replace(&mut self.buckets, buckets);
        for entry in old_buckets.into_iter().flat_map(|bucket| bucket.entries) {
            let index = entry.hash as usize % capacity;
            // Storage for every entry was reserved by `rehash_layout`.
            debug_assert!(!self.buckets[index].is_full());
            self.buckets[index].entries.push(entry);
        }

        log::debug!(
            "resized table from {old_capacity} to {capacity} buckets holding {} entries",
            self.len
        );
        Ok(())
    }

    /// Allocates empty buckets sized for the current entries under
    /// `capacity`.
    fn rehash_layout(&self, capacity: usize) -> Result<Vec<Bucket<K, V>>, AllocError> {
        let array_failure = |err| AllocError::new(Storage::BucketArray, err);

        let mut counts: Vec<usize> = Vec::new();
        self.check_alloc()
            .and_then(|()| counts.try_reserve_exact(capacity))
            .map_err(array_failure)?;
        counts.resize(capacity, 0);
        for bucket in &self.buckets {
            for entry in &bucket.entries {
                counts[entry.hash as usize % capacity] += 1;
            }
        }

        let mut buckets = Vec::new();
        self.check_alloc()
            .and_then(|()| buckets.try_reserve_exact(capacity))
            .map_err(array_failure)?;

        let bucket_size = self.config.bucket_size();
        for count in counts {
            if count == 0 {
                buckets.push(Bucket::new());
                continue;
            }

            let bucket = self
                .check_alloc()
                .and_then(|()| Bucket::with_room_for(count, bucket_size))
                .map_err(|err| AllocError::new(Storage::BucketEntries, err))?;
            buckets.push(bucket);
        }

        Ok(buckets)
    }

    /// Removes every entry, releasing bucket storage but keeping the bucket
    /// count.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.entries = Vec::new();
        }
        self.len = 0;
    }

    /// Returns a cursor positioned before the first entry.
    ///
    /// The cursor walks buckets in index order and the entries of each
    /// bucket in storage order. It borrows the table, so the table cannot be
    /// modified while the cursor is alive.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.set(3, 3u32, "c", |a, b| a == b)?;
    /// table.set(1, 1u32, "a", |a, b| a == b)?;
    ///
    /// let mut cursor = table.iterate();
    /// assert_eq!(cursor.key(), None);
    ///
    /// let mut seen = Vec::new();
    /// while cursor.advance() {
    ///     seen.push((*cursor.key().unwrap(), *cursor.value().unwrap()));
    /// }
    /// assert_eq!(seen, [(1, "a"), (3, "c")]);
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn iterate(&self) -> Cursor<'_, K, V> {
        Cursor {
            buckets: &self.buckets,
            position: Position::START,
        }
    }

    /// Returns a cursor that can modify values in place.
    pub fn iterate_mut(&mut self) -> CursorMut<'_, K, V> {
        CursorMut {
            buckets: &mut self.buckets,
            position: Position::START,
        }
    }

    /// Returns an iterator over all key/value pairs, in cursor order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            entries: Default::default(),
            remaining: self.len,
        }
    }

    /// Returns an iterator over all key/value pairs with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            buckets: self.buckets.iter_mut(),
            entries: Default::default(),
            remaining: self.len,
        }
    }

    /// Returns an iterator that removes and yields every entry.
    ///
    /// The bucket count is kept. Entries not consumed are removed when the
    /// iterator is dropped.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            table: self,
            bucket_index: 0,
            entries: Vec::new().into_iter(),
        }
    }

    #[cfg(feature = "stats")]
    pub(crate) fn bucket_shapes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.buckets
            .iter()
            .map(|bucket| (bucket.len(), bucket.entries.capacity()))
    }

    #[cfg(feature = "stats")]
    pub(crate) const ENTRY_SIZE: usize = mem::size_of::<Entry<K, V>>();

    #[cfg(feature = "stats")]
    pub(crate) const BUCKET_SIZE: usize = mem::size_of::<Bucket<K, V>>();
}

/// A cursor location: `entry_index` is `None` before the first entry and
/// after the last.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Position {
    bucket_index: usize,
    entry_index: Option<usize>,
}

impl Position {
    const START: Self = Self {
        bucket_index: 0,
        entry_index: None,
    };

    fn advance<K, V>(&mut self, buckets: &[Bucket<K, V>]) -> bool {
        let next_entry = self.entry_index.map_or(0, |index| index + 1);
        if buckets
            .get(self.bucket_index)
            .is_some_and(|bucket| next_entry < bucket.len())
        {
            self.entry_index = Some(next_entry);
            return true;
        }

        let next_bucket = buckets
            .get(self.bucket_index + 1..)
            .and_then(|rest| rest.iter().position(|bucket| bucket.len() > 0));
        match next_bucket {
            Some(offset) => {
                self.bucket_index += 1 + offset;
                self.entry_index = Some(0);
                true
            }
            None => {
                self.bucket_index = buckets.len();
                self.entry_index = None;
                false
            }
        }
    }

    fn entry<'a, K, V>(&self, buckets: &'a [Bucket<K, V>]) -> Option<&'a Entry<K, V>> {
        buckets
            .get(self.bucket_index)?
            .entries
            .get(self.entry_index?)
    }

    fn entry_mut<'a, K, V>(
        &self,
        buckets: &'a mut [Bucket<K, V>],
    ) -> Option<&'a mut Entry<K, V>> {
        buckets
            .get_mut(self.bucket_index)?
            .entries
            .get_mut(self.entry_index?)
    }
}

/// A restartable, read-only cursor over a [`HashTable`].
///
/// Created by [`HashTable::iterate`]. Call [`advance`](Self::advance) to
/// move to each entry in turn.
pub struct Cursor<'a, K, V> {
    buckets: &'a [Bucket<K, V>],
    position: Position,
}

impl<'a, K, V> Cursor<'a, K, V> {
    /// Moves to the next entry, skipping empty buckets.
    ///
    /// Returns `false` once no entries remain; the cursor then points past
    /// the end and yields no key or value.
    pub fn advance(&mut self) -> bool {
        self.position.advance(self.buckets)
    }

    /// Moves back before the first entry.
    pub fn reset(&mut self) {
        self.position = Position::START;
    }

    /// The key at the cursor, or `None` before the first `advance` or past
    /// the end.
    pub fn key(&self) -> Option<&'a K> {
        self.position.entry(self.buckets).map(|entry| &entry.key)
    }

    /// The value at the cursor.
    pub fn value(&self) -> Option<&'a V> {
        self.position.entry(self.buckets).map(|entry| &entry.value)
    }

    /// The key and value at the cursor.
    pub fn key_value(&self) -> Option<(&'a K, &'a V)> {
        self.position
            .entry(self.buckets)
            .map(|entry| (&entry.key, &entry.value))
    }
}

/// A restartable cursor over a [`HashTable`] that can modify values.
///
/// Created by [`HashTable::iterate_mut`].
pub struct CursorMut<'a, K, V> {
    buckets: &'a mut [Bucket<K, V>],
    position: Position,
}

impl<K, V> CursorMut<'_, K, V> {
    /// Moves to the next entry, skipping empty buckets.
    pub fn advance(&mut self) -> bool {
        self.position.advance(self.buckets)
    }

    /// Moves back before the first entry.
    pub fn reset(&mut self) {
        self.position = Position::START;
    }

    /// The key at the cursor.
    pub fn key(&self) -> Option<&K> {
        self.position.entry(self.buckets).map(|entry| &entry.key)
    }

    /// The value at the cursor.
    pub fn value(&self) -> Option<&V> {
        self.position.entry(self.buckets).map(|entry| &entry.value)
    }

    /// A mutable reference to the value at the cursor.
    pub fn value_mut(&mut self) -> Option<&mut V> {
        self.position
            .entry_mut(self.buckets)
            .map(|entry| &mut entry.value)
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// Created by [`HashTable::iter`].
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Bucket<K, V>>,
    entries: core::slice::Iter<'a, Entry<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                self.remaining -= 1;
                return Some((&entry.key, &entry.value));
            }
            self.entries = self.buckets.next()?.entries.iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`HashTable`].
///
/// Created by [`HashTable::iter_mut`].
pub struct IterMut<'a, K, V> {
    buckets: core::slice::IterMut<'a, Bucket<K, V>>,
    entries: core::slice::IterMut<'a, Entry<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                self.remaining -= 1;
                return Some((&entry.key, &mut entry.value));
            }
            self.entries = self.buckets.next()?.entries.iter_mut();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An owning iterator over the entries of a [`HashTable`].
pub struct IntoIter<K, V> {
    buckets: vec::IntoIter<Bucket<K, V>>,
    entries: vec::IntoIter<Entry<K, V>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                self.remaining -= 1;
                return Some((entry.key, entry.value));
            }
            self.entries = self.buckets.next()?.entries.into_iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> FusedIterator for IntoIter<K, V> {}

impl<K, V> IntoIterator for HashTable<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            buckets: self.buckets.into_iter(),
            entries: Vec::new().into_iter(),
            remaining: self.len,
        }
    }
}

impl<'a, K, V> IntoIterator for &'a HashTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V> IntoIterator for &'a mut HashTable<K, V> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A draining iterator over the entries of a [`HashTable`].
///
/// Created by [`HashTable::drain`].
pub struct Drain<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    bucket_index: usize,
    entries: vec::IntoIter<Entry<K, V>>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Some((entry.key, entry.value));
            }

            let bucket = self.table.buckets.get_mut(self.bucket_index)?;
            self.bucket_index += 1;

            let entries = mem::take(&mut bucket.entries);
            self.table.len -= entries.len();
            self.entries = entries.into_iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.len + self.entries.len();
        (remaining, Some(remaining))
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}

impl<K, V> Drop for Drain<'_, K, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    pub(crate) fn injected_failure() -> TryReserveError {
        let mut probe: Vec<u64> = Vec::new();
        probe.try_reserve(usize::MAX).unwrap_err()
    }

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    fn fold(hash: u64) -> u32 {
        (hash ^ (hash >> 32)) as u32
    }

    fn hash_key(state: &HashState, key: u64) -> u32 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        fold(h.finish())
    }

    fn hash_str(state: &HashState, key: &str) -> u32 {
        let mut h = state.build_hasher();
        h.write(key.as_bytes());
        fold(h.finish())
    }

    fn table_with(config: Config) -> HashTable<u32, u32> {
        HashTable::try_with_config(config).unwrap()
    }

    /// Inserts with the key as its own hash.
    fn put(table: &mut HashTable<u32, u32>, key: u32, value: u32) -> Option<u32> {
        table.set(key, key, value, |a, b| a == b).unwrap()
    }

    fn check_invariants<K, V>(table: &HashTable<K, V>) {
        let total: usize = table.buckets.iter().map(Bucket::len).sum();
        assert_eq!(table.len, total);
        assert!(table.capacity() >= table.config.min_capacity());
        for (index, bucket) in table.buckets.iter().enumerate() {
            for entry in &bucket.entries {
                assert_eq!(entry.hash as usize % table.capacity(), index);
            }
            if bucket.entries.capacity() == 0 {
                assert!(bucket.entries.is_empty());
            }
        }
    }

    #[test]
    fn insert_and_get() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.set(hash, k, (k as i32) * 2, |a, b| a == b), Ok(None));
            assert_eq!(table.get(hash, |&s| s == k), Some(&((k as i32) * 2)));
        }
        assert_eq!(table.len(), 32);
        check_invariants(&table);

        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(
                table.get_key_value(hash, |&s| s == k),
                Some((&k, &((k as i32) * 2))),
                "{:#?}",
                table
            );
        }

        let miss_hash = hash_key(&state, 999);
        assert!(table.get(miss_hash, |&s| s == 999).is_none());
        assert!(!table.contains(miss_hash, |&s| s == 999));
    }

    #[test]
    fn overwrite_keeps_len_and_key() {
        let state = HashState::default();
        let mut table: HashTable<String, i32> = HashTable::new();
        let hash = hash_str(&state, "key");

        assert_eq!(table.set(hash, "key".to_string(), 1, |a, b| a == b), Ok(None));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.set(hash, "key".to_string(), 2, |a, b| a == b),
            Ok(Some(1))
        );
        assert_eq!(
            table.set(hash, "key".to_string(), 3, |a, b| a == b),
            Ok(Some(2))
        );

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(hash, |k| k == "key"), Some(&3));
        check_invariants(&table);
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut table = HashTable::new();
        for k in 0..5 {
            put(&mut table, k, 1);
        }
        for k in 0..5 {
            if let Some(v) = table.get_mut(k, |&s| s == k) {
                *v += 9;
            }
        }
        for k in 0..5 {
            assert_eq!(table.get(k, |&s| s == k), Some(&10));
        }
        assert!(table.get_mut(5, |&s| s == 5).is_none());
    }

    #[test]
    fn delete_present_and_absent() {
        let mut table = HashTable::new();
        for k in 0..8 {
            put(&mut table, k, k * 10);
        }

        for k in [0u32, 3, 7] {
            assert_eq!(table.delete(k, |&s| s == k), Some((k, k * 10)));
            assert!(table.get(k, |&s| s == k).is_none());
        }
        assert_eq!(table.len(), 5);

        let before: Vec<(u32, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(table.delete(1000, |&s| s == 1000), None);
        assert_eq!(table.delete(3, |&s| s == 3), None);
        let after: Vec<(u32, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(before, after);
        assert_eq!(table.len(), 5);
        check_invariants(&table);
    }

    #[test]
    fn delete_one_of_two_string_keys() {
        let state = HashState::default();
        let mut table: HashTable<String, i32> = HashTable::new();
        for (key, value) in [("a", 1), ("b", 2)] {
            let hash = hash_str(&state, key);
            table
                .set(hash, key.to_string(), value, |a, b| a == b)
                .unwrap();
        }

        let hash_a = hash_str(&state, "a");
        assert!(table.delete(hash_a, |k| k == "a").is_some());
        assert_eq!(table.get(hash_a, |k| k == "a"), None);

        let hash_b = hash_str(&state, "b");
        assert_eq!(table.get(hash_b, |k| k == "b"), Some(&2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn hash_is_checked_before_comparator() {
        let mut table: HashTable<u32, u32> = HashTable::new();
        // 1 and 17 share bucket 1 but differ in hash
        put(&mut table, 1, 1);
        put(&mut table, 17, 17);

        let calls = core::cell::Cell::new(0);
        let found = table.get(17, |&k| {
            calls.set(calls.get() + 1);
            k == 17
        });
        assert_eq!(found, Some(&17));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn grows_on_thirteenth_insert_at_default_load() {
        let mut table = table_with(Config::default().with_max_load(0.8));
        for k in 0..12 {
            put(&mut table, k, k);
            assert_eq!(table.capacity(), 16);
        }

        put(&mut table, 12, 12);
        assert_eq!(table.capacity(), 32);
        check_invariants(&table);
    }

    #[test]
    fn grows_when_load_first_exceeds_two() {
        let mut table = table_with(Config::default().with_max_load(2.0));
        for k in 0..32 {
            put(&mut table, k, k);
            assert_eq!(table.capacity(), 16, "grew early at {} entries", k + 1);
        }

        put(&mut table, 32, 32);
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.len(), 33);
        check_invariants(&table);
    }

    #[test]
    fn overwrite_never_grows() {
        let mut table = table_with(Config::default().with_max_load(0.8));
        for k in 0..12 {
            put(&mut table, k, k);
        }
        for _ in 0..10 {
            put(&mut table, 5, 0);
        }
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 12);
    }

    #[test]
    fn disabled_max_load_never_grows() {
        let mut table = table_with(Config::default().without_max_load());
        for k in 0..1000 {
            put(&mut table, k, k);
        }
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 1000);
        check_invariants(&table);
    }

    #[test]
    fn shrinks_below_min_load_and_respects_floor() {
        let config = Config::default().with_max_load(0.8).with_min_load(0.2);
        let mut table = table_with(config);
        for k in 0..100 {
            put(&mut table, k, k);
        }
        assert_eq!(table.capacity(), 128);

        // 26 / 128 > 0.2, 25 / 128 < 0.2
        for k in 0..74 {
            table.delete(k, |&s| s == k);
        }
        assert_eq!(table.len(), 26);
        assert_eq!(table.capacity(), 128);
        table.delete(74, |&s| s == 74);
        assert_eq!(table.capacity(), 64);

        for k in 75..100 {
            table.delete(k, |&s| s == k);
            assert!(table.capacity() >= 16);
            check_invariants(&table);
        }
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 16);
    }

    #[test]
    fn custom_minimum_capacity_is_floor() {
        let config = Config::default()
            .with_min_capacity(4)
            .with_initial_capacity(4)
            .with_max_load(1.0)
            .with_min_load(0.25);
        let mut table = table_with(config);
        assert_eq!(table.capacity(), 4);

        for k in 0..20 {
            put(&mut table, k, k);
        }
        assert_eq!(table.capacity(), 32);

        for k in 0..20 {
            table.delete(k, |&s| s == k);
        }
        assert_eq!(table.capacity(), 4);

        table.resize(1).unwrap();
        assert_eq!(table.capacity(), 4);
    }

    #[test]
    fn resize_preserves_entries() {
        let state = HashState::default();
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(16);
        for k in 0..500u64 {
            let hash = hash_key(&state, k);
            table.set(hash, k, k * 3, |a, b| a == b).unwrap();
        }

        for capacity in [1024, 17, 16, 333, 4096] {
            table.resize(capacity).unwrap();
            assert_eq!(table.capacity(), capacity);
            assert_eq!(table.len(), 500);
            check_invariants(&table);
            for k in 0..500u64 {
                let hash = hash_key(&state, k);
                assert_eq!(table.get(hash, |&s| s == k), Some(&(k * 3)));
            }
            let mut keys: Vec<u64> = table.iter().map(|(k, _)| *k).collect();
            keys.sort_unstable();
            assert_eq!(keys, (0..500u64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn resize_keeps_collision_order() {
        let mut table: HashTable<u32, u32> = HashTable::with_capacity(16);
        for k in 0..6 {
            // every key collides
            table.set(0, k, k, |a, b| a == b).unwrap();
        }
        table.resize(64).unwrap();

        let keys: Vec<u32> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn resize_overflow_leaves_table_unchanged() {
        let mut table = HashTable::new();
        for k in 0..10 {
            put(&mut table, k, k);
        }
        let before: Vec<(u32, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();

        let err = table.resize(usize::MAX).unwrap_err();
        assert_eq!(err.storage(), Storage::BucketArray);

        let after: Vec<(u32, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(before, after);
        assert_eq!(table.capacity(), 16);
        check_invariants(&table);
    }

    #[test]
    fn resize_failure_mid_rehash_is_atomic() {
        let mut table = HashTable::new();
        for k in 0..10 {
            put(&mut table, k, k + 100);
        }
        let before: Vec<(u32, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();

        // counts and bucket array succeed, third bucket's entries fail
        table.fail_after.set(Some(4));
        let err = table.resize(64).unwrap_err();
        assert_eq!(err.storage(), Storage::BucketEntries);
        table.fail_after.set(None);

        let after: Vec<(u32, u32)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(before, after);
        assert_eq!(table.capacity(), 16);
        check_invariants(&table);

        table.resize(64).unwrap();
        assert_eq!(table.capacity(), 64);
    }

    #[test]
    fn failed_grow_keeps_insertion() {
        let mut table = table_with(Config::default().with_max_load(0.8));
        for k in 0..12 {
            put(&mut table, k, k);
        }

        // the new bucket allocation succeeds, the triggered resize does not
        table.fail_after.set(Some(1));
        assert_eq!(table.set(12, 12, 12, |a, b| a == b), Ok(None));
        table.fail_after.set(None);

        assert_eq!(table.len(), 13);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.get(12, |&k| k == 12), Some(&12));
        check_invariants(&table);

        // the next insertion retries the grow
        put(&mut table, 13, 13);
        assert_eq!(table.capacity(), 32);
    }

    #[test]
    fn failed_bucket_grow_inserts_nothing() {
        let mut table = HashTable::new();
        put(&mut table, 1, 1);

        table.fail_after.set(Some(0));
        let err = table.set(17, 17, 17, |a, b| a == b).unwrap_err();
        assert_eq!(err.storage(), Storage::BucketEntries);

        // overwriting needs no allocation
        assert_eq!(table.set(1, 1, 2, |a, b| a == b), Ok(Some(1)));
        table.fail_after.set(None);

        assert_eq!(table.len(), 1);
        assert!(!table.contains(17, |&k| k == 17));
        check_invariants(&table);
    }

    #[test]
    fn bucket_storage_doubles_and_shrinks() {
        let config = Config::default().without_max_load().without_min_load();
        let mut table = table_with(config);
        assert_eq!(table.buckets[0].entries.capacity(), 0);

        let mut capacities = Vec::new();
        for k in 0..8 {
            table.set(0, k, k, |a, b| a == b).unwrap();
            capacities.push(table.buckets[0].entries.capacity());
        }
        assert_eq!(capacities, vec![1, 2, 4, 4, 8, 8, 8, 8]);

        for k in 0..5 {
            table.delete(0, |&s| s == k);
        }
        assert_eq!(table.buckets[0].len(), 3);
        assert!(table.buckets[0].entries.capacity() <= 4);

        for k in 5..8 {
            table.delete(0, |&s| s == k);
        }
        assert_eq!(table.buckets[0].entries.capacity(), 0);
        check_invariants(&table);
    }

    #[test]
    fn bucket_storage_never_shrinks_below_bucket_size() {
        let config = Config::default()
            .with_bucket_size(3)
            .without_max_load()
            .without_min_load();
        let mut table = table_with(config);

        for k in 0..3 {
            table.set(0, k, k, |a, b| a == b).unwrap();
        }
        assert_eq!(table.buckets[0].entries.capacity(), 3);

        // one entry left in three slots stays at the first allocation
        for k in 0..2 {
            table.delete(0, |&s| s == k);
        }
        assert_eq!(table.buckets[0].len(), 1);
        assert_eq!(table.buckets[0].entries.capacity(), 3);

        let mut capacities = Vec::new();
        for k in 3..7 {
            table.set(0, k, k, |a, b| a == b).unwrap();
            capacities.push(table.buckets[0].entries.capacity());
        }
        assert_eq!(capacities, vec![3, 3, 6, 6]);

        // halving from 6 lands back on 3, not below
        for k in 2..6 {
            table.delete(0, |&s| s == k);
            assert!(table.buckets[0].entries.capacity() >= 3);
        }
        assert_eq!(table.buckets[0].len(), 1);

        for k in 7..10 {
            table.set(0, k, k, |a, b| a == b).unwrap();
        }
        assert_eq!(table.buckets[0].len(), 4);
        assert_eq!(table.buckets[0].entries.capacity() % 3, 0);
        check_invariants(&table);
    }

    #[test]
    fn larger_bucket_size_is_first_allocation() {
        let config = Config::default().with_bucket_size(4);
        let mut table = table_with(config);
        put(&mut table, 3, 3);
        assert_eq!(table.buckets[3].entries.capacity(), 4);
    }

    #[test]
    fn delete_preserves_bucket_order() {
        let mut table: HashTable<u32, u32> = HashTable::new();
        for k in 1..=5 {
            table.set(0, k, k, |a, b| a == b).unwrap();
        }
        table.delete(0, |&k| k == 2);

        let keys: Vec<u32> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3, 4, 5]);
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..65u64 {
            table.set(0, k, k as i32, |a, b| a == b).unwrap();
        }

        assert_eq!(table.len(), 65);
        for k in 0..65u64 {
            assert_eq!(table.get(0, |&s| s == k), Some(&(k as i32)), "{:#?}", table);
        }
        check_invariants(&table);
    }

    #[test]
    fn cursor_visits_every_entry_once() {
        let state = HashState::default();
        let mut table: HashTable<u64, u64> = HashTable::new();
        for k in 0..200u64 {
            table
                .set(hash_key(&state, k), k, k + 1, |a, b| a == b)
                .unwrap();
        }

        let mut cursor = table.iterate();
        assert_eq!(cursor.key(), None);
        assert_eq!(cursor.value(), None);

        let mut seen = Vec::new();
        while cursor.advance() {
            let (k, v) = cursor.key_value().unwrap();
            assert_eq!(*v, *k + 1);
            seen.push(*k);
        }
        assert!(!cursor.advance());
        assert_eq!(cursor.key(), None);

        seen.sort_unstable();
        assert_eq!(seen, (0..200u64).collect::<Vec<_>>());

        cursor.reset();
        assert!(cursor.advance());
        assert!(cursor.key().is_some());
    }

    #[test]
    fn cursor_order_matches_buckets() {
        let mut table: HashTable<u32, u32> = HashTable::new();
        for k in [33u32, 2, 17, 1, 15] {
            put(&mut table, k, k);
        }

        let mut cursor = table.iterate();
        let mut keys = Vec::new();
        while cursor.advance() {
            keys.push(*cursor.key().unwrap());
        }
        // buckets 1: [33, 17, 1], 2: [2], 15: [15]
        assert_eq!(keys, vec![33, 17, 1, 2, 15]);

        let iterated: Vec<u32> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(iterated, keys);
    }

    #[test]
    fn cursor_on_empty_table() {
        let table: HashTable<u32, u32> = HashTable::new();
        let mut cursor = table.iterate();
        assert!(!cursor.advance());
        assert!(!cursor.advance());
        assert_eq!(cursor.key_value(), None);
    }

    #[test]
    fn cursor_mut_updates_values() {
        let mut table = HashTable::new();
        for k in 0..40 {
            put(&mut table, k, k);
        }

        let mut cursor = table.iterate_mut();
        assert!(cursor.value_mut().is_none());
        while cursor.advance() {
            let key = *cursor.key().unwrap();
            *cursor.value_mut().unwrap() = key * 2;
        }

        for k in 0..40 {
            assert_eq!(table.get(k, |&s| s == k), Some(&(k * 2)));
        }
    }

    #[test]
    fn iter_mut_into_iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<u64, u64> = HashTable::new();
        for k in 10..20u64 {
            table.set(hash_key(&state, k), k, k, |a, b| a == b).unwrap();
        }
        assert_eq!(table.iter().len(), 10);

        for (_, v) in table.iter_mut() {
            *v += 1;
        }
        for (k, v) in &table {
            assert_eq!(*v, *k + 1);
        }

        let mut copy = table.clone();
        let drained: Vec<(u64, u64)> = table.drain().collect();
        assert_eq!(drained.len(), 10);
        assert!(table.is_empty());
        check_invariants(&table);
        for k in 10..20u64 {
            assert!(!table.contains(hash_key(&state, k), |&s| s == k));
        }

        let mut owned: Vec<u64> = copy.clone().into_iter().map(|(k, _)| k).collect();
        owned.sort_unstable();
        assert_eq!(owned, (10..20u64).collect::<Vec<_>>());

        // partially consumed drain still empties the table
        let mut drain = copy.drain();
        assert!(drain.next().is_some());
        drop(drain);
        assert!(copy.is_empty());
        check_invariants(&copy);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut table = HashTable::new();
        for k in 0..100 {
            put(&mut table, k, k);
        }
        let capacity = table.capacity();

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert!(table.buckets.iter().all(|b| b.entries.capacity() == 0));

        put(&mut table, 1, 1);
        assert_eq!(table.get(1, |&k| k == 1), Some(&1));
    }

    #[test]
    fn clone_is_independent() {
        let state = HashState::default();
        let mut original: HashTable<String, i32> = HashTable::new();
        for (key, value) in [("hello", 1), ("world", 2), ("rust", 3)] {
            original
                .set(hash_str(&state, key), key.to_string(), value, |a, b| a == b)
                .unwrap();
        }

        let cloned = original.clone();
        let hash = hash_str(&state, "hello");
        *original.get_mut(hash, |k| k == "hello").unwrap() = 999;

        assert_eq!(original.get(hash, |k| k == "hello"), Some(&999));
        assert_eq!(cloned.get(hash, |k| k == "hello"), Some(&1));
        assert_eq!(cloned.len(), 3);
    }

    #[test]
    fn try_with_capacity_reports_overflow() {
        let table: HashTable<u32, u32> = HashTable::try_with_capacity(8).unwrap();
        assert_eq!(table.capacity(), 16);

        let err = HashTable::<u32, u32>::try_with_capacity(usize::MAX).unwrap_err();
        assert_eq!(err.storage(), Storage::BucketArray);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config::default().with_bucket_size(0);
        assert!(matches!(
            HashTable::<u32, u32>::try_with_config(config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn random_operations_match_model() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let config = Config::default().with_max_load(1.5).with_min_load(0.25);
        let mut table: HashTable<u32, u32> = table_with(config);
        let mut model: Vec<Option<u32>> = vec![None; 512];

        for step in 0..20_000u32 {
            let key = rng.random_range(0..512u32);
            // a weak hash keeps buckets crowded
            let hash = key.wrapping_mul(7) >> 2;
            match rng.random_range(0..3) {
                0 | 1 => {
                    let previous = table.set(hash, key, step, |a, b| a == b).unwrap();
                    assert_eq!(previous, model[key as usize].replace(step));
                }
                _ => {
                    let removed = table.delete(hash, |&k| k == key).map(|(_, v)| v);
                    assert_eq!(removed, model[key as usize].take());
                }
            }

            assert_eq!(table.len(), model.iter().flatten().count());
            if step % 997 == 0 {
                check_invariants(&table);
            }
        }

        check_invariants(&table);
        for (key, value) in model.iter().enumerate() {
            let key = key as u32;
            let hash = key.wrapping_mul(7) >> 2;
            assert_eq!(table.get(hash, |&k| k == key), value.as_ref());
        }
    }
}

use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;

use crate::config::Config;
use crate::error::AllocError;
use crate::error::Error;
use crate::hash_table;
use crate::hash_table::HashTable;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`HashMap::new`] and
        /// [`HashMap::with_capacity`].
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`HashMap::new`] and
        /// [`HashMap::with_capacity`].
        pub type DefaultHashBuilder = std::hash::RandomState;
    }
}

/// Folds a 64-bit hash into the 32 bits the table stores, keeping entropy
/// from both halves.
#[inline(always)]
pub fn fold_hash(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

/// A hash map implemented on top of the separate-chaining [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement `Hash + Eq`
/// and uses a configurable hasher builder `S` to hash keys. The 64-bit hash
/// is folded to 32 bits with [`fold_hash`]; sizing and load-factor policy
/// come from a [`Config`].
///
/// # Examples
///
/// ```rust
/// use chain_hash::DefaultHashBuilder;
/// use chain_hash::HashMap;
///
/// let mut map: HashMap<&str, i32, DefaultHashBuilder> = HashMap::new();
/// map.insert("a", 1)?;
/// map.insert("b", 2)?;
/// assert!(map.delete("a"));
///
/// assert_eq!(map.get("a"), None);
/// assert_eq!(map.get("b"), Some(&2));
/// assert_eq!(map.len(), 1);
/// # Ok::<(), chain_hash::AllocError>(())
/// ```
#[derive(Clone)]
pub struct HashMap<K, V, S> {
    table: HashTable<K, V>,
    hash_builder: S,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of buckets.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the sizing and load-factor policy of the map.
    pub fn config(&self) -> &Config {
        self.table.config()
    }

    /// Returns the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the underlying table.
    pub fn table(&self) -> &HashTable<K, V> {
        &self.table
    }

    /// Removes all elements from the map, keeping the bucket count.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Rehashes the map into `capacity` buckets.
    ///
    /// On failure the map is unchanged. See [`HashTable::resize`].
    pub fn resize(&mut self, capacity: usize) -> Result<(), AllocError> {
        self.table.resize(capacity)
    }

    /// Returns an iterator over the key-value pairs of the map.
    ///
    /// Pairs are yielded bucket by bucket; the order depends on the hasher
    /// and the bucket count.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the key-value pairs with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Returns an iterator that removes and yields all key-value pairs from
    /// the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashMap;
    /// #
    /// let mut map: HashMap<i32, &str, DefaultHashBuilder> = HashMap::new();
    /// map.insert(1, "a")?;
    /// map.insert(2, "b")?;
    ///
    /// let pairs: Vec<_> = map.drain().collect();
    /// assert!(map.is_empty());
    /// assert_eq!(pairs.len(), 2);
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Returns a cursor positioned before the first pair.
    ///
    /// See [`HashTable::iterate`].
    pub fn iterate(&self) -> hash_table::Cursor<'_, K, V> {
        self.table.iterate()
    }

    /// Returns a cursor that can modify values in place.
    pub fn iterate_mut(&mut self) -> hash_table::CursorMut<'_, K, V> {
        self.table.iterate_mut()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new hash map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use chain_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 16);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a new hash map with `capacity` buckets and the given hasher
    /// builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Creates a new hash map following `config`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::Config;
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashMap;
    /// #
    /// let config = Config::default().with_max_load(2.0).without_min_load();
    /// let mut map = HashMap::try_with_config_and_hasher(config, DefaultHashBuilder::default())?;
    /// for i in 0..32 {
    ///     map.insert(i, i)?;
    /// }
    /// assert_eq!(map.capacity(), 16);
    ///
    /// map.insert(32, 32)?;
    /// assert_eq!(map.capacity(), 32);
    /// # Ok::<(), chain_hash::Error>(())
    /// ```
    pub fn try_with_config_and_hasher(config: Config, hash_builder: S) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::try_with_config(config)?,
            hash_builder,
        })
    }

    #[inline]
    fn hash<Q>(&self, key: &Q) -> u32
    where
        Q: Hash + ?Sized,
    {
        fold_hash(self.hash_builder.hash_one(key))
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, `Ok(None)` is returned.
    /// If the map did have this key present, the value is updated, the key
    /// is left untouched, and the old value is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashMap;
    /// #
    /// let mut map: HashMap<i32, &str, DefaultHashBuilder> = HashMap::new();
    /// assert_eq!(map.insert(37, "a")?, None);
    /// assert_eq!(map.insert(37, "b")?, Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        let hash = self.hash(&key);
        self.table.set(hash, key, value, |stored, key| stored == key)
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.get(hash, |k| k.borrow() == key)
    }

    /// Returns the stored key and value corresponding to the key.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.get_key_value(hash, |k| k.borrow() == key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.get_mut(hash, |k| k.borrow() == key)
    }

    /// Returns `true` if the map contains a value for the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.contains(hash, |k| k.borrow() == key)
    }

    /// Removes a key from the map, returning the value at the key if the key
    /// was previously in the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashMap;
    /// #
    /// let mut map: HashMap<i32, &str, DefaultHashBuilder> = HashMap::new();
    /// map.insert(1, "a")?;
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if the
    /// key was previously in the map.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.delete(hash, |k| k.borrow() == key)
    }

    /// Removes a key from the map, returning whether it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).is_some()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a new hash map using the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a new hash map with `capacity` buckets using the default
    /// hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }

    /// Creates a new hash map following `config` with the default hasher
    /// builder.
    pub fn try_with_config(config: Config) -> Result<Self, Error> {
        Self::try_with_config_and_hasher(config, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator over the key-value pairs of a [`HashMap`].
pub struct Iter<'a, K, V> {
    inner: hash_table::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the key-value pairs of a [`HashMap`].
pub struct IterMut<'a, K, V> {
    inner: hash_table::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A mutable iterator over the values of a [`HashMap`].
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A draining iterator over the key-value pairs of a [`HashMap`].
pub struct Drain<'a, K, V> {
    inner: hash_table::Drain<'a, K, V>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, S> IntoIterator for HashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = hash_table::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.into_iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut HashMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

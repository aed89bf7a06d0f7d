use alloc::vec::Vec;

use crate::hash_table::HashTable;

/// Memory and collision statistics for a [`HashTable`].
///
/// Byte counts cover the table header, the bucket array and every bucket's
/// entry storage, split into storage holding entries and storage reserved
/// but unused.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    /// Number of entries.
    pub len: usize,
    /// Number of buckets.
    pub capacity: usize,
    /// Bytes of entry storage holding entries.
    pub used_bytes: usize,
    /// Bytes of entry storage reserved by buckets but empty.
    pub unused_bytes: usize,
    /// Bytes of the table header and bucket array.
    pub table_bytes: usize,
    /// Entries sharing a bucket with an earlier entry.
    pub collisions: usize,
    /// Length of the fullest bucket.
    pub longest_bucket: usize,
}

impl TableStats {
    /// `len / capacity`.
    pub fn load_factor(&self) -> f64 {
        ratio(self.len, self.capacity)
    }

    /// Fraction of all bytes that hold entries.
    pub fn efficiency(&self) -> f64 {
        ratio(self.used_bytes, self.total_bytes())
    }

    /// Fraction of entries that collided with another entry.
    pub fn collision_rate(&self) -> f64 {
        ratio(self.collisions, self.len)
    }

    /// Total bytes divided by entries.
    pub fn bytes_per_entry(&self) -> f64 {
        ratio(self.total_bytes(), self.len)
    }

    /// All bytes owned by the table.
    pub fn total_bytes(&self) -> usize {
        self.table_bytes + self.used_bytes + self.unused_bytes
    }

    /// Column headers matching [`row`](Self::row).
    #[cfg(feature = "std")]
    pub fn header() -> std::string::String {
        std::format!(
            "{:<7} | {:<7} | {:<5} | {:<5} | {:<5} | {:<6}\n\
             --------+---------+-------+-------+-------+-------",
            "len",
            "cap",
            "load",
            "eff",
            "coll",
            "bytes"
        )
    }

    /// One table row: len, capacity, load, efficiency, collision rate and
    /// bytes per entry.
    #[cfg(feature = "std")]
    pub fn row(&self) -> std::string::String {
        std::format!(
            "{:<7} | {:<7} | {:.3} | {:.3} | {:.3} | {:.2}",
            self.len,
            self.capacity,
            self.load_factor(),
            self.efficiency(),
            self.collision_rate(),
            self.bytes_per_entry()
        )
    }

    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        std::println!("=== Hash Table Statistics ===");
        std::println!(
            "Population: {} entries in {} buckets ({:.3} load factor)",
            self.len,
            self.capacity,
            self.load_factor()
        );
        std::println!(
            "Collisions: {} ({:.2}%), longest bucket {}",
            self.collisions,
            self.collision_rate() * 100.0,
            self.longest_bucket
        );
        std::println!(
            "Memory: {} bytes, {} holding entries ({:.2}% efficient, {:.2} bytes/entry)",
            self.total_bytes(),
            self.used_bytes,
            self.efficiency() * 100.0,
            self.bytes_per_entry()
        );
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl<K, V> HashTable<K, V> {
    /// Measures memory use and collisions.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.set(1, 1u32, 1u32, |a, b| a == b)?;
    /// table.set(17, 17u32, 17u32, |a, b| a == b)?;
    ///
    /// let stats = table.stats();
    /// assert_eq!(stats.len, 2);
    /// assert_eq!(stats.capacity, 16);
    /// assert_eq!(stats.collisions, 1);
    /// assert_eq!(stats.longest_bucket, 2);
    /// # Ok::<(), chain_hash::AllocError>(())
    /// ```
    pub fn stats(&self) -> TableStats {
        let mut stats = TableStats {
            len: self.len(),
            capacity: self.capacity(),
            used_bytes: 0,
            unused_bytes: 0,
            table_bytes: core::mem::size_of::<Self>() + self.capacity() * Self::BUCKET_SIZE,
            collisions: 0,
            longest_bucket: 0,
        };

        for (len, capacity) in self.bucket_shapes() {
            stats.used_bytes += len * Self::ENTRY_SIZE;
            stats.unused_bytes += (capacity - len) * Self::ENTRY_SIZE;
            stats.collisions += len.saturating_sub(1);
            stats.longest_bucket = stats.longest_bucket.max(len);
        }

        stats
    }

    /// Counts buckets by length: index `i` holds the number of buckets with
    /// exactly `i` entries.
    pub fn bucket_histogram(&self) -> Vec<usize> {
        let mut histogram = Vec::new();
        for (len, _) in self.bucket_shapes() {
            if histogram.len() <= len {
                histogram.resize(len + 1, 0);
            }
            histogram[len] += 1;
        }
        histogram
    }
}

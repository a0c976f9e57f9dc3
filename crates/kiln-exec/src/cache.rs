//! Fixed-capacity artifact caches for compiled programs and kernels.
//!
//! Entries are never evicted, overwritten or removed: the set of named
//! programs and kernels is fixed by the library, not by requests. The table
//! is sized once at construction so the launch path never rehashes.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use kiln_core::{ExecError, Result};

/// Composite key of the kernel cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub program: String,
    pub kernel: String,
}

impl KernelKey {
    pub fn new(program: &str, kernel: &str) -> Self {
        Self {
            program: program.to_string(),
            kernel: kernel.to_string(),
        }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.program, self.kernel)
    }
}

/// Associative cache of shared artifacts with a hard capacity.
///
/// Not internally synchronized; the owner serializes access.
pub struct ArtifactCache<K, V> {
    table: &'static str,
    entries: HashMap<K, Arc<V>>,
    capacity: usize,
}

impl<K, V> ArtifactCache<K, V>
where
    K: Eq + Hash + fmt::Display,
{
    /// Create a cache named `table` (used in diagnostics) holding at most
    /// `capacity` entries.
    pub fn new(table: &'static str, capacity: usize) -> Self {
        Self {
            table,
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Look up an entry. Absence is a caller error, never a silent default.
    pub fn get<Q>(&self, key: &Q) -> Result<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| ExecError::NotFound { key: key.to_string() })
    }

    /// Insert an entry and return the cached handle.
    ///
    /// If `key` is already present the existing entry is returned and `value`
    /// is dropped (first writer wins). A new key on a full table fails with
    /// `CapacityExceeded`.
    pub fn insert(&mut self, key: K, value: Arc<V>) -> Result<Arc<V>> {
        if let Some(existing) = self.entries.get(&key) {
            tracing::debug!("{} cache: '{}' already present, keeping first entry", self.table, key);
            return Ok(Arc::clone(existing));
        }
        if self.entries.len() >= self.capacity {
            return Err(ExecError::CapacityExceeded {
                table: self.table,
                capacity: self.capacity,
            });
        }
        self.entries.insert(key, Arc::clone(&value));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> fmt::Debug for ArtifactCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("table", &self.table)
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

use parking_lot::RwLock;
use std::{borrow::Borrow, collections::HashMap, hash::Hash};
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- KeyedPool -------------------------------------------------------------

/// Bounded concurrent map. Every operation takes the inner lock exactly once,
/// so calls are linearizable against each other.
#[derive(Debug)]
pub struct KeyedPool<K, V> {
    values: RwLock<HashMap<K, V>>,
    max: Option<usize>,
}

// -----------------------------------------------------------------------------
// ----- KeyedPool: Static -----------------------------------------------------

impl<K, V> KeyedPool<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn bounded(max: usize) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            max: Some(max),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            max: None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- KeyedPool: Public -----------------------------------------------------

impl<K, V> KeyedPool<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Inserts only if `key` is absent and the pool has room. On error the
    /// pool is left untouched.
    pub fn store(&self, key: K, value: V) -> Result<(), PoolError> {
        let mut guard = self.values.write();

        if guard.contains_key(&key) {
            return Err(PoolError::DuplicateKey);
        }

        if let Some(max) = self.max {
            if guard.len() >= max {
                return Err(PoolError::AtCapacity);
            }
        }

        guard.insert(key, value);
        Ok(())
    }

    pub fn get<Q>(&self, key: &Q) -> Result<V, PoolError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values
            .read()
            .get(key)
            .cloned()
            .ok_or(PoolError::NotFound)
    }

    pub fn update(&self, key: &K, value: V) -> Result<(), PoolError> {
        let mut guard = self.values.write();
        let slot = guard.get_mut(key).ok_or(PoolError::NotFound)?;
        *slot = value;
        Ok(())
    }

    /// No-op when the key is absent.
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.write().remove(key);
    }

    pub fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.read().contains_key(key)
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }

    pub fn size(&self) -> usize {
        self.values.read().len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.max
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("key already exists")]
    DuplicateKey,

    #[error("the pool is full")]
    AtCapacity,

    #[error("key does not exist in the pool")]
    NotFound,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

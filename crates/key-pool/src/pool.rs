//! Ordered, immutable set of API keys

use common::Secret;

use crate::error::{Error, Result};

/// Non-empty, ordered list of API keys. Read-only after construction.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    keys: Vec<Secret<String>>,
}

impl CredentialPool {
    /// Build a pool; fails with `NoKeys` when `keys` is empty.
    pub fn new(keys: Vec<Secret<String>>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::NoKeys);
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a constructed pool.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Secret<String>> {
        self.keys.get(index)
    }

    /// Index that follows `index` in round-robin order.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<Secret<String>> {
        names.iter().map(|k| Secret::new(k.to_string())).collect()
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert_eq!(CredentialPool::new(vec![]).unwrap_err(), Error::NoKeys);
    }

    #[test]
    fn keeps_load_order() {
        let pool = CredentialPool::new(keys(&["primary", "fallback1", "fallback2"])).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(!pool.is_empty());
        assert_eq!(pool.get(0).unwrap().expose(), "primary");
        assert_eq!(pool.get(2).unwrap().expose(), "fallback2");
        assert!(pool.get(3).is_none());
    }

    #[test]
    fn next_index_wraps() {
        let pool = CredentialPool::new(keys(&["a", "b", "c"])).unwrap();
        assert_eq!(pool.next_index(0), 1);
        assert_eq!(pool.next_index(1), 2);
        assert_eq!(pool.next_index(2), 0);
    }

    #[test]
    fn single_key_wraps_to_itself() {
        let pool = CredentialPool::new(keys(&["only"])).unwrap();
        assert_eq!(pool.next_index(0), 0);
    }
}

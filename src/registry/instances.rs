//! Instance cache - one live wrapper per native address

use crate::host::ObjectId;
use std::collections::HashMap;

/// Native address -> live wrapper
///
/// Entries hold no host reference; the interop context removes an entry
/// when the host reclaims its wrapper.
#[derive(Debug, Default)]
pub struct InstanceCache {
    entries: HashMap<usize, ObjectId>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, addr: usize) -> Option<ObjectId> {
        self.entries.get(&addr).copied()
    }

    /// Record `obj` as the wrapper for `addr`, returning a displaced entry
    pub fn insert(&mut self, addr: usize, obj: ObjectId) -> Option<ObjectId> {
        self.entries.insert(addr, obj)
    }

    /// Remove the entry for `addr` only if it still maps to `obj`
    ///
    /// Uncached wrappers share addresses with cached ones, so a reclaimed
    /// wrapper must not evict a different live wrapper.
    pub fn remove_if(&mut self, addr: usize, obj: ObjectId) -> bool {
        if self.entries.get(&addr) == Some(&obj) {
            self.entries.remove(&addr);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Source-hash cache used to skip rebuilding unchanged files.
//!
//! The cache is an explicit object handed to the build entry point. It is
//! keyed by `(program name, source content hash)` and lives as long as the
//! caller keeps it; nothing here is process-global.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCache {
    entries: HashSet<(String, String)>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, program: &str, hash: &str) -> bool {
        self.entries.contains(&(program.to_string(), hash.to_string()))
    }

    /// Records a compiled source. Returns `false` if it was already present.
    pub fn insert(&mut self, program: &str, hash: &str) -> bool {
        self.entries.insert((program.to_string(), hash.to_string()))
    }

    /// Drops every entry of `program`.
    pub fn invalidate(&mut self, program: &str) {
        self.entries.retain(|(p, _)| p != program);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_by_program_and_hash() {
        let mut cache = SourceCache::new();
        assert!(cache.insert("p1", "abc"));
        assert!(!cache.insert("p1", "abc"));
        assert!(cache.contains("p1", "abc"));
        assert!(!cache.contains("p2", "abc"));
        cache.insert("p2", "abc");
        cache.invalidate("p1");
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("p2", "abc"));
    }
}

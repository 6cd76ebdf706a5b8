//! Extension and size predicates for candidate files.

use std::collections::HashSet;
use std::path::Path;

/// Decides whether a discovered file becomes a candidate
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Lowercase extensions to accept. `None` accepts every extension.
    extensions: Option<HashSet<String>>,
    min_size: Option<u64>,
    max_size: Option<u64>,
}

impl CandidateFilter {
    /// A filter that accepts every file
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to these extensions (case-insensitive, leading dot optional).
    /// An empty list removes the restriction.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.extensions = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// Inclusive lower size bound in bytes
    pub fn with_min_size(mut self, min: Option<u64>) -> Self {
        self.min_size = min;
        self
    }

    /// Inclusive upper size bound in bytes
    pub fn with_max_size(mut self, max: Option<u64>) -> Self {
        self.max_size = max;
        self
    }

    /// Check the extension predicate
    pub fn accepts_path(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| allowed.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Check the size predicate
    pub fn accepts_size(&self, size: u64) -> bool {
        if let Some(min) = self.min_size {
            if size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if size > max {
                return false;
            }
        }
        true
    }
}

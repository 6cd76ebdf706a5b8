//! Directory walking implementation using walkdir.

use super::{filter::CandidateFilter, CandidateFile};
use crate::error::ScanError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Configuration for discovery
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Extension allow-set (empty = all)
    pub extensions: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_symlinks: false,
            extensions: Vec::new(),
            min_size: None,
            max_size: None,
        }
    }
}

/// Walks one root directory and yields candidate files
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: CandidateFilter,
}

impl WalkDirScanner {
    pub fn new(config: ScanConfig) -> Self {
        let filter = CandidateFilter::new()
            .with_extensions(&config.extensions)
            .with_min_size(config.min_size)
            .with_max_size(config.max_size);

        Self { config, filter }
    }

    /// Start a fresh walk of `root`.
    ///
    /// The returned iterator is lazy: nothing beyond the root check happens
    /// until it is polled. Unreadable entries and broken links are skipped.
    pub fn candidates(&self, root: &Path) -> Result<Candidates, ScanError> {
        if !root.exists() {
            return Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        // Candidate paths are absolute; fall back to the given root if
        // canonicalization fails (e.g. odd network mounts).
        let root: PathBuf = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

        let mut walker = WalkDir::new(&root).follow_links(self.config.follow_symlinks);
        if !self.config.recursive {
            walker = walker.max_depth(1);
        }

        Ok(Candidates {
            inner: walker.into_iter(),
            filter: self.filter.clone(),
        })
    }
}

/// Lazy sequence of candidates from one walk
pub struct Candidates {
    inner: walkdir::IntoIter,
    filter: CandidateFilter,
}

impl Iterator for Candidates {
    type Item = CandidateFile;

    fn next(&mut self) -> Option<CandidateFile> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(
                        "Skipping unreadable entry {}: {}",
                        e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        e
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.filter.accepts_path(path) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if !self.filter.accepts_size(size) {
                continue;
            }

            return Some(CandidateFile {
                path: entry.into_path(),
                size,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    fn names(scanner: &WalkDirScanner, root: &Path) -> Vec<String> {
        let mut names: Vec<String> = scanner
            .candidates(root)
            .unwrap()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = WalkDirScanner::new(ScanConfig::default());
        assert_eq!(scanner.candidates(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn candidates_carry_absolute_path_and_size() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.txt", b"hello");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let found: Vec<_> = scanner.candidates(temp_dir.path()).unwrap().collect();

        assert_eq!(found.len(), 1);
        assert!(found[0].path.is_absolute());
        assert_eq!(found[0].size, 5);
    }

    #[test]
    fn recursion_flag_controls_depth() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        create_file(temp_dir.path(), "top.jpg", b"1");
        create_file(&nested, "deep.jpg", b"2");

        let recursive = WalkDirScanner::new(ScanConfig::default());
        assert_eq!(names(&recursive, temp_dir.path()), vec!["deep.jpg", "top.jpg"]);

        let flat = WalkDirScanner::new(ScanConfig {
            recursive: false,
            ..Default::default()
        });
        assert_eq!(names(&flat, temp_dir.path()), vec!["top.jpg"]);
    }

    #[test]
    fn extension_and_size_predicates_apply() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "small.jpg", b"x");
        create_file(temp_dir.path(), "big.jpg", &[0u8; 64]);
        create_file(temp_dir.path(), "big.txt", &[0u8; 64]);

        let scanner = WalkDirScanner::new(ScanConfig {
            extensions: vec!["jpg".into()],
            min_size: Some(2),
            ..Default::default()
        });

        assert_eq!(names(&scanner, temp_dir.path()), vec!["big.jpg"]);
    }

    #[test]
    fn walk_is_restartable() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.txt", b"a");
        create_file(temp_dir.path(), "b.txt", b"b");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        assert_eq!(scanner.candidates(temp_dir.path()).unwrap().count(), 2);
        assert_eq!(scanner.candidates(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.candidates(Path::new("/nonexistent/path/12345"));
        assert!(matches!(result, Err(ScanError::DirectoryNotFound { .. })));
    }

    #[test]
    fn file_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = create_file(temp_dir.path(), "a.txt", b"a");
        let scanner = WalkDirScanner::new(ScanConfig::default());
        assert!(matches!(
            scanner.candidates(&file),
            Err(ScanError::NotADirectory { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "real.txt", b"data");
        std::os::unix::fs::symlink(
            temp_dir.path().join("missing.txt"),
            temp_dir.path().join("dangling.txt"),
        )
        .unwrap();

        let scanner = WalkDirScanner::new(ScanConfig::default());
        assert_eq!(names(&scanner, temp_dir.path()), vec!["real.txt"]);
    }
}

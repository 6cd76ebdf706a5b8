//! Streaming content hash.
//!
//! Files are read in fixed-size chunks and fed through BLAKE3, so memory use
//! does not depend on file size. The digest is truncated to 128 bits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read buffer size for content hashing
pub const CHUNK_SIZE: usize = 64 * 1024;

/// 128-bit content digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex, 32 characters
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Hash an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        Self::from_digest(hasher.finalize())
    }

    fn from_digest(digest: blake3::Hash) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        Self(bytes)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash a file's full content, streaming
pub fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(ContentHash::from_digest(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn hex_is_32_lowercase_digits() {
        let hash = ContentHash::of_bytes(b"same");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn file_hash_matches_buffer_hash() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"same").unwrap();

        assert_eq!(hash_file(file.path()).unwrap(), ContentHash::of_bytes(b"same"));
    }

    #[test]
    fn multi_chunk_files_hash_like_their_contents() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        assert_eq!(hash_file(file.path()).unwrap(), ContentHash::of_bytes(&data));
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(ContentHash::of_bytes(b"hello"), ContentHash::of_bytes(b"world"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(hash_file(Path::new("/nonexistent/file.bin")).is_err());
    }
}

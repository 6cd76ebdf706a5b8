//! 64-bit perceptual hash.
//!
//! Mean hash over an 8x8 grayscale thumbnail, computed with the image_hasher
//! crate. Only raster images the `image` crate can decode get a hash.

use crate::error::HashError;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Number of bits in a perceptual hash
pub const HASH_BITS: u32 = 64;

/// A 64-bit perceptual fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    pub fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Number of differing bits
    pub fn distance(&self, other: &Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Zero-padded lowercase hex, 16 characters
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse up to 16 hex digits (shorter values are left-padded with zeros)
    pub fn from_hex(value: &str) -> Result<Self, HashError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.len() > 16 {
            return Err(HashError::InvalidPerceptualHash {
                value: value.to_string(),
            });
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| HashError::InvalidPerceptualHash {
                value: value.to_string(),
            })
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PerceptualHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Hamming distance between two hex-encoded hashes.
///
/// A value that does not parse counts as maximally distant.
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    match (PerceptualHash::from_hex(a), PerceptualHash::from_hex(b)) {
        (Ok(a), Ok(b)) => a.distance(&b),
        _ => HASH_BITS,
    }
}

/// Computes mean hashes for decoded images
pub struct PerceptualHasher {
    hasher: image_hasher::Hasher,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .to_hasher();
        Self { hasher }
    }

    pub fn hash_image(&self, image: &DynamicImage) -> Option<PerceptualHash> {
        let hash = self.hasher.hash_image(image);
        let bytes: [u8; 8] = hash.as_bytes().try_into().ok()?;
        Some(PerceptualHash(u64::from_be_bytes(bytes)))
    }

    /// Decode and hash an image file. Any decode failure yields `None`.
    pub fn hash_file(&self, path: &Path) -> Option<PerceptualHash> {
        let image = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| tracing::debug!("Cannot open {} as image: {}", path.display(), e))
            .ok()?
            .decode()
            .map_err(|e| tracing::debug!("Cannot decode {}: {}", path.display(), e))
            .ok()?;
        self.hash_image(&image)
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

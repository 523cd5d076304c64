use crate::core::config::HashPreference;
use image::GrayImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const HASH_SIDE: u32 = 8;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Perceptual hash unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// DCT perceptual hash.
    Phash,
    /// Mean-threshold average hash.
    Ahash,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Phash => f.write_str("phash"),
            HashAlgorithm::Ahash => f.write_str("ahash"),
        }
    }
}

/// 64-bit perceptual fingerprint tagged with the algorithm that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub algorithm: HashAlgorithm,
    #[serde(with = "hex_bits")]
    pub bits: u64,
}

impl Fingerprint {
    /// Hamming distance, or `None` when the algorithms differ.
    pub fn distance(&self, other: &Fingerprint) -> Option<u32> {
        (self.algorithm == other.algorithm).then(|| (self.bits ^ other.bits).count_ones())
    }

    pub fn is_near(&self, other: &Fingerprint, threshold: u32) -> bool {
        self.distance(other).is_some_and(|d| d <= threshold)
    }
}

mod hex_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:016x}", bits))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(&s, 16).map_err(serde::de::Error::custom)
    }
}

pub trait Fingerprinter: Send + Sync {
    fn algorithm(&self) -> HashAlgorithm;
    fn fingerprint(&self, gray: &GrayImage) -> Fingerprint;
}

/// Downsample to 8x8, set bit i when pixel i is at or above the mean.
pub struct AverageHasher;

impl Fingerprinter for AverageHasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Ahash
    }

    fn fingerprint(&self, gray: &GrayImage) -> Fingerprint {
        let small = imageops::resize(gray, HASH_SIDE, HASH_SIDE, FilterType::Triangle);
        let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p[0])).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;

        let bits = pixels
            .iter()
            .enumerate()
            .filter(|(_, value)| **value >= mean)
            .fold(0u64, |acc, (i, _)| acc | (1 << i));

        Fingerprint {
            algorithm: HashAlgorithm::Ahash,
            bits,
        }
    }
}

#[cfg(feature = "phash")]
pub use dct::PerceptualHasher;

#[cfg(feature = "phash")]
mod dct {
    use super::{FingerprintError, Fingerprinter, Fingerprint, HASH_SIDE, HashAlgorithm};
    use image::{DynamicImage, GrayImage, Luma};
    use image_hasher::{HashAlg, Hasher, HasherConfig};

    /// DCT + median-threshold hash over the low frequencies (pHash).
    pub struct PerceptualHasher {
        hasher: Hasher,
    }

    impl PerceptualHasher {
        pub fn new() -> Self {
            let hasher = HasherConfig::new()
                .hash_size(HASH_SIDE, HASH_SIDE)
                .hash_alg(HashAlg::Median)
                .preproc_dct()
                .to_hasher();
            Self { hasher }
        }

        /// Hash a synthetic gradient and make sure a full 64-bit hash comes out.
        pub fn self_test(&self) -> Result<(), FingerprintError> {
            let probe = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
            let hash = self.hasher.hash_image(&DynamicImage::ImageLuma8(probe));
            let len = hash.as_bytes().len();
            if len == 8 {
                Ok(())
            } else {
                Err(FingerprintError::Unavailable {
                    reason: format!("expected 8 hash bytes, got {}", len),
                })
            }
        }
    }

    impl Default for PerceptualHasher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Fingerprinter for PerceptualHasher {
        fn algorithm(&self) -> HashAlgorithm {
            HashAlgorithm::Phash
        }

        fn fingerprint(&self, gray: &GrayImage) -> Fingerprint {
            let hash = self
                .hasher
                .hash_image(&DynamicImage::ImageLuma8(gray.clone()));
            let mut buf = [0u8; 8];
            for (slot, byte) in buf.iter_mut().zip(hash.as_bytes()) {
                *slot = *byte;
            }
            Fingerprint {
                algorithm: HashAlgorithm::Phash,
                bits: u64::from_le_bytes(buf),
            }
        }
    }
}

#[cfg(feature = "phash")]
fn primary() -> Result<Box<dyn Fingerprinter>, FingerprintError> {
    let hasher = PerceptualHasher::new();
    hasher.self_test()?;
    Ok(Box::new(hasher))
}

#[cfg(not(feature = "phash"))]
fn primary() -> Result<Box<dyn Fingerprinter>, FingerprintError> {
    Err(FingerprintError::Unavailable {
        reason: "built without the `phash` feature".to_string(),
    })
}

/// The fingerprinter chosen for a run. Selected once, never per file.
pub struct FingerprintStrategy {
    inner: Box<dyn Fingerprinter>,
    degraded: Option<String>,
}

impl FingerprintStrategy {
    pub fn select(preference: HashPreference) -> Self {
        Self::select_with(preference, primary)
    }

    /// Like [`select`](Self::select), with the primary fingerprinter built by
    /// `primary`.
    pub fn select_with<F>(preference: HashPreference, primary: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn Fingerprinter>, FingerprintError>,
    {
        match preference {
            HashPreference::Ahash => Self::average(),
            HashPreference::Auto | HashPreference::Phash => match primary() {
                Ok(inner) => Self {
                    inner,
                    degraded: None,
                },
                Err(e) => {
                    log::warn!("{}; falling back to average hash for this run", e);
                    Self {
                        inner: Box::new(AverageHasher),
                        degraded: Some(e.to_string()),
                    }
                }
            },
        }
    }

    pub fn average() -> Self {
        Self {
            inner: Box::new(AverageHasher),
            degraded: None,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.inner.algorithm()
    }

    pub fn fingerprint(&self, gray: &GrayImage) -> Fingerprint {
        self.inner.fingerprint(gray)
    }

    /// Why the primary algorithm was not used, if it was wanted.
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }
}

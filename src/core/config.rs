use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid threshold {name}: {value} (must be finite and >= 0)")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid minimum size {width}x{height} (both must be >= 1)")]
    InvalidMinSize { width: u32, height: u32 },

    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("No root directories given")]
    NoRoots,

    #[error("Root does not exist: {path}")]
    MissingRoot { path: String },

    #[error("Root is not a directory: {path}")]
    NotADirectory { path: String },

    #[error("skip_clean without rescue_blur leaves nothing to do")]
    NothingToDo,
}

/// Which sharpness estimators decide whether an image is blurry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurMethod {
    Laplacian,
    Tenengrad,
    /// Blurry only when every estimator is below its threshold.
    Both,
}

/// Grouping boundary for near-duplicate comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NearDuplicateScope {
    /// The file's immediate parent directory (class or class/source).
    Folder,
    /// The first-level directory under the root, spanning source sub-folders.
    Class,
    /// The whole root.
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Move,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashPreference {
    /// DCT perceptual hash when available, average hash otherwise.
    Auto,
    Phash,
    Ahash,
}

/// How the kept member of a duplicate cluster is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentativePolicy {
    /// Largest pixel area, then lexicographically smallest path.
    LargestArea,
    /// Lexicographically smallest path.
    Path,
}

fn unknown(kind: &'static str, value: &str) -> ConfigError {
    ConfigError::UnknownValue {
        kind,
        value: value.to_string(),
    }
}

impl BlurMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlurMethod::Laplacian => "laplacian",
            BlurMethod::Tenengrad => "tenengrad",
            BlurMethod::Both => "both",
        }
    }
}

impl fmt::Display for BlurMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlurMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "laplacian" => Ok(BlurMethod::Laplacian),
            "tenengrad" => Ok(BlurMethod::Tenengrad),
            "both" => Ok(BlurMethod::Both),
            other => Err(unknown("blur_method", other)),
        }
    }
}

impl NearDuplicateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            NearDuplicateScope::Folder => "folder",
            NearDuplicateScope::Class => "class",
            NearDuplicateScope::Root => "root",
        }
    }
}

impl fmt::Display for NearDuplicateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NearDuplicateScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "folder" | "dir" => Ok(NearDuplicateScope::Folder),
            "class" => Ok(NearDuplicateScope::Class),
            "root" => Ok(NearDuplicateScope::Root),
            other => Err(unknown("near_duplicate_scope", other)),
        }
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Move => "move",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "move" => Ok(Action::Move),
            "delete" => Ok(Action::Delete),
            other => Err(unknown("action", other)),
        }
    }
}

impl HashPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashPreference::Auto => "auto",
            HashPreference::Phash => "phash",
            HashPreference::Ahash => "ahash",
        }
    }
}

impl fmt::Display for HashPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(HashPreference::Auto),
            "phash" => Ok(HashPreference::Phash),
            "ahash" => Ok(HashPreference::Ahash),
            other => Err(unknown("hash_algorithm", other)),
        }
    }
}

impl RepresentativePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepresentativePolicy::LargestArea => "largest-area",
            RepresentativePolicy::Path => "path",
        }
    }
}

impl fmt::Display for RepresentativePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepresentativePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "largest-area" | "largest_area" | "area" => Ok(RepresentativePolicy::LargestArea),
            "path" => Ok(RepresentativePolicy::Path),
            other => Err(unknown("representative", other)),
        }
    }
}

/// Blur decision rule: which estimators run and where they cut off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurPolicy {
    pub method: BlurMethod,
    /// Laplacian variance below this is blurry.
    pub laplacian_threshold: f64,
    /// Tenengrad mean(Gx² + Gy²) below this is blurry.
    pub tenengrad_threshold: f64,
}

impl Default for BlurPolicy {
    fn default() -> Self {
        Self {
            method: BlurMethod::Both,
            laplacian_threshold: 60.0,
            tenengrad_threshold: 700.0,
        }
    }
}

/// Run-wide settings, validated once and then shared read-only by every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SieveConfig {
    pub roots: Vec<PathBuf>,
    pub min_width: u32,
    pub min_height: u32,
    pub blur: BlurPolicy,
    pub hamming_threshold: u32,
    pub near_duplicate_scope: NearDuplicateScope,
    pub action: Action,
    pub hash_algorithm: HashPreference,
    pub representative: RepresentativePolicy,
    pub rescue_blur: bool,
    pub skip_clean: bool,
    pub dry_run: bool,
    /// Worker pool size; 0 lets rayon pick.
    pub jobs: usize,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            min_width: 224,
            min_height: 224,
            blur: BlurPolicy::default(),
            hamming_threshold: 0,
            near_duplicate_scope: NearDuplicateScope::Folder,
            action: Action::Move,
            hash_algorithm: HashPreference::Auto,
            representative: RepresentativePolicy::LargestArea,
            rescue_blur: false,
            skip_clean: false,
            dry_run: false,
            jobs: 0,
        }
    }
}

impl SieveConfig {
    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            ..Self::default()
        }
    }

    /// Check every knob and every root. Runs before any file is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_width == 0 || self.min_height == 0 {
            return Err(ConfigError::InvalidMinSize {
                width: self.min_width,
                height: self.min_height,
            });
        }

        check_threshold("blur_threshold", self.blur.laplacian_threshold)?;
        check_threshold("tenengrad_threshold", self.blur.tenengrad_threshold)?;

        if self.skip_clean && !self.rescue_blur {
            return Err(ConfigError::NothingToDo);
        }

        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }

        for root in &self.roots {
            if !root.exists() {
                return Err(ConfigError::MissingRoot {
                    path: root.to_string_lossy().to_string(),
                });
            }
            if !root.is_dir() {
                return Err(ConfigError::NotADirectory {
                    path: root.to_string_lossy().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Strictly narrower or strictly shorter than the minimum.
    pub fn is_undersized(&self, width: u32, height: u32) -> bool {
        width < self.min_width || height < self.min_height
    }

    pub fn runs_clean(&self) -> bool {
        !self.skip_clean
    }

    pub fn runs_rescue(&self) -> bool {
        self.rescue_blur
    }
}

fn check_threshold(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

use crate::core::fingerprint::Fingerprint;
use crate::core::sharpness::BlurScores;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Outcome of the decision state machine for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Unknown,
    /// Passed size and blur checks; waiting for duplicate clustering.
    Candidate,
    Keep,
    RejectSmall,
    RejectBlur,
    RejectDuplicate,
    RejectDecodeError,
}

impl Disposition {
    pub fn is_reject(&self) -> bool {
        matches!(
            self,
            Disposition::RejectSmall
                | Disposition::RejectBlur
                | Disposition::RejectDuplicate
                | Disposition::RejectDecodeError
        )
    }

    /// Sub-folder of `.trash` that holds files rejected for this reason.
    pub fn trash_folder(&self) -> Option<&'static str> {
        match self {
            Disposition::RejectSmall => Some("small"),
            Disposition::RejectBlur => Some("blur"),
            Disposition::RejectDuplicate => Some("duplicate"),
            Disposition::RejectDecodeError => Some("decode_error"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Unknown => "unknown",
            Disposition::Candidate => "candidate",
            Disposition::Keep => "keep",
            Disposition::RejectSmall => "reject_small",
            Disposition::RejectBlur => "reject_blur",
            Disposition::RejectDuplicate => "reject_duplicate",
            Disposition::RejectDecodeError => "reject_decode_error",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping boundary for duplicate comparison. Always qualified by its root,
/// so two roots never share a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    pub root: PathBuf,
    /// Scope directory relative to the root; empty for the root itself.
    pub relative: PathBuf,
}

impl ScopeKey {
    pub fn new(root: &Path, relative: impl Into<PathBuf>) -> Self {
        Self {
            root: root.to_path_buf(),
            relative: relative.into(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative.as_os_str().is_empty() {
            f.write_str(".")
        } else {
            write!(f, "{}", self.relative.display())
        }
    }
}

/// One scanned file and everything measured about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub scope_key: ScopeKey,
    /// Zero when the file could not be decoded.
    pub width: u32,
    pub height: u32,
    pub blur_scores: BlurScores,
    pub fingerprint: Option<Fingerprint>,
    pub disposition: Disposition,
    /// Set for cluster members, representative included.
    pub cluster_id: Option<usize>,
    pub error: Option<String>,
}

impl ImageRecord {
    pub fn new(path: &Path, scope_key: ScopeKey) -> Self {
        Self {
            path: path.to_path_buf(),
            scope_key,
            width: 0,
            height: 0,
            blur_scores: BlurScores::new(),
            fingerprint: None,
            disposition: Disposition::Unknown,
            cluster_id: None,
            error: None,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

use crate::core::fingerprint::Fingerprint;
use crate::core::record::{Disposition, ImageRecord};
use crate::core::sharpness::BlurScores;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

pub const MANIFEST_FILE: &str = ".sieve-manifest.jsonl";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Manifest writer lock poisoned")]
    Poisoned,
}

impl ManifestError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ManifestError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    Moved,
    Deleted,
}

/// Measurements at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub width: u32,
    pub height: u32,
    pub blur_scores: BlurScores,
    pub fingerprint: Option<Fingerprint>,
    /// BLAKE3 of the file bytes just before it was moved or deleted.
    pub content_hash: Option<String>,
}

impl MetricSnapshot {
    pub fn of(record: &ImageRecord, content_hash: Option<String>) -> Self {
        Self {
            width: record.width,
            height: record.height,
            blur_scores: record.blur_scores.clone(),
            fingerprint: record.fingerprint,
            content_hash,
        }
    }
}

/// One quarantine action. Paths are stored relative to the root that owns the
/// manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashEntry {
    pub original_path: PathBuf,
    /// `None` for deletions, which cannot be restored.
    pub trash_path: Option<PathBuf>,
    pub reason: Disposition,
    pub action: ActionTaken,
    pub scope_key: String,
    pub timestamp: String,
    pub metric_snapshot: MetricSnapshot,
}

impl TrashEntry {
    pub fn is_rescuable(&self) -> bool {
        self.reason == Disposition::RejectBlur
            && self.action == ActionTaken::Moved
            && self.trash_path.is_some()
    }

    pub fn original_in(&self, root: &Path) -> PathBuf {
        root.join(&self.original_path)
    }

    pub fn trash_in(&self, root: &Path) -> Option<PathBuf> {
        self.trash_path.as_ref().map(|p| root.join(p))
    }
}

/// `path` relative to `root`, or unchanged when it lies outside it.
pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Append-only JSONL writer. One writer per root; appends are serialized and
/// each line goes out in a single write.
pub struct ManifestWriter {
    path: PathBuf,
    out: Mutex<File>,
}

impl ManifestWriter {
    pub fn open(root: &Path) -> Result<Self, ManifestError> {
        let path = manifest_path(root);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ManifestError::io(&path, e))?;
        Ok(Self {
            path,
            out: Mutex::new(file),
        })
    }

    /// A writer whose appends always fail.
    #[cfg(test)]
    pub(crate) fn read_only(root: &Path) -> Result<Self, ManifestError> {
        let path = manifest_path(root);
        File::create(&path).map_err(|e| ManifestError::io(&path, e))?;
        let file = File::open(&path).map_err(|e| ManifestError::io(&path, e))?;
        Ok(Self {
            path,
            out: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &TrashEntry) -> Result<(), ManifestError> {
        let line = format!("{}\n", serde_json::to_string(entry)?);
        let mut out = self.out.lock().map_err(|_| ManifestError::Poisoned)?;
        out.write_all(line.as_bytes())
            .map_err(|e| ManifestError::io(&self.path, e))?;
        out.flush().map_err(|e| ManifestError::io(&self.path, e))
    }
}

#[derive(Debug, Clone)]
pub struct ManifestLine {
    pub raw: String,
    pub entry: Option<TrashEntry>,
}

/// A loaded manifest. Malformed lines are kept verbatim so a rewrite never
/// loses them.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub lines: Vec<ManifestLine>,
}

impl Manifest {
    /// Load the manifest of `root`; a missing file is an empty manifest.
    pub fn load(root: &Path) -> Result<Self, ManifestError> {
        let path = manifest_path(root);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ManifestError::io(&path, e)),
        };

        let mut lines = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let raw = line.map_err(|e| ManifestError::io(&path, e))?;
            if raw.trim().is_empty() {
                continue;
            }
            let entry = match serde_json::from_str::<TrashEntry>(&raw) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping malformed manifest line {}: {}", i, err);
                    None
                }
            };
            lines.push(ManifestLine { raw, entry });
        }
        Ok(Self { lines })
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &TrashEntry)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| line.entry.as_ref().map(|entry| (i, entry)))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drop the lines at `indices`.
    pub fn remove(&mut self, indices: &[usize]) {
        let mut i = 0;
        self.lines.retain(|_| {
            let keep = !indices.contains(&i);
            i += 1;
            keep
        });
    }

    /// Rewrite the manifest of `root` through a sibling temp file.
    pub fn save(&self, root: &Path) -> Result<(), ManifestError> {
        let path = manifest_path(root);
        let tmp = path.with_extension("jsonl.tmp");
        let content: String = self.lines.iter().map(|l| format!("{}\n", l.raw)).collect();
        fs::write(&tmp, content).map_err(|e| ManifestError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| ManifestError::io(&path, e))
    }
}

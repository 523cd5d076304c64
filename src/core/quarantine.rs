use crate::core::config::{Action, SieveConfig};
use crate::core::manifest::{
    ActionTaken, ManifestError, ManifestWriter, MetricSnapshot, TrashEntry, relative_to,
};
use crate::core::record::{Disposition, ImageRecord};
use crate::core::scanner::TRASH_DIR_NAMES;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("Failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("No trash location for {path}")]
    NoTrashLocation { path: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Where a rejected file goes: `<class_dir>/.trash/<reason>/<path below class_dir>`.
///
/// `class_dir` is the first-level directory under `root`, or `root` itself for
/// files sitting directly in it.
pub fn trash_path_for(
    root: &Path,
    original: &Path,
    reason: Disposition,
) -> Result<PathBuf, QuarantineError> {
    let no_location = || QuarantineError::NoTrashLocation {
        path: original.to_string_lossy().to_string(),
    };
    let folder = reason.trash_folder().ok_or_else(no_location)?;
    let relative = original.strip_prefix(root).map_err(|_| no_location())?;

    let mut components = relative.components();
    let (class_dir, rest) = match (components.next(), components.as_path()) {
        (Some(Component::Normal(class)), rest) if !rest.as_os_str().is_empty() => {
            (root.join(class), rest.to_path_buf())
        }
        (Some(Component::Normal(name)), _) => (root.to_path_buf(), PathBuf::from(name)),
        _ => return Err(no_location()),
    };

    Ok(class_dir.join(TRASH_DIR_NAMES[0]).join(folder).join(rest))
}

/// `path` if free, else the first free `<stem><tag><n>.<ext>`.
pub fn free_path(path: &Path, tag: &str) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1usize;
    loop {
        let candidate = path.with_file_name(format!("{}{}{}{}", stem, tag, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Run `op` and retry once on failure.
pub fn with_retry<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(first) => {
            log::debug!("Retrying after IO error: {}", first);
            op()
        }
    }
}

/// BLAKE3 digest of the file contents.
pub fn content_hash(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileAction {
    Moved { from: PathBuf, to: PathBuf },
    /// In the trash, but neither recorded nor movable back.
    MovedUnrecorded { to: PathBuf, error: String },
    Deleted(PathBuf),
    Skipped { path: PathBuf, error: String },
    Cancelled,
}

#[derive(Debug, Default, Clone)]
pub struct QuarantineOutcome {
    pub moved: usize,
    pub deleted: usize,
    pub skipped: Vec<(PathBuf, String)>,
    /// Trash paths of moved files missing from the manifest.
    pub unrecorded: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

pub struct QuarantineExecutor<'a> {
    root: &'a Path,
    config: &'a SieveConfig,
    manifest: &'a ManifestWriter,
    cancellation_token: Arc<AtomicBool>,
    show_progress: bool,
}

impl<'a> QuarantineExecutor<'a> {
    pub fn new(root: &'a Path, config: &'a SieveConfig, manifest: &'a ManifestWriter) -> Self {
        Self {
            root,
            config,
            manifest,
            cancellation_token: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    pub fn with_cancellation_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Move or delete every rejected record. Kept records are untouched.
    pub fn execute<'r, I>(&self, records: I) -> QuarantineOutcome
    where
        I: IntoIterator<Item = &'r ImageRecord>,
    {
        let rejected: Vec<&ImageRecord> = records
            .into_iter()
            .filter(|r| r.disposition.is_reject())
            .collect();

        let bar = if self.show_progress {
            let bar = ProgressBar::new(rejected.len() as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner:.yellow} {pos}/{len} {msg}") {
                bar.set_style(style);
            }
            bar.set_message(match self.config.action {
                Action::Move => "Quarantining…",
                Action::Delete => "Deleting…",
            });
            bar
        } else {
            ProgressBar::hidden()
        };

        let actions: Vec<FileAction> = rejected
            .par_iter()
            .map(|record| {
                let action = self.apply(record);
                bar.inc(1);
                action
            })
            .collect();
        bar.finish_and_clear();

        let mut outcome = QuarantineOutcome::default();
        for action in actions {
            match action {
                FileAction::Moved { .. } => outcome.moved += 1,
                FileAction::MovedUnrecorded { to, error } => {
                    outcome.moved += 1;
                    outcome.unrecorded.push((to, error));
                }
                FileAction::Deleted(_) => outcome.deleted += 1,
                FileAction::Skipped { path, error } => outcome.skipped.push((path, error)),
                FileAction::Cancelled => outcome.cancelled = true,
            }
        }
        outcome
    }

    /// Quarantine one record and log it to the manifest.
    pub fn apply(&self, record: &ImageRecord) -> FileAction {
        if self.cancellation_token.load(Ordering::Relaxed) {
            return FileAction::Cancelled;
        }
        let result = match self.config.action {
            Action::Move => self.move_to_trash(record),
            Action::Delete => self.delete(record),
        };
        match result {
            Ok(action) => action,
            Err(e) => {
                log::warn!("Skipping {}: {}", record.path.display(), e);
                FileAction::Skipped {
                    path: record.path.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn move_to_trash(&self, record: &ImageRecord) -> Result<FileAction, QuarantineError> {
        let target = trash_path_for(self.root, &record.path, record.disposition)?;
        let target = free_path(&target, "_");
        if let Some(parent) = target.parent() {
            with_retry(|| fs::create_dir_all(parent)).map_err(|source| QuarantineError::Io {
                op: "create",
                path: parent.to_string_lossy().to_string(),
                source,
            })?;
        }

        let hash = content_hash(&record.path).ok();
        with_retry(|| fs::rename(&record.path, &target)).map_err(|source| QuarantineError::Io {
            op: "move",
            path: record.path.to_string_lossy().to_string(),
            source,
        })?;
        log::info!(
            "Moved {} → {} ({})",
            record.path.display(),
            target.display(),
            record.disposition
        );

        if let Err(e) = self.record_entry(record, Some(target.as_path()), ActionTaken::Moved, hash) {
            return match with_retry(|| fs::rename(&target, &record.path)) {
                Ok(()) => {
                    log::warn!("Moved {} back after failing to record it", record.path.display());
                    Err(e)
                }
                Err(rollback) => {
                    log::error!(
                        "{} is in the trash but not in the manifest: {} (move back failed: {})",
                        target.display(),
                        e,
                        rollback
                    );
                    Ok(FileAction::MovedUnrecorded {
                        to: target,
                        error: e.to_string(),
                    })
                }
            };
        }

        Ok(FileAction::Moved {
            from: record.path.clone(),
            to: target,
        })
    }

    /// Recorded first: an entry that cannot be written leaves the file alone.
    fn delete(&self, record: &ImageRecord) -> Result<FileAction, QuarantineError> {
        let hash = content_hash(&record.path).map_err(|source| QuarantineError::Io {
            op: "read",
            path: record.path.to_string_lossy().to_string(),
            source,
        })?;
        self.record_entry(record, None, ActionTaken::Deleted, Some(hash))?;

        with_retry(|| fs::remove_file(&record.path)).map_err(|source| {
            log::error!(
                "{} is recorded as deleted but is still there: {}",
                record.path.display(),
                source
            );
            QuarantineError::Io {
                op: "delete",
                path: record.path.to_string_lossy().to_string(),
                source,
            }
        })?;
        log::info!("Deleted {} ({})", record.path.display(), record.disposition);
        Ok(FileAction::Deleted(record.path.clone()))
    }

    fn record_entry(
        &self,
        record: &ImageRecord,
        trash_path: Option<&Path>,
        action: ActionTaken,
        hash: Option<String>,
    ) -> Result<(), QuarantineError> {
        let entry = TrashEntry {
            original_path: relative_to(self.root, &record.path),
            trash_path: trash_path.map(|p| relative_to(self.root, p)),
            reason: record.disposition,
            action,
            scope_key: record.scope_key.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            metric_snapshot: MetricSnapshot::of(record, hash),
        };
        self.manifest.append(&entry).map_err(|e| {
            log::error!(
                "Could not record {:?} of {}: {}",
                action,
                record.path.display(),
                e
            );
            QuarantineError::from(e)
        })
    }
}

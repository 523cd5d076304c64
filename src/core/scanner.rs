use crate::core::config::{NearDuplicateScope, SieveConfig};
use crate::core::decision;
use crate::core::fingerprint::FingerprintStrategy;
use crate::core::record::{ImageRecord, ScopeKey};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

/// Reserved quarantine folder names; never scanned as corpus content.
pub const TRASH_DIR_NAMES: &[&str] = &[".trash", "trash"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Every record of one root, grouped by scope. Sorted by path within a scope.
pub type ScannedCorpus = BTreeMap<ScopeKey, Vec<ImageRecord>>;

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

pub fn is_trash_dir(name: &str) -> bool {
    TRASH_DIR_NAMES.contains(&name)
}

/// Scope of `path` under `root` for the given grouping mode.
pub fn scope_key_for(root: &Path, path: &Path, scope: NearDuplicateScope) -> ScopeKey {
    let relative_parent = path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let relative = match scope {
        NearDuplicateScope::Folder => relative_parent,
        NearDuplicateScope::Class => match relative_parent.components().next() {
            Some(Component::Normal(class)) => PathBuf::from(class),
            _ => PathBuf::new(),
        },
        NearDuplicateScope::Root => PathBuf::new(),
    };

    ScopeKey::new(root, relative)
}

pub struct CorpusScanner<'a> {
    config: &'a SieveConfig,
    fingerprinter: &'a FingerprintStrategy,
    cancellation_token: Arc<AtomicBool>,
    show_progress: bool,
}

impl<'a> CorpusScanner<'a> {
    pub fn new(config: &'a SieveConfig, fingerprinter: &'a FingerprintStrategy) -> Self {
        Self {
            config,
            fingerprinter,
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

    fn is_cancelled(&self) -> bool {
        self.cancellation_token.load(Ordering::Relaxed)
    }

    /// Recursively list image files under `root`, pruning trash folders.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::InvalidPath {
                path: root.to_string_lossy().to_string(),
            });
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_trash_entry(entry));

        for entry in walker {
            if self.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_file() && is_image_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Discover, then probe and screen every file in parallel. Returns only
    /// once every record of every scope is final.
    pub fn scan_root(&self, root: &Path) -> Result<ScannedCorpus, ScanError> {
        let files = self.discover(root)?;
        log::info!("Discovered {} image(s) under {}", files.len(), root.display());

        let bar = self.progress_bar(files.len() as u64);
        let scope = self.config.near_duplicate_scope;

        let records: Result<Vec<ImageRecord>, ScanError> = files
            .par_iter()
            .map(|path| {
                if self.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                let scope_key = scope_key_for(root, path, scope);
                let record = decision::screen(path, scope_key, self.config, self.fingerprinter);
                bar.inc(1);
                Ok(record)
            })
            .collect();
        bar.finish_and_clear();

        let mut corpus = ScannedCorpus::new();
        for record in records? {
            corpus.entry(record.scope_key.clone()).or_default().push(record);
        }
        for records in corpus.values_mut() {
            records.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Ok(corpus)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message("Analyzing images…");
        bar
    }
}

fn is_trash_entry(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_str().is_some_and(is_trash_dir)
}

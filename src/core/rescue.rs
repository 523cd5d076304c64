use crate::core::config::SieveConfig;
use crate::core::manifest::{Manifest, ManifestError};
use crate::core::probe;
use crate::core::quarantine::{free_path, with_retry};
use crate::core::sharpness;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone)]
pub struct RescueOutcome {
    /// Blur entries re-evaluated.
    pub scanned: usize,
    pub restored: Vec<(PathBuf, PathBuf)>,
    pub still_blurry: usize,
    /// Entries whose trash file is gone; left in the manifest.
    pub missing: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

/// Re-check every moved blur entry of `root` against the current blur policy
/// and restore the ones that now pass. Other reasons are never restored.
/// Manifest paths are resolved against `root`, not the working directory.
pub fn rescue_blur(root: &Path, config: &SieveConfig) -> Result<RescueOutcome, ManifestError> {
    let mut manifest = Manifest::load(root)?;
    let mut outcome = RescueOutcome::default();
    let mut restored_lines = Vec::new();

    for (index, entry) in manifest.entries() {
        if !entry.is_rescuable() {
            continue;
        }
        let Some(trash_path) = entry.trash_in(root) else {
            continue;
        };
        let trash_path = trash_path.as_path();
        outcome.scanned += 1;

        if !trash_path.exists() {
            log::warn!("Trash file {} does not exist; skipping", trash_path.display());
            outcome.missing.push(trash_path.to_path_buf());
            continue;
        }

        let image = match probe::probe(trash_path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Failed to decode {}: {}", trash_path.display(), e);
                outcome.errors.push((trash_path.to_path_buf(), e.to_string()));
                continue;
            }
        };

        let verdict = sharpness::assess(&image.gray, &config.blur);
        if verdict.blurry {
            outcome.still_blurry += 1;
            continue;
        }

        let destination = free_path(&entry.original_in(root), "_rescued");
        if config.dry_run {
            outcome
                .restored
                .push((trash_path.to_path_buf(), destination));
            continue;
        }

        match restore(trash_path, &destination) {
            Ok(()) => {
                log::info!(
                    "Rescued {} → {} (scores {:?})",
                    trash_path.display(),
                    destination.display(),
                    verdict.scores
                );
                outcome
                    .restored
                    .push((trash_path.to_path_buf(), destination));
                restored_lines.push(index);
            }
            Err(e) => {
                log::warn!("Failed to restore {}: {}", trash_path.display(), e);
                outcome.errors.push((trash_path.to_path_buf(), e.to_string()));
            }
        }
    }

    if !restored_lines.is_empty() {
        manifest.remove(&restored_lines);
        manifest.save(root)?;
    }

    Ok(outcome)
}

fn restore(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        with_retry(|| fs::create_dir_all(parent))?;
    }
    with_retry(|| fs::rename(from, to))
}

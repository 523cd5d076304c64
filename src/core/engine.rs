use crate::core::config::{ConfigError, SieveConfig};
use crate::core::decision::{self, DuplicateCluster};
use crate::core::fingerprint::{FingerprintStrategy, HashAlgorithm};
use crate::core::manifest::{ManifestError, ManifestWriter};
use crate::core::quarantine::QuarantineExecutor;
use crate::core::record::ImageRecord;
use crate::core::report::RunSummary;
use crate::core::rescue::{self, RescueOutcome};
use crate::core::scanner::{CorpusScanner, ScanError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("No writable trash location: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of processing one root.
#[derive(Debug, Default)]
pub struct RootReport {
    pub root: PathBuf,
    pub summary: RunSummary,
    pub records: Vec<ImageRecord>,
    pub clusters: Vec<DuplicateCluster>,
    pub rescue: Option<RescueOutcome>,
    pub cancelled: bool,
}

/// Scan → decide → quarantine → (rescue), one root at a time.
pub struct Sieve {
    config: SieveConfig,
    fingerprinter: FingerprintStrategy,
    pool: ThreadPool,
    cancellation_token: Arc<AtomicBool>,
    show_progress: bool,
}

impl Sieve {
    /// Validate `config`, pick the fingerprint algorithm and build the worker
    /// pool. Nothing on disk is touched yet.
    pub fn new(config: SieveConfig) -> Result<Self, SieveError> {
        config.validate()?;
        let fingerprinter = FingerprintStrategy::select(config.hash_algorithm);
        let pool = ThreadPoolBuilder::new().num_threads(config.jobs).build()?;
        log::info!(
            "Fingerprint algorithm: {}, workers: {}",
            fingerprinter.algorithm(),
            pool.current_num_threads()
        );
        Ok(Self {
            config,
            fingerprinter,
            pool,
            cancellation_token: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &SieveConfig {
        &self.config
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.fingerprinter.algorithm()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.fingerprinter.degraded_reason()
    }

    /// Stop between files. A scan that has not finished fails with
    /// `ScanError::Cancelled` and leaves the root untouched.
    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Process every configured root in order.
    pub fn run(&self) -> Result<Vec<RootReport>, SieveError> {
        let mut reports = Vec::with_capacity(self.config.roots.len());
        for root in &self.config.roots {
            let report = self.run_root(root)?;
            let cancelled = report.cancelled;
            reports.push(report);
            if cancelled {
                break;
            }
        }
        Ok(reports)
    }

    pub fn run_root(&self, root: &Path) -> Result<RootReport, SieveError> {
        let mut report = if self.config.runs_clean() {
            self.clean_root(root)?
        } else {
            RootReport {
                root: root.to_path_buf(),
                ..RootReport::default()
            }
        };

        if self.config.runs_rescue() && !report.cancelled {
            let outcome = self.rescue_root(root)?;
            report.summary.record_rescue(&outcome);
            report.rescue = Some(outcome);
        }
        Ok(report)
    }

    /// Classify every image under `root` and quarantine the rejects.
    pub fn clean_root(&self, root: &Path) -> Result<RootReport, SieveError> {
        let scanner = CorpusScanner::new(&self.config, &self.fingerprinter)
            .with_cancellation_token(self.cancellation_token.clone())
            .with_progress(self.show_progress);

        let mut corpus = benchmark("scanning", || self.pool.install(|| scanner.scan_root(root)))?;
        let clusters = decision::decide(&mut corpus, &self.config);
        let records: Vec<ImageRecord> = corpus.into_values().flatten().collect();

        let mut summary = RunSummary::default();
        summary.record_dispositions(&records);
        summary.clusters = clusters.len();

        let mut cancelled = false;
        if !self.config.dry_run && records.iter().any(|r| r.disposition.is_reject()) {
            let manifest = ManifestWriter::open(root)?;
            let executor = QuarantineExecutor::new(root, &self.config, &manifest)
                .with_cancellation_token(self.cancellation_token.clone())
                .with_progress(self.show_progress);
            let outcome = self.pool.install(|| executor.execute(&records));
            summary.record_quarantine(&outcome);
            cancelled = outcome.cancelled;
            log::info!("Manifest updated at {}", manifest.path().display());
        }

        Ok(RootReport {
            root: root.to_path_buf(),
            summary,
            records,
            clusters,
            rescue: None,
            cancelled,
        })
    }

    /// Restore blur-quarantined files of `root` that pass the current policy.
    pub fn rescue_root(&self, root: &Path) -> Result<RescueOutcome, SieveError> {
        Ok(rescue::rescue_blur(root, &self.config)?)
    }
}

/// Run `f()`, log how long it took, and return its result.
pub fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

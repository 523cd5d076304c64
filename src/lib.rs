//! Curates an image corpus before labeling: rejects undersized, undecodable,
//! blurry and near-duplicate images, quarantines them reversibly, and can
//! later rescue blur rejects under revised thresholds.
//!
//! Layout expected under each root: `root/<class>/[<source>/]<images>`.

pub mod core;

pub use crate::core::config::{
    Action, BlurMethod, BlurPolicy, ConfigError, HashPreference, NearDuplicateScope,
    RepresentativePolicy, SieveConfig,
};
pub use crate::core::decision::DuplicateCluster;
pub use crate::core::engine::{RootReport, Sieve, SieveError};
pub use crate::core::fingerprint::{Fingerprint, FingerprintStrategy, HashAlgorithm};
pub use crate::core::manifest::{ActionTaken, Manifest, TrashEntry, manifest_path};
pub use crate::core::record::{Disposition, ImageRecord, ScopeKey};
pub use crate::core::report::RunSummary;
pub use crate::core::rescue::RescueOutcome;

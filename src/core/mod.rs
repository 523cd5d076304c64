// Quality and near-duplicate filtering engine
pub mod config;
pub mod decision;
pub mod engine;
pub mod fingerprint;
pub mod manifest;
pub mod probe;
pub mod quarantine;
pub mod record;
pub mod report;
pub mod rescue;
pub mod scanner;
pub mod sharpness;

use crate::core::quarantine::QuarantineOutcome;
use crate::core::record::{Disposition, ImageRecord};
use crate::core::rescue::RescueOutcome;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Counts for one root, or for a whole run once merged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub by_disposition: BTreeMap<Disposition, usize>,
    pub clusters: usize,
    pub moved: usize,
    pub deleted: usize,
    pub rescue_scanned: usize,
    pub rescue_restored: usize,
    /// Per-file I/O and rescue problems; never fatal. Decode failures are
    /// counted under their disposition instead.
    pub errors: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn count(&self, disposition: Disposition) -> usize {
        self.by_disposition.get(&disposition).copied().unwrap_or(0)
    }

    pub fn record_dispositions<'a>(&mut self, records: impl IntoIterator<Item = &'a ImageRecord>) {
        for record in records {
            self.total += 1;
            *self.by_disposition.entry(record.disposition).or_default() += 1;
        }
    }

    pub fn record_quarantine(&mut self, outcome: &QuarantineOutcome) {
        self.moved += outcome.moved;
        self.deleted += outcome.deleted;
        self.errors.extend(outcome.skipped.iter().cloned());
        self.errors.extend(outcome.unrecorded.iter().map(|(to, error)| {
            (to.clone(), format!("moved but not recorded in the manifest: {}", error))
        }));
    }

    pub fn record_rescue(&mut self, outcome: &RescueOutcome) {
        self.rescue_scanned += outcome.scanned;
        self.rescue_restored += outcome.restored.len();
        self.errors.extend(outcome.errors.iter().cloned());
        self.errors.extend(
            outcome
                .missing
                .iter()
                .map(|path| (path.clone(), "trash file missing".to_string())),
        );
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.total += other.total;
        for (disposition, count) in &other.by_disposition {
            *self.by_disposition.entry(*disposition).or_default() += count;
        }
        self.clusters += other.clusters;
        self.moved += other.moved;
        self.deleted += other.deleted;
        self.rescue_scanned += other.rescue_scanned;
        self.rescue_restored += other.rescue_restored;
        self.errors.extend(other.errors.iter().cloned());
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Keep: {} | Small: {} | Blur: {} | Dupe: {} | Decode errors: {} | Errors: {}",
            self.total,
            self.count(Disposition::Keep),
            self.count(Disposition::RejectSmall),
            self.count(Disposition::RejectBlur),
            self.count(Disposition::RejectDuplicate),
            self.count(Disposition::RejectDecodeError),
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::ScopeKey;
    use std::path::Path;

    fn record(name: &str, disposition: Disposition) -> ImageRecord {
        let mut record = ImageRecord::new(Path::new(name), ScopeKey::new(Path::new("/r"), ""));
        record.disposition = disposition;
        record
    }

    #[test]
    fn test_counts_and_merge() {
        let mut a = RunSummary::default();
        a.record_dispositions(&[
            record("1", Disposition::Keep),
            record("2", Disposition::RejectBlur),
            record("3", Disposition::Keep),
        ]);
        let mut b = RunSummary::default();
        let mut broken = record("4", Disposition::RejectDecodeError);
        broken.error = Some("Empty file".to_string());
        b.record_dispositions([&broken]);
        b.record_quarantine(&QuarantineOutcome {
            moved: 2,
            skipped: vec![(PathBuf::from("5"), "Permission denied".to_string())],
            unrecorded: vec![(PathBuf::from("6"), "disk full".to_string())],
            ..QuarantineOutcome::default()
        });

        a.merge(&b);
        assert_eq!(a.total, 4);
        assert_eq!(a.count(Disposition::Keep), 2);
        assert_eq!(a.count(Disposition::RejectDecodeError), 1);
        assert_eq!(a.count(Disposition::RejectSmall), 0);
        assert_eq!(a.moved, 2);
        assert_eq!(a.errors.len(), 2);
        assert_eq!(a.errors[1].0, PathBuf::from("6"));
        assert_eq!(
            a.to_string(),
            "Total: 4 | Keep: 2 | Small: 0 | Blur: 1 | Dupe: 0 | Decode errors: 1 | Errors: 2"
        );
    }
}

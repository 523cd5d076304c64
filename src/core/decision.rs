//! Keep/reject decisions.
//!
//! Per file: `unknown -> reject_decode_error | reject_small | candidate`, then
//! `candidate -> reject_blur` when the sharpness policy fails. Size is read
//! from the header before any pixel decode, and blur is settled before a
//! fingerprint is computed, so rejected files are never hashed.
//!
//! Per scope, once every record is final: candidates whose fingerprints are
//! within the Hamming threshold (directly or transitively) form a cluster.
//! One representative is kept; the rest become `reject_duplicate`.

use crate::core::config::{RepresentativePolicy, SieveConfig};
use crate::core::fingerprint::{Fingerprint, FingerprintStrategy};
use crate::core::probe;
use crate::core::record::{Disposition, ImageRecord, ScopeKey};
use crate::core::scanner::ScannedCorpus;
use crate::core::sharpness;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

/// Run the per-file part of the state machine.
pub fn screen(
    path: &Path,
    scope_key: ScopeKey,
    config: &SieveConfig,
    fingerprinter: &FingerprintStrategy,
) -> ImageRecord {
    let mut record = ImageRecord::new(path, scope_key);

    let (width, height) = match probe::dimensions(path) {
        Ok(dims) => dims,
        Err(e) => return reject_decode(record, e),
    };
    record.width = width;
    record.height = height;

    if config.is_undersized(width, height) {
        record.disposition = Disposition::RejectSmall;
        return record;
    }

    let image = match probe::probe(path) {
        Ok(image) => image,
        Err(e) => return reject_decode(record, e),
    };
    record.width = image.width;
    record.height = image.height;

    let verdict = sharpness::assess(&image.gray, &config.blur);
    log::debug!("{}: blur scores {:?}", path.display(), verdict.scores);
    record.blur_scores = verdict.scores;
    if verdict.blurry {
        record.disposition = Disposition::RejectBlur;
        return record;
    }

    record.fingerprint = Some(fingerprinter.fingerprint(&image.gray));
    record.disposition = Disposition::Candidate;
    record
}

fn reject_decode(mut record: ImageRecord, error: probe::ProbeError) -> ImageRecord {
    log::warn!("Failed to decode {}: {}", record.path.display(), error);
    record.width = 0;
    record.height = 0;
    record.disposition = Disposition::RejectDecodeError;
    record.error = Some(error.to_string());
    record
}

/// Members of one near-duplicate cluster within a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub id: usize,
    pub scope_key: ScopeKey,
    pub representative: PathBuf,
    /// Every member, representative included, sorted by path.
    pub members: Vec<PathBuf>,
}

/// Disjoint-set forest over indices, with path compression and union by rank.
#[derive(Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Components with more than one member, each sorted, in order of their
    /// smallest index.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().filter(|g| g.len() > 1).collect();
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

/// Cluster the candidates of one scope and settle their dispositions.
pub fn resolve_scope(records: &mut [ImageRecord], config: &SieveConfig) -> Vec<DuplicateCluster> {
    let mut candidates: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.disposition == Disposition::Candidate && r.fingerprint.is_some())
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by(|a, b| records[*a].path.cmp(&records[*b].path));

    let mut sets = DisjointSet::new(candidates.len());
    let threshold = config.hamming_threshold;

    if threshold == 0 {
        // Exact matches only: bucket instead of comparing every pair.
        let mut buckets: HashMap<Fingerprint, usize> = HashMap::new();
        for (slot, &i) in candidates.iter().enumerate() {
            if let Some(fp) = records[i].fingerprint {
                match buckets.entry(fp) {
                    Entry::Occupied(first) => sets.union(*first.get(), slot),
                    Entry::Vacant(vacant) => {
                        vacant.insert(slot);
                    }
                }
            }
        }
    } else {
        for a in 0..candidates.len() {
            for b in (a + 1)..candidates.len() {
                let (fa, fb) = (&records[candidates[a]].fingerprint, &records[candidates[b]].fingerprint);
                if let (Some(fa), Some(fb)) = (fa, fb) {
                    if fa.is_near(fb, threshold) {
                        sets.union(a, b);
                    }
                }
            }
        }
    }

    for &i in &candidates {
        records[i].disposition = Disposition::Keep;
    }

    let mut clusters = Vec::new();
    for (id, group) in sets.groups().into_iter().enumerate() {
        let members: Vec<usize> = group.iter().map(|&slot| candidates[slot]).collect();
        let representative = choose_representative(records, &members, config.representative);

        for &i in &members {
            records[i].cluster_id = Some(id);
            if i != representative {
                records[i].disposition = Disposition::RejectDuplicate;
            }
        }

        let mut member_paths: Vec<PathBuf> = members.iter().map(|&i| records[i].path.clone()).collect();
        member_paths.sort();
        clusters.push(DuplicateCluster {
            id,
            scope_key: records[representative].scope_key.clone(),
            representative: records[representative].path.clone(),
            members: member_paths,
        });
    }

    clusters
}

fn choose_representative(
    records: &[ImageRecord],
    members: &[usize],
    policy: RepresentativePolicy,
) -> usize {
    let preferred = |a: &usize, b: &usize| -> Ordering {
        let (ra, rb) = (&records[*a], &records[*b]);
        let by_path = ra.path.cmp(&rb.path);
        match policy {
            RepresentativePolicy::LargestArea => rb.area().cmp(&ra.area()).then(by_path),
            RepresentativePolicy::Path => by_path,
        }
    };
    members
        .iter()
        .copied()
        .min_by(preferred)
        .unwrap_or(members[0])
}

/// Resolve every scope of a scanned root.
pub fn decide(corpus: &mut ScannedCorpus, config: &SieveConfig) -> Vec<DuplicateCluster> {
    corpus
        .values_mut()
        .flat_map(|records| resolve_scope(records, config))
        .collect()
}

//! Clusters and the mutable partition the merge search works on.
//!
//! # Invariants
//!
//! - Clusters in a [`ClusterPartition`] are pairwise disjoint and their union
//!   is every mention id the document knows about.
//! - A merge removes exactly one cluster and moves its mentions to the
//!   surviving cluster; mention count never changes.
//! - A removed cluster id never reappears.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::document::{ClusterId, Document, Mention, MentionId};
use crate::error::{Error, Result};
use crate::features::{FeatureExtractor, FeatureVector};

// =============================================================================
// Cluster
// =============================================================================

/// A set of mentions hypothesized to corefer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    id: ClusterId,
    mentions: BTreeSet<MentionId>,
    /// Cached representative mention. `None` when no member is in the gold mapping.
    head: Option<Mention>,
}

impl Cluster {
    fn from_members(id: ClusterId, mentions: BTreeSet<MentionId>, document: &Document) -> Self {
        let head = mentions
            .iter()
            .filter_map(|m| document.mention(*m))
            .fold(None::<&Mention>, |best, m| match best {
                Some(b) if !m.more_representative_than(b) => Some(b),
                _ => Some(m),
            })
            .cloned();
        Self { id, mentions, head }
    }

    /// Cluster id.
    #[must_use]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Member mention ids, ascending.
    #[must_use]
    pub fn mentions(&self) -> &BTreeSet<MentionId> {
        &self.mentions
    }

    /// Representative mention, if any member has gold information.
    #[must_use]
    pub fn head(&self) -> Option<&Mention> {
        self.head.as_ref()
    }

    /// True if the representative mention is pronominal.
    #[must_use]
    pub fn is_pronominal(&self) -> bool {
        self.head.as_ref().is_some_and(|h| h.pronominal)
    }

    /// Number of member mentions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// True if the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    /// True when every member is present in the document's gold mapping.
    #[must_use]
    pub fn is_covered_by(&self, document: &Document) -> bool {
        self.mentions.iter().all(|m| document.mention(*m).is_some())
    }
}

// =============================================================================
// ClusterPartition
// =============================================================================

/// An unordered candidate pair `(a, b)` with `a < b`; `a` survives a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    /// Lower cluster id (merge target).
    pub target: ClusterId,
    /// Higher cluster id (merged away).
    pub source: ClusterId,
}

impl CandidatePair {
    /// Order two ids into a pair.
    #[must_use]
    pub fn new(a: ClusterId, b: ClusterId) -> Self {
        if a <= b {
            Self { target: a, source: b }
        } else {
            Self { target: b, source: a }
        }
    }
}

impl std::fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<-{}", self.target, self.source)
    }
}

/// The full set of clusters for one document at one point in a search.
///
/// Cluster-pair features are cached lazily and dropped wholesale on every
/// merge, since a merge can change the features of any remaining pair.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterPartition {
    document: String,
    clusters: BTreeMap<ClusterId, Cluster>,
    #[serde(skip)]
    features: HashMap<CandidatePair, FeatureVector>,
}

impl ClusterPartition {
    /// One cluster per initial group of the document.
    ///
    /// Cluster ids follow the order of `document.clusters`. Gold-mapped
    /// mentions that no initial group mentions become trailing singletons.
    pub fn initialize(document: &Document) -> Result<Self> {
        let mut seen: BTreeSet<MentionId> = BTreeSet::new();
        let mut clusters = BTreeMap::new();
        let mut next_id: ClusterId = 0;

        for group in &document.clusters {
            if group.is_empty() {
                return Err(Error::invalid_input(format!(
                    "document '{}' has an empty initial cluster",
                    document.id
                )));
            }
            let mut members = BTreeSet::new();
            for &m in group {
                if !seen.insert(m) {
                    return Err(Error::invalid_input(format!(
                        "mention {} appears in more than one initial cluster of '{}'",
                        m, document.id
                    )));
                }
                members.insert(m);
            }
            clusters.insert(next_id, Cluster::from_members(next_id, members, document));
            next_id += 1;
        }

        for &m in document.mentions.keys() {
            if seen.insert(m) {
                let members = BTreeSet::from([m]);
                clusters.insert(next_id, Cluster::from_members(next_id, members, document));
                next_id += 1;
            }
        }

        Ok(Self {
            document: document.id.clone(),
            clusters,
            features: HashMap::new(),
        })
    }

    /// Id of the document this partition belongs to.
    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// True if there are no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of mentions across clusters.
    #[must_use]
    pub fn mention_count(&self) -> usize {
        self.clusters.values().map(Cluster::len).sum()
    }

    /// Look up a cluster.
    #[must_use]
    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Clusters in id order.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Cluster holding `mention`, if any.
    #[must_use]
    pub fn cluster_of(&self, mention: MentionId) -> Option<&Cluster> {
        self.clusters.values().find(|c| c.mentions.contains(&mention))
    }

    /// All pairs `a < b` of current clusters whose representatives are both
    /// non-pronominal, in lexicographic id order.
    ///
    /// Clusters with no gold-mapped member have no representative and are
    /// skipped as inconsistent data.
    #[must_use]
    pub fn candidate_pairs(&self) -> Vec<CandidatePair> {
        let eligible: Vec<ClusterId> = self
            .clusters
            .values()
            .filter(|c| {
                if c.head.is_none() {
                    log::warn!(
                        "cluster {} of '{}' has no gold-mapped mention; excluded from merging",
                        c.id,
                        self.document
                    );
                    return false;
                }
                !c.is_pronominal()
            })
            .map(|c| c.id)
            .collect();

        let mut pairs = Vec::with_capacity(eligible.len() * eligible.len().saturating_sub(1) / 2);
        for (i, &a) in eligible.iter().enumerate() {
            for &b in &eligible[i + 1..] {
                pairs.push(CandidatePair { target: a, source: b });
            }
        }
        pairs
    }

    /// Features of a candidate pair, computed on first request after a merge.
    pub fn pair_features<E: FeatureExtractor + ?Sized>(
        &mut self,
        document: &Document,
        extractor: &E,
        pair: CandidatePair,
    ) -> Result<&FeatureVector> {
        let a = self
            .clusters
            .get(&pair.target)
            .ok_or(Error::UnknownCluster(pair.target))?;
        let b = self
            .clusters
            .get(&pair.source)
            .ok_or(Error::UnknownCluster(pair.source))?;
        Ok(self
            .features
            .entry(pair)
            .or_insert_with(|| extractor.features(document, a, b)))
    }

    /// Absorb `source` into `target` and drop `source`.
    ///
    /// The representative is re-chosen between the two heads; `target`'s head
    /// wins ties. All cached pair features are invalidated.
    pub fn merge(&mut self, target: ClusterId, source: ClusterId) -> Result<()> {
        if target == source {
            return Err(Error::invalid_input(format!(
                "cannot merge cluster {} with itself",
                target
            )));
        }
        if !self.clusters.contains_key(&target) {
            return Err(Error::UnknownCluster(target));
        }
        let absorbed = self
            .clusters
            .remove(&source)
            .ok_or(Error::UnknownCluster(source))?;

        if let Some(survivor) = self.clusters.get_mut(&target) {
            survivor.mentions.extend(absorbed.mentions);
            survivor.head = match (survivor.head.take(), absorbed.head) {
                (Some(t), Some(s)) if s.pronominal && !t.pronominal => Some(t),
                (Some(t), Some(s)) if !s.pronominal && t.pronominal => Some(s),
                (Some(t), _) => Some(t),
                (None, s) => s,
            };
        }
        self.features.clear();
        log::debug!("'{}': merged cluster {} into {}", self.document, source, target);
        Ok(())
    }

    /// Canonical membership, independent of cluster ids: sorted lists of
    /// sorted mention ids. Two partitions are the same state iff their
    /// signatures are equal.
    #[must_use]
    pub fn signature(&self) -> Vec<Vec<MentionId>> {
        let mut sig: Vec<Vec<MentionId>> = self
            .clusters
            .values()
            .map(|c| c.mentions.iter().copied().collect())
            .collect();
        sig.sort();
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::AverageLinkage;

    fn doc() -> Document {
        Document::new("d")
            .with_mention(Mention::new(0, "Obama").with_gold(1))
            .with_mention(Mention::pronoun(1, "he").with_gold(1))
            .with_mention(Mention::new(2, "the president").with_gold(1))
            .with_mention(Mention::new(3, "Biden").with_gold(2))
            .with_cluster(vec![0])
            .with_cluster(vec![1])
            .with_cluster(vec![2])
    }

    #[test]
    fn uncovered_mentions_become_singletons() {
        let p = ClusterPartition::initialize(&doc()).unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p.get(3).unwrap().mentions(), &BTreeSet::from([3]));
        assert_eq!(p.mention_count(), 4);
    }

    #[test]
    fn overlapping_initial_clusters_rejected() {
        let d = doc().with_cluster(vec![0]);
        assert!(ClusterPartition::initialize(&d).is_err());
    }

    #[test]
    fn candidate_pairs_skip_pronominal_heads() {
        let p = ClusterPartition::initialize(&doc()).unwrap();
        let pairs = p.candidate_pairs();
        assert!(pairs.iter().all(|c| c.target != 1 && c.source != 1));
        assert_eq!(
            pairs,
            vec![
                CandidatePair::new(0, 2),
                CandidatePair::new(0, 3),
                CandidatePair::new(2, 3)
            ]
        );
    }

    #[test]
    fn merge_keeps_target_and_prefers_nominal_head() {
        let mut p = ClusterPartition::initialize(&doc()).unwrap();
        p.merge(1, 2).unwrap();
        let merged = p.get(1).unwrap();
        assert_eq!(merged.mentions(), &BTreeSet::from([1, 2]));
        assert_eq!(merged.head().map(|h| h.id), Some(2));
        assert!(p.get(2).is_none());
        assert!(matches!(p.merge(0, 2), Err(Error::UnknownCluster(2))));
    }

    #[test]
    fn merge_invalidates_cached_features() {
        let d = doc().with_pair_features(0, 2, FeatureVector::new().with("m", 1.0));
        let mut p = ClusterPartition::initialize(&d).unwrap();
        let before = p
            .pair_features(&d, &AverageLinkage, CandidatePair::new(0, 2))
            .unwrap()
            .get("m");
        assert_eq!(before, 1.0);
        p.merge(0, 3).unwrap();
        let after = p
            .pair_features(&d, &AverageLinkage, CandidatePair::new(0, 2))
            .unwrap()
            .get("m");
        assert_eq!(after, 0.5);
    }

    #[test]
    fn signature_ignores_cluster_ids() {
        let d = doc();
        let mut a = ClusterPartition::initialize(&d).unwrap();
        let mut b = ClusterPartition::initialize(&d).unwrap();
        a.merge(0, 2).unwrap();
        a.merge(0, 3).unwrap();
        b.merge(2, 3).unwrap();
        b.merge(0, 2).unwrap();
        assert_eq!(a.signature(), b.signature());
    }
}

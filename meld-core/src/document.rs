//! Documents and the mentions they own.
//!
//! A [`Document`] is the unit the merge search runs over. It carries:
//!
//! - every [`Mention`] keyed by id, with its pronominal flag and (for
//!   gold-supervised runs) its gold cluster id
//! - the initial grouping of mentions produced by preprocessing
//! - optional per-mention-pair feature vectors, read by
//!   [`AverageLinkage`](crate::features::AverageLinkage)
//!
//! Documents are immutable while a search runs; the search mutates its own
//! [`ClusterPartition`](crate::ClusterPartition) instead.
//!
//! # Example
//!
//! ```rust
//! use meld_core::{Document, Mention};
//!
//! let doc = Document::new("topic-1")
//!     .with_mention(Mention::new(0, "Marie Curie").with_gold(7))
//!     .with_mention(Mention::pronoun(1, "she").with_gold(7))
//!     .with_cluster(vec![0])
//!     .with_cluster(vec![1]);
//!
//! assert_eq!(doc.len(), 2);
//! assert!(doc.mention(1).is_some_and(|m| m.pronominal));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::features::FeatureVector;

/// Identifier of a mention, unique within a document.
pub type MentionId = u64;

/// Identifier of a cluster, unique within a partition.
pub type ClusterId = u64;

// =============================================================================
// Mention
// =============================================================================

/// An occurrence of an entity reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mention {
    /// Unique id within the document.
    pub id: MentionId,
    /// Surface form, kept for logs and output only.
    #[serde(default)]
    pub text: String,
    /// Pronominal mentions stay in their clusters but never drive a merge.
    #[serde(default)]
    pub pronominal: bool,
    /// Gold cluster id, present only in gold-supervised runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_cluster: Option<u64>,
}

impl Mention {
    /// Create a non-pronominal mention.
    #[must_use]
    pub fn new(id: MentionId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            pronominal: false,
            gold_cluster: None,
        }
    }

    /// Create a pronominal mention.
    #[must_use]
    pub fn pronoun(id: MentionId, text: impl Into<String>) -> Self {
        Self {
            pronominal: true,
            ..Self::new(id, text)
        }
    }

    /// Attach a gold cluster id.
    #[must_use]
    pub fn with_gold(mut self, gold_cluster: u64) -> Self {
        self.gold_cluster = Some(gold_cluster);
        self
    }

    /// True when both mentions carry the same gold cluster id.
    ///
    /// Mentions without gold information never corefer.
    #[must_use]
    pub fn corefers_with(&self, other: &Mention) -> bool {
        matches!((self.gold_cluster, other.gold_cluster), (Some(a), Some(b)) if a == b)
    }

    /// Whether `self` is a better cluster representative than `other`.
    ///
    /// Non-pronominal mentions win; otherwise the earlier mention wins.
    #[must_use]
    pub fn more_representative_than(&self, other: &Mention) -> bool {
        match (self.pronominal, other.pronominal) {
            (false, true) => true,
            (true, false) => false,
            _ => self.id < other.id,
        }
    }
}

impl std::fmt::Display for Mention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} \"{}\"", self.id, self.text)
    }
}

// =============================================================================
// Document
// =============================================================================

/// A document: mentions, their initial clusters, and mention-pair features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document (or topic) identifier.
    pub id: String,
    /// Gold mention mapping, keyed by mention id.
    #[serde(with = "mention_list")]
    pub mentions: BTreeMap<MentionId, Mention>,
    /// Initial clusters from preprocessing, as lists of mention ids.
    #[serde(default)]
    pub clusters: Vec<Vec<MentionId>>,
    /// Feature vectors for mention pairs, stored once under `(low, high)`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pair_features: BTreeMap<MentionId, BTreeMap<MentionId, FeatureVector>>,
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Add a mention.
    #[must_use]
    pub fn with_mention(mut self, mention: Mention) -> Self {
        self.mentions.insert(mention.id, mention);
        self
    }

    /// Add an initial cluster.
    #[must_use]
    pub fn with_cluster(mut self, mentions: Vec<MentionId>) -> Self {
        self.clusters.push(mentions);
        self
    }

    /// Add features for a mention pair (order does not matter).
    #[must_use]
    pub fn with_pair_features(mut self, a: MentionId, b: MentionId, features: FeatureVector) -> Self {
        self.set_pair_features(a, b, features);
        self
    }

    /// Set features for a mention pair (order does not matter).
    pub fn set_pair_features(&mut self, a: MentionId, b: MentionId, features: FeatureVector) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.pair_features
            .entry(lo)
            .or_default()
            .insert(hi, features);
    }

    /// Features for a mention pair, if any were supplied.
    #[must_use]
    pub fn pair_features(&self, a: MentionId, b: MentionId) -> Option<&FeatureVector> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.pair_features.get(&lo).and_then(|row| row.get(&hi))
    }

    /// Look up a mention in the gold mapping.
    #[must_use]
    pub fn mention(&self, id: MentionId) -> Option<&Mention> {
        self.mentions.get(&id)
    }

    /// Number of mentions in the gold mapping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// True if the document has no mentions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    /// Every mention id known to the document: the gold mapping plus any id
    /// referenced by an initial cluster.
    #[must_use]
    pub fn mention_ids(&self) -> BTreeSet<MentionId> {
        self.mentions
            .keys()
            .copied()
            .chain(self.clusters.iter().flatten().copied())
            .collect()
    }

    /// Gold clusters as sorted lists of mention ids, for handing to external scorers.
    ///
    /// Mentions without a gold id become singletons.
    #[must_use]
    pub fn gold_clusters(&self) -> Vec<Vec<MentionId>> {
        let mut by_gold: BTreeMap<u64, Vec<MentionId>> = BTreeMap::new();
        let mut singletons = Vec::new();
        for mention in self.mentions.values() {
            match mention.gold_cluster {
                Some(gold) => by_gold.entry(gold).or_default().push(mention.id),
                None => singletons.push(vec![mention.id]),
            }
        }
        let mut clusters: Vec<Vec<MentionId>> = by_gold.into_values().collect();
        clusters.extend(singletons);
        clusters.sort();
        clusters
    }
}

/// Serializes the mention map as a plain list; ids live inside each mention.
mod mention_list {
    use super::{Mention, MentionId};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        mentions: &BTreeMap<MentionId, Mention>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Mention> = mentions.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<MentionId, Mention>, D::Error> {
        let list = Vec::<Mention>::deserialize(deserializer)?;
        let mut mentions = BTreeMap::new();
        for mention in list {
            if mentions.contains_key(&mention.id) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate mention id {}",
                    mention.id
                )));
            }
            mentions.insert(mention.id, mention);
        }
        Ok(mentions)
    }
}

//! # meld-core
//!
//! Core types for the meld workspace: the data the merge search operates on.
//!
//! This crate provides:
//! - **Documents**: `Document`, `Mention` (with gold cluster ids for supervised runs)
//! - **Partitions**: `Cluster`, `ClusterPartition`, `CandidatePair`
//! - **Features**: `FeatureVector`, `FeatureSchema`, the `FeatureExtractor` seam
//! - **Weights**: `WeightVector`
//!
//! The search and learning engine lives in the `meld` crate; it depends on
//! `meld-core` for every type it passes around.

#![warn(missing_docs)]

pub mod cluster;
pub mod document;
pub mod error;
pub mod features;
pub mod weight;

pub use cluster::{CandidatePair, Cluster, ClusterPartition};
pub use document::{ClusterId, Document, Mention, MentionId};
pub use error::{Error, Result};
pub use features::{AverageLinkage, FeatureExtractor, FeatureSchema, FeatureVector};
pub use weight::WeightVector;

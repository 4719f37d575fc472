//! Labelled merge records emitted by greedy decoding.
//!
//! Every candidate the greedy search scores in a merging round yields one
//! `(features, quality)` record for an external regression learner. Sinks are
//! write-only: nothing they do feeds back into the search.

use serde::{Deserialize, Serialize};
use std::io::Write;

use meld_core::{CandidatePair, FeatureVector};

use crate::error::{Error, Result};

/// One labelled candidate merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// Document the candidate came from.
    pub document: String,
    /// The candidate pair.
    pub pair: CandidatePair,
    /// Features of the pair at scoring time.
    pub features: FeatureVector,
    /// Fraction of introduced mention pairs that are gold-coreferent.
    pub quality: f64,
}

/// Destination for [`TrainingRecord`]s.
pub trait RecordSink {
    /// Accept a record. Must not fail; sinks latch their own errors.
    fn record(&mut self, record: TrainingRecord);
}

impl RecordSink for Vec<TrainingRecord> {
    fn record(&mut self, record: TrainingRecord) {
        self.push(record);
    }
}

/// Discards records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn record(&mut self, _record: TrainingRecord) {}
}

/// Writes records as JSON lines.
///
/// The first write error is kept and returned by [`finish`](Self::finish);
/// later records are dropped.
#[derive(Debug)]
pub struct JsonlSink<W: Write> {
    writer: W,
    written: usize,
    error: Option<Error>,
}

impl<W: Write> JsonlSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            error: None,
        }
    }

    /// Records written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the writer, or the first error seen.
    pub fn finish(mut self) -> Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_line(&mut self, record: &TrainingRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn record(&mut self, record: TrainingRecord) {
        if self.error.is_some() {
            return;
        }
        match self.write_line(&record) {
            Ok(()) => self.written += 1,
            Err(e) => {
                log::warn!("record sink failed after {} records: {}", self.written, e);
                self.error = Some(e);
            }
        }
    }
}

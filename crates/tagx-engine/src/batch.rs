//! Parallel batch processing
//!
//! All tags in a batch derive against the same history snapshot, so the
//! result does not depend on worker scheduling. Accepted keys are published
//! afterwards in input order.

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tagx_core::Tag;

use crate::processor::{process_with, TagOutcome, TagProcessor};

/// Counts over one batch, keyed by failure kind name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub accepted: usize,
    pub failed: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[TagOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match &outcome.failure {
                None => summary.accepted += 1,
                Some(kind) => {
                    let name = serde_json::to_value(kind)
                        .ok()
                        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_owned))
                        .unwrap_or_else(|| "unknown".into());
                    *summary.failed.entry(name).or_insert(0) += 1;
                }
            }
        }
        summary
    }
}

impl TagProcessor {
    /// Process `tags` on the rayon pool. Outcomes come back in input order.
    pub fn process_batch(&self, tags: &[Tag]) -> Result<Vec<TagOutcome>> {
        let config = self.config();
        let snapshot = self.history().snapshot();

        let outcomes: Vec<TagOutcome> = tags
            .par_iter()
            .map(|tag| process_with(tag, &config, &snapshot))
            .collect();

        if config.history.record {
            let records = outcomes
                .iter()
                .flat_map(TagOutcome::history_records)
                .collect();
            self.history().append_all(records)?;
        }

        let summary = BatchSummary::from_outcomes(&outcomes);
        tracing::info!(
            total = summary.total,
            accepted = summary.accepted,
            failed = ?summary.failed,
            "batch processed"
        );
        Ok(outcomes)
    }
}

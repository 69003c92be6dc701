//! Tag processor: one call per tag, fresh state every time
//!
//! The processor holds the active configuration behind an `RwLock<Arc<_>>`
//! so it can be swapped while tags are in flight. Each `process` call clones
//! the `Arc` and takes a history snapshot up front, then runs without
//! touching either lock again.

use anyhow::Result;
use serde::{Serialize, Serializer};
use std::sync::{Arc, PoisonError, RwLock};
use tagx_core::{
    FailureKind, LayerDescriptor, Phase, Tag, TagxConfig, TagxResult,
};

use crate::history::{HistoryRecord, HistorySnapshot, KeyHistory};
use crate::machine::{self, RunOutcome, RunTrace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Accepted,
    Failed,
}

/// Result of processing one tag, in the shape callers consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagOutcome {
    pub tag_type: u16,
    pub offset: u64,
    pub status: Status,
    #[serde(serialize_with = "hex_opt", skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Accepted candidate's confidence, or the best rejected one on failure
    pub confidence: f64,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recipe: Vec<LayerDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub trace: RunTrace,
}

impl TagOutcome {
    pub fn is_accepted(&self) -> bool {
        self.status == Status::Accepted
    }

    fn from_run(tag: &Tag, outcome: RunOutcome, trace: RunTrace) -> Self {
        match outcome {
            RunOutcome::Accepted(accepted) => Self {
                tag_type: tag.type_id,
                offset: tag.offset,
                status: Status::Accepted,
                plaintext: Some(accepted.plaintext),
                header_len: Some(accepted.header_len),
                marker: Some(accepted.marker),
                phase: Some(accepted.phase),
                confidence: accepted.confidence,
                warnings: accepted.warnings,
                recipe: accepted.recipe,
                failure: None,
                trace,
            },
            RunOutcome::Failed(kind) => Self {
                tag_type: tag.type_id,
                offset: tag.offset,
                status: Status::Failed,
                plaintext: None,
                header_len: None,
                marker: None,
                phase: None,
                confidence: trace.best_confidence(),
                warnings: Vec::new(),
                recipe: Vec::new(),
                failure: Some(kind),
                trace,
            },
        }
    }

    /// History records for the accepted recipe, one per layer.
    pub fn history_records(&self) -> Vec<HistoryRecord> {
        if !self.is_accepted() {
            return Vec::new();
        }
        self.recipe
            .iter()
            .map(|layer| {
                HistoryRecord::new(self.tag_type, self.offset, layer.layer_index, layer.key.clone())
            })
            .collect()
    }
}

fn hex_opt<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&hex::encode_upper(b)),
        None => s.serialize_none(),
    }
}

pub struct TagProcessor {
    config: RwLock<Arc<TagxConfig>>,
    history: Arc<KeyHistory>,
}

impl TagProcessor {
    pub fn new(config: TagxConfig, history: Arc<KeyHistory>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            history,
        }
    }

    /// Processor with the built-in profiles and an in-memory history.
    pub fn with_defaults() -> Self {
        Self::new(TagxConfig::default(), Arc::new(KeyHistory::in_memory()))
    }

    /// The configuration new attempts will start with.
    pub fn config(&self) -> Arc<TagxConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn history(&self) -> &Arc<KeyHistory> {
        &self.history
    }

    /// Replace the active configuration. Attempts already running keep the
    /// snapshot they started with; an invalid config is rejected and the
    /// current one stays active.
    pub fn reload(&self, config: TagxConfig) -> TagxResult<()> {
        config.validate()?;
        let profiles = config.profiles.len();
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        tracing::info!(profiles, "configuration reloaded");
        Ok(())
    }

    /// Decrypt one tag. Never mutates the tag or the shared history.
    pub fn process(&self, tag: &Tag) -> TagOutcome {
        let config = self.config();
        let snapshot = self.history.snapshot();
        process_with(tag, &config, &snapshot)
    }

    /// Decrypt one tag and, when recording is enabled, publish the accepted
    /// keys to the shared history.
    pub fn process_and_record(&self, tag: &Tag) -> Result<TagOutcome> {
        let config = self.config();
        let outcome = process_with(tag, &config, &self.history.snapshot());
        if config.history.record {
            self.history.append_all(outcome.history_records())?;
        }
        Ok(outcome)
    }
}

/// Pure core of [`TagProcessor::process`]: same inputs, same outcome.
pub fn process_with(tag: &Tag, config: &TagxConfig, history: &HistorySnapshot) -> TagOutcome {
    let run = machine::run(tag, config, history);
    TagOutcome::from_run(tag, run.outcome, run.trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagx_crypto::{LayerCodec, Rc4Codec, XorCodec};

    #[test]
    fn builtin_xor_family_decodes() {
        let plain = b"<doAction>var x = \"hello world\";</doAction>";
        let mut raw = vec![0x00, 0x01];
        raw.extend(XorCodec.encode(plain, &[0xAA]).unwrap());

        let processor = TagProcessor::with_defaults();
        let outcome = processor.process(&Tag::new(233, 0x100, raw));
        assert!(outcome.is_accepted(), "{:?}", outcome.failure);
        assert_eq!(outcome.plaintext.as_deref(), Some(&plain[..]));
        assert_eq!(outcome.header_len, Some(2));
        assert_eq!(outcome.phase, Some(Phase::Early));
        assert_eq!(outcome.recipe.len(), 1);
        assert_eq!(outcome.recipe[0].key.as_bytes(), &[0xAA]);
    }

    #[test]
    fn builtin_rc4_decodes() {
        let plain = b"function onLoad() { trace('EvonyAge2 assets ready'); }";
        let mut raw = vec![0x10, 0x20, 0x30];
        raw.extend(Rc4Codec.encode(plain, b"EvonyAge2").unwrap());

        let outcome = TagProcessor::with_defaults().process(&Tag::new(396, 0x2000, raw));
        assert!(outcome.is_accepted(), "{:?}", outcome.failure);
        assert_eq!(outcome.plaintext.as_deref(), Some(&plain[..]));
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("ambiguous layer count")));
    }

    #[test]
    fn unknown_type_fails_immediately() {
        let outcome = TagProcessor::with_defaults().process(&Tag::new(7, 0, vec![1, 2, 3]));
        assert_eq!(outcome.status, Status::Failed);
        assert!(matches!(
            outcome.failure,
            Some(FailureKind::MarkerNotRecognized { .. })
        ));
        assert_eq!(outcome.trace.attempts, 0);
    }

    #[test]
    fn empty_tag_is_analyzer_input_empty() {
        let outcome = TagProcessor::with_defaults().process(&Tag::new(233, 0, Vec::new()));
        assert_eq!(outcome.failure, Some(FailureKind::AnalyzerInputEmpty));

        let header_only = TagProcessor::with_defaults().process(&Tag::new(233, 0, vec![1, 2]));
        assert_eq!(header_only.failure, Some(FailureKind::AnalyzerInputEmpty));
    }

    #[test]
    fn outcome_serializes_plaintext_as_hex() {
        let mut raw = vec![0, 0];
        raw.extend(XorCodec.encode(b"plain text payload here", &[0x55]).unwrap());
        let outcome = TagProcessor::with_defaults().process(&Tag::new(233, 0, raw));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["plaintext"], hex::encode_upper(b"plain text payload here"));
        assert!(json.get("failure").is_none());
        assert!(json["trace"]["entries"].is_array());
    }

    #[test]
    fn reload_rejects_invalid_config() {
        let processor = TagProcessor::with_defaults();
        let mut bad = TagxConfig::default();
        bad.profiles.push(bad.profiles[0].clone());
        assert!(processor.reload(bad).is_err());
        assert_eq!(processor.config().profiles.len(), 4);
    }
}

//! The decryption state machine
//!
//! ```text
//! INIT → MARKER_DETECT → LAYER_DECODE → CANDIDATE_READY → ACCEPTED
//!                             ↑                ↓
//!                             └──── RETRY ←────┤
//!                                              ↓
//!                                          EXHAUSTED
//! ```
//!
//! One run owns its key states and trace and touches nothing shared except
//! the history snapshot it was handed. It decodes at most `max_hypotheses`
//! candidates, so it always terminates.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tagx_analysis::analyze;
use tagx_analysis::validate::{effective_threshold, validate_tag};
use tagx_core::{
    AnalysisResult, FailureKind, KeyMaterial, LayerDescriptor, LayerMethod, Phase, Tag, TagxConfig,
    ValidationResult,
};
use tagx_crypto::{decode_recipe, KeyError, KeyState};
use tracing::{debug, info, warn};

use crate::history::HistorySnapshot;
use crate::hypothesis::{detect_markers, Hypothesis, HypothesisQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    Init,
    MarkerDetect,
    LayerDecode,
    CandidateReady,
    Accepted,
    Retry,
    Exhausted,
}

impl MachineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MachineState::Accepted | MachineState::Exhausted)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::Init => "INIT",
            MachineState::MarkerDetect => "MARKER_DETECT",
            MachineState::LayerDecode => "LAYER_DECODE",
            MachineState::CandidateReady => "CANDIDATE_READY",
            MachineState::Accepted => "ACCEPTED",
            MachineState::Retry => "RETRY",
            MachineState::Exhausted => "EXHAUSTED",
        };
        f.write_str(s)
    }
}

/// What happened to one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    /// Derived keys repeat an earlier recipe; not decoded again
    Duplicate,
    /// The recipe could not be applied (bad key length, underivable key)
    Undecodable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// 1-based decode count; 0 for entries that were never decoded
    pub attempt: usize,
    pub hypothesis: Hypothesis,
    pub recipe: Vec<LayerDescriptor>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Complete record of one run, returned with every outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTrace {
    pub markers: Vec<String>,
    pub hypotheses_planned: usize,
    pub attempts: usize,
    pub budget_exhausted: bool,
    /// `"FROM->TO"` → number of times taken
    pub transitions: BTreeMap<String, usize>,
    pub entries: Vec<TraceEntry>,
}

impl RunTrace {
    /// Highest confidence any decoded candidate reached.
    pub fn best_confidence(&self) -> f64 {
        self.entries
            .iter()
            .filter_map(|e| e.validation.as_ref().map(|v| v.confidence))
            .fold(0.0, f64::max)
    }
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    /// Decoded payload, header excluded
    pub plaintext: Vec<u8>,
    pub header_len: usize,
    pub marker: String,
    pub phase: Phase,
    pub recipe: Vec<LayerDescriptor>,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Accepted(Accepted),
    Failed(FailureKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MachineRun {
    pub outcome: RunOutcome,
    pub trace: RunTrace,
}

/// Seed key states for one run, keyed by `(layer slot, seed index)`.
struct KeyCache {
    tag_type: u16,
    offset: u64,
    /// Per-slot seeds resolved against this tag's header
    seeds: Vec<Vec<KeyMaterial>>,
    accepted: Vec<KeyMaterial>,
    states: HashMap<(usize, usize), KeyState>,
}

impl KeyCache {
    /// Key for `phase`. States only move forward; keys of phases already
    /// passed come out of the state's history.
    fn key(&mut self, slot: usize, seed: usize, phase: Phase) -> Result<KeyMaterial, KeyError> {
        let state = match self.states.entry((slot, seed)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let base = self
                    .seeds
                    .get(slot)
                    .and_then(|s| s.get(seed))
                    .cloned()
                    .ok_or(KeyError::KeyExhausted {
                        history: Vec::new(),
                    })?;
                v.insert(KeyState::new(self.tag_type, self.offset, base))
            }
        };

        if state.phase > phase {
            return state
                .history
                .get(phase as usize)
                .cloned()
                .ok_or_else(|| KeyError::KeyExhausted {
                    history: state.history.clone(),
                });
        }
        let next = state.advance_to(phase, &self.accepted)?;
        let key = next.current().clone();
        *state = next;
        Ok(key)
    }
}

pub struct DecryptionMachine<'a> {
    tag: &'a Tag,
    config: &'a TagxConfig,
    history: &'a HistorySnapshot,
    state: MachineState,
    trace: RunTrace,
}

impl<'a> DecryptionMachine<'a> {
    pub fn new(tag: &'a Tag, config: &'a TagxConfig, history: &'a HistorySnapshot) -> Self {
        Self {
            tag,
            config,
            history,
            state: MachineState::Init,
            trace: RunTrace::default(),
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    fn transition(&mut self, to: MachineState) {
        tracing::trace!(
            tag_type = self.tag.type_id,
            offset = self.tag.offset,
            from = %self.state,
            to = %to,
            "state transition"
        );
        *self
            .trace
            .transitions
            .entry(format!("{}->{}", self.state, to))
            .or_insert(0) += 1;
        self.state = to;
    }

    fn fail(mut self, kind: FailureKind) -> MachineRun {
        if !self.state.is_terminal() {
            self.transition(MachineState::Exhausted);
        }
        if kind.is_immediate() {
            warn!(
                tag_type = self.tag.type_id,
                offset = self.tag.offset,
                "tag rejected: {kind}"
            );
        } else {
            warn!(
                tag_type = self.tag.type_id,
                offset = self.tag.offset,
                attempts = self.trace.attempts,
                "search exhausted: {kind}"
            );
        }
        MachineRun {
            outcome: RunOutcome::Failed(kind),
            trace: self.trace,
        }
    }

    /// Drive the machine to a terminal state.
    pub fn run(mut self) -> MachineRun {
        let tag = self.tag;
        let config = self.config;
        self.transition(MachineState::MarkerDetect);

        if tag.is_empty() {
            return self.fail(FailureKind::AnalyzerInputEmpty);
        }
        let Some(profile) = config.profile(tag.type_id) else {
            return self.fail(FailureKind::MarkerNotRecognized {
                reason: format!("no profile for tag type {}", tag.type_id),
            });
        };

        let markers = match detect_markers(profile, tag) {
            Ok(markers) => markers,
            Err(reason) => return self.fail(FailureKind::MarkerNotRecognized { reason }),
        };
        self.trace.markers = markers.iter().map(|m| m.spec.name.clone()).collect();
        if markers.iter().all(|m| m.spec.header_len >= tag.len()) {
            return self.fail(FailureKind::AnalyzerInputEmpty);
        }

        let accepted = self.history.accepted_keys(tag.type_id);
        let seeds: Vec<Vec<KeyMaterial>> = profile
            .layers
            .iter()
            .map(|l| l.seeds_for(tag.raw_bytes()))
            .collect();
        let seed_counts: Vec<usize> = seeds.iter().map(Vec::len).collect();
        let mut queue = HypothesisQueue::build(
            profile,
            &markers,
            &seed_counts,
            !accepted.is_empty(),
            config.search.hypothesis_limit(),
        );
        self.trace.hypotheses_planned = queue.planned();
        debug!(
            tag_type = tag.type_id,
            offset = tag.offset,
            markers = ?self.trace.markers,
            planned = queue.planned(),
            "hypothesis queue built"
        );

        let mut keys = KeyCache {
            tag_type: tag.type_id,
            offset: tag.offset,
            seeds,
            accepted,
            states: HashMap::new(),
        };
        let threshold = effective_threshold(profile, &config.validation);
        let budget = config.search.attempt_budget;
        let mut seen: HashSet<(Vec<LayerMethod>, Vec<Vec<u8>>)> = HashSet::new();
        let mut structural: Option<String> = None;

        while let Some(hypothesis) = queue.next() {
            if budget.is_some_and(|b| self.trace.attempts >= b) {
                self.trace.budget_exhausted = true;
                break;
            }
            self.transition(MachineState::LayerDecode);
            let marker = &markers[hypothesis.marker];

            let recipe = match build_recipe(&mut keys, &hypothesis) {
                Ok(recipe) => recipe,
                Err(e) => {
                    self.skip(hypothesis, Vec::new(), AttemptOutcome::Undecodable, e.to_string());
                    continue;
                }
            };

            let fingerprint = (
                hypothesis.methods.clone(),
                recipe.iter().map(|l| l.key.as_bytes().to_vec()).collect(),
            );
            if !seen.insert(fingerprint) {
                self.skip(
                    hypothesis,
                    recipe,
                    AttemptOutcome::Duplicate,
                    "derived keys repeat an earlier recipe".into(),
                );
                continue;
            }

            let payload = tag.raw_bytes().get(marker.spec.header_len..).unwrap_or_default();
            if payload.is_empty() {
                self.skip(
                    hypothesis,
                    recipe,
                    AttemptOutcome::Undecodable,
                    format!("no payload after {}-byte header", marker.spec.header_len),
                );
                continue;
            }

            let candidate = match decode_recipe(&recipe, payload) {
                Ok(candidate) => candidate,
                Err(e) => {
                    self.skip(hypothesis, recipe, AttemptOutcome::Undecodable, e.to_string());
                    continue;
                }
            };
            self.trace.attempts += 1;
            let attempt = self.trace.attempts;

            let analysis = match analyze(&candidate) {
                Ok(analysis) => analysis,
                Err(_) => return self.fail(FailureKind::AnalyzerInputEmpty),
            };
            let validation = match validate_tag(config, tag.type_id, &candidate, &analysis) {
                Ok(validation) => validation,
                Err(e) => {
                    return self.fail(FailureKind::MarkerNotRecognized {
                        reason: e.to_string(),
                    })
                }
            };
            self.transition(MachineState::CandidateReady);

            if validation.valid {
                self.transition(MachineState::Accepted);
                let mut warnings = validation.warnings.clone();
                if marker.ambiguous {
                    warnings.push(format!(
                        "ambiguous layer count: marker {} gives no count, accepted {} of {:?}",
                        marker.spec.name,
                        recipe.len(),
                        marker.layer_counts
                    ));
                }
                info!(
                    tag_type = tag.type_id,
                    offset = tag.offset,
                    phase = %hypothesis.phase,
                    attempt,
                    layers = recipe.len(),
                    confidence = validation.confidence,
                    "candidate accepted"
                );
                let accepted = Accepted {
                    plaintext: candidate,
                    header_len: marker.spec.header_len,
                    marker: marker.spec.name.clone(),
                    phase: hypothesis.phase,
                    recipe: recipe.clone(),
                    confidence: validation.confidence,
                    warnings,
                };
                self.trace.entries.push(TraceEntry {
                    attempt,
                    hypothesis,
                    recipe,
                    outcome: AttemptOutcome::Accepted,
                    analysis: Some(analysis),
                    validation: Some(validation),
                    reason: None,
                });
                return MachineRun {
                    outcome: RunOutcome::Accepted(accepted),
                    trace: self.trace,
                };
            }

            let reason = rejection_reason(&validation);
            if structural.is_none()
                && !validation.hard_check_failures.is_empty()
                && validation.confidence >= threshold
            {
                structural = validation.hard_check_failures.first().cloned();
            }
            debug!(
                tag_type = tag.type_id,
                offset = tag.offset,
                phase = %hypothesis.phase,
                attempt,
                confidence = validation.confidence,
                "candidate rejected: {reason}"
            );
            self.trace.entries.push(TraceEntry {
                attempt,
                hypothesis,
                recipe,
                outcome: AttemptOutcome::Rejected,
                analysis: Some(analysis),
                validation: Some(validation),
                reason: Some(reason),
            });
            if !queue.is_empty() {
                self.transition(MachineState::Retry);
            }
        }

        let attempts = self.trace.attempts;
        let kind = match structural {
            Some(check) => FailureKind::StructuralCheckFailed { check, attempts },
            None => FailureKind::KeyExhausted {
                attempts,
                budget_exhausted: self.trace.budget_exhausted,
            },
        };
        self.fail(kind)
    }

    fn skip(
        &mut self,
        hypothesis: Hypothesis,
        recipe: Vec<LayerDescriptor>,
        outcome: AttemptOutcome,
        reason: String,
    ) {
        debug!(
            tag_type = self.tag.type_id,
            offset = self.tag.offset,
            phase = %hypothesis.phase,
            "hypothesis skipped: {reason}"
        );
        self.trace.entries.push(TraceEntry {
            attempt: 0,
            hypothesis,
            recipe,
            outcome,
            analysis: None,
            validation: None,
            reason: Some(reason),
        });
        self.transition(MachineState::Retry);
    }
}

fn build_recipe(
    keys: &mut KeyCache,
    hypothesis: &Hypothesis,
) -> Result<Vec<LayerDescriptor>, KeyError> {
    hypothesis
        .chain
        .iter()
        .zip(&hypothesis.methods)
        .enumerate()
        .map(|(layer_index, (&(slot, seed), &method))| {
            Ok(LayerDescriptor {
                method,
                key: keys.key(slot, seed, hypothesis.phase)?,
                layer_index,
            })
        })
        .collect()
}

fn rejection_reason(validation: &ValidationResult) -> String {
    if let Some(first) = validation.hard_check_failures.first() {
        format!("hard check failed: {first}")
    } else {
        format!(
            "confidence {:.3} below threshold {:.3}",
            validation.confidence, validation.threshold
        )
    }
}

/// Run the machine for `tag` to completion.
pub fn run(tag: &Tag, config: &TagxConfig, history: &HistorySnapshot) -> MachineRun {
    DecryptionMachine::new(tag, config, history).run()
}

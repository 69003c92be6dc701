//! tagx-engine: hypothesis search over layered tag encryption
//!
//! # Overview
//! - `hypothesis`: marker detection and the bounded, cheapest-first queue
//! - `machine`: the INIT → … → ACCEPTED/EXHAUSTED state machine
//! - `history`: shared append-only log of accepted keys (LATE phase input)
//! - `processor`: per-tag entry point with hot-swappable config
//! - `batch`: rayon-parallel processing with ordered history publish

pub mod batch;
pub mod history;
pub mod hypothesis;
pub mod machine;
pub mod processor;

pub use batch::BatchSummary;
pub use history::{HistoryRecord, HistorySnapshot, KeyHistory};
pub use hypothesis::{detect_markers, DetectedMarker, Hypothesis, HypothesisQueue};
pub use machine::{
    Accepted, AttemptOutcome, DecryptionMachine, MachineRun, MachineState, RunOutcome, RunTrace,
    TraceEntry,
};
pub use processor::{process_with, Status, TagOutcome, TagProcessor};

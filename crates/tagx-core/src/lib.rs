//! tagx-core: shared types, configuration schema, and error taxonomy
//!
//! Every other tagx crate depends on this one. Nothing here performs any
//! decryption; it only describes tags, recipes, analysis/validation results,
//! and the per-tag-type profiles that drive the search.

pub mod config;
pub mod error;
pub mod types;

pub use config::{HardCheck, LayerSpec, MarkerSpec, SoftThresholds, TagProfile, TagxConfig};
pub use error::{FailureKind, TagxError, TagxResult};
pub use types::{
    AnalysisResult, KeyMaterial, LayerDescriptor, LayerMethod, Phase, SubstitutionScheme, Tag,
    ValidationResult,
};

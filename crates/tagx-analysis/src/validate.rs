//! Two-tier candidate validation
//!
//! Tier 1 is a list of hard structural checks from the tag profile; a single
//! failure makes the candidate invalid no matter how good it looks. Tier 2
//! is a weighted score over pass/fail statistical criteria, compared against
//! the profile's threshold.

use serde_json::json;
use std::collections::BTreeMap;
use tagx_core::config::{HardCheck, SoftThresholds, ValidationConfig};
use tagx_core::{AnalysisResult, TagProfile, TagxConfig, ValidationResult};

use crate::AnalysisError;

/// Validate `candidate` against the profile registered for `tag_type`.
pub fn validate_tag(
    config: &TagxConfig,
    tag_type: u16,
    candidate: &[u8],
    analysis: &AnalysisResult,
) -> Result<ValidationResult, AnalysisError> {
    let profile = config
        .profile(tag_type)
        .ok_or(AnalysisError::UnknownTagType(tag_type))?;
    Ok(validate(profile, &config.validation, candidate, analysis))
}

/// Confidence a candidate must reach for this profile.
///
/// Profiles without hard checks are held to at least `unchecked_floor`.
pub fn effective_threshold(profile: &TagProfile, settings: &ValidationConfig) -> f64 {
    let base = profile.soft.min_confidence;
    if profile.hard_checks.is_empty() {
        base.max(settings.unchecked_floor)
    } else {
        base
    }
}

pub fn validate(
    profile: &TagProfile,
    settings: &ValidationConfig,
    candidate: &[u8],
    analysis: &AnalysisResult,
) -> ValidationResult {
    let hard_check_failures: Vec<String> = profile
        .hard_checks
        .iter()
        .filter_map(|check| run_hard_check(check, candidate).err())
        .collect();

    let soft = &profile.soft;
    let (confidence, passed) = soft_score(soft, analysis);
    let threshold = effective_threshold(profile, settings);
    let valid = hard_check_failures.is_empty() && confidence >= threshold;

    let mut warnings = Vec::new();
    let entropy_gap = soft.entropy_max - analysis.entropy;
    if (0.0..settings.entropy_warn_margin).contains(&entropy_gap) {
        warnings.push(format!(
            "entropy {:.3} is within {} of the {} limit",
            analysis.entropy, settings.entropy_warn_margin, soft.entropy_max
        ));
    }
    if valid {
        if confidence - threshold < settings.confidence_warn_margin {
            warnings.push(format!(
                "confidence {confidence:.3} is borderline (threshold {threshold:.3})"
            ));
        }
        if let Some(p) = analysis.repeating_pattern_length {
            warnings.push(format!(
                "accepted candidate still repeats with period {p}"
            ));
        }
    }

    let mut details = BTreeMap::new();
    details.insert("entropy".into(), json!(analysis.entropy));
    details.insert(
        "repeating_pattern_length".into(),
        json!(analysis.repeating_pattern_length),
    );
    details.insert("longest_ascii_run".into(), json!(analysis.longest_ascii_run));
    details.insert("printable_ratio".into(), json!(analysis.printable_ratio));
    details.insert("criteria_passed".into(), json!(passed));
    details.insert("hard_checks".into(), json!(profile.hard_checks.len()));

    tracing::trace!(
        tag_type = profile.type_id,
        confidence,
        threshold,
        hard_failures = hard_check_failures.len(),
        valid,
        "candidate validated"
    );

    ValidationResult {
        valid,
        confidence,
        threshold,
        hard_check_failures,
        warnings,
        details,
    }
}

/// Weighted fraction of satisfied soft criteria, plus their names.
fn soft_score(soft: &SoftThresholds, analysis: &AnalysisResult) -> (f64, Vec<&'static str>) {
    let w = &soft.weights;
    let required_run = soft.min_ascii_run.min(analysis.len);
    let criteria = [
        ("entropy", w.entropy, analysis.entropy <= soft.entropy_max),
        (
            "no_repeat",
            w.no_repeat,
            analysis.repeating_pattern_length.is_none(),
        ),
        (
            "ascii_run",
            w.ascii_run,
            analysis.longest_ascii_run >= required_run,
        ),
        (
            "printable",
            w.printable,
            analysis.printable_ratio >= soft.min_printable_ratio,
        ),
    ];

    let total = w.total();
    if total <= 0.0 {
        return (0.0, Vec::new());
    }
    let mut score = 0.0;
    let mut passed = Vec::new();
    for (name, weight, ok) in criteria {
        if ok {
            score += weight;
            passed.push(name);
        }
    }
    ((score / total).clamp(0.0, 1.0), passed)
}

/// `Err` carries a human-readable failure reason.
fn run_hard_check(check: &HardCheck, candidate: &[u8]) -> Result<(), String> {
    let len = candidate.len();
    match check {
        HardCheck::MinLength { bytes } => {
            if len >= *bytes {
                Ok(())
            } else {
                Err(format!("{}: candidate is {len} bytes", check.name()))
            }
        }
        HardCheck::LengthField {
            offset,
            width,
            big_endian,
            adjust,
        } => {
            let value = read_field(candidate, *offset, *width, *big_endian)
                .ok_or_else(|| format!("{}: field truncated", check.name()))?;
            let declared = i64::from(value) + adjust;
            if declared <= len as i64 {
                Ok(())
            } else {
                Err(format!(
                    "{}: declares {declared} bytes, candidate has {len}",
                    check.name()
                ))
            }
        }
        HardCheck::OffsetField {
            offset,
            width,
            big_endian,
        } => {
            let value = read_field(candidate, *offset, *width, *big_endian)
                .ok_or_else(|| format!("{}: field truncated", check.name()))?;
            if (value as usize) < len {
                Ok(())
            } else {
                Err(format!(
                    "{}: offset {value} outside {len}-byte candidate",
                    check.name()
                ))
            }
        }
        HardCheck::Magic { offset, bytes } => {
            let end = offset.saturating_add(bytes.len());
            if candidate.get(*offset..end) == Some(bytes.as_slice()) {
                Ok(())
            } else {
                Err(format!("{}: magic mismatch", check.name()))
            }
        }
    }
}

/// Unsigned integer of `width` bytes at `offset`, or `None` if truncated.
fn read_field(buf: &[u8], offset: usize, width: u8, big_endian: bool) -> Option<u32> {
    let width = usize::from(width);
    if !matches!(width, 1 | 2 | 4) {
        return None;
    }
    let raw = buf.get(offset..offset.checked_add(width)?)?;
    let mut value = 0u32;
    if big_endian {
        for &b in raw {
            value = (value << 8) | u32::from(b);
        }
    } else {
        for &b in raw.iter().rev() {
            value = (value << 8) | u32::from(b);
        }
    }
    Some(value)
}

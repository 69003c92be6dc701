use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroize;

/// A length-delimited chunk lifted out of the container by the upstream scanner.
///
/// The payload is shared and read-only: processing never mutates it, and
/// cloning a `Tag` to hand it to another worker is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub type_id: u16,
    /// Byte offset of the tag inside the (decompressed) container
    pub offset: u64,
    /// Marker variant already identified upstream, if any
    pub marker: Option<String>,
    raw_bytes: Arc<[u8]>,
}

impl Tag {
    pub fn new(type_id: u16, offset: u64, raw_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            type_id,
            offset,
            marker: None,
            raw_bytes: Arc::from(raw_bytes.into()),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    pub fn len(&self) -> usize {
        self.raw_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }
}

/// Key derivation phase, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Early,
    Mid,
    Late,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Early, Phase::Mid, Phase::Late];

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Early => Some(Phase::Mid),
            Phase::Mid => Some(Phase::Late),
            Phase::Late => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Early => "EARLY",
            Phase::Mid => "MID",
            Phase::Late => "LATE",
        };
        f.write_str(s)
    }
}

/// Raw key bytes. Zeroized on drop, redacted in `Debug`.
///
/// Serialized as `"hex:<digits>"`. When parsed from config, a string without
/// the `hex:` prefix is taken as UTF-8 text (`"Evony"` → `45 76 6F 6E 79`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl TryFrom<String> for KeyMaterial {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = match value.strip_prefix("hex:") {
            Some(digits) => hex::decode(digits.trim())
                .map_err(|e| format!("invalid hex key material '{digits}': {e}"))?,
            None => value.into_bytes(),
        };
        if bytes.is_empty() {
            return Err("key material must not be empty".into());
        }
        Ok(Self { bytes })
    }
}

impl From<KeyMaterial> for String {
    fn from(key: KeyMaterial) -> Self {
        format!("hex:{}", key.to_hex())
    }
}

impl From<&[u8]> for KeyMaterial {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

/// Position-dependent byte substitutions, selected per tag type in config.
///
/// `output[i] = f(input[i], key[i mod len], i)`; the formulas live in
/// `tagx-crypto`, this enum only names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubstitutionScheme {
    /// XOR with the key byte rotated left by `(i / 2) mod 8` bits
    RotatingXor,
    /// XOR with the key byte and `i * multiplier`
    PositionalXor { multiplier: u8 },
    /// XOR with `key + i * stride`
    KeyedStrideXor { stride: u8 },
    /// Subtract the key byte and `i * stride` (add on encode)
    Additive { stride: u8 },
}

/// One reversible transform that may be stacked on a tag payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerMethod {
    Xor,
    Rc4,
    Substitution(SubstitutionScheme),
    /// Ordered application of two or more primitives
    Composite,
}

impl LayerMethod {
    /// Relative decode cost used to order hypotheses cheapest-first.
    pub fn cost(&self) -> u32 {
        match self {
            LayerMethod::Xor => 1,
            LayerMethod::Substitution(_) => 2,
            LayerMethod::Rc4 => 3,
            LayerMethod::Composite => 4,
        }
    }
}

impl fmt::Display for LayerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerMethod::Xor => f.write_str("XOR"),
            LayerMethod::Rc4 => f.write_str("RC4"),
            LayerMethod::Substitution(scheme) => write!(f, "SUBSTITUTION({scheme:?})"),
            LayerMethod::Composite => f.write_str("COMPOSITE"),
        }
    }
}

/// One step of a decryption recipe as actually tried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub method: LayerMethod,
    pub key: KeyMaterial,
    pub layer_index: usize,
}

/// Byte-level statistics of one candidate buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub len: usize,
    /// Shannon entropy in bits per byte, in `[0, 8]`
    pub entropy: f64,
    /// Smallest period `1..=32` that holds for a majority of offsets
    pub repeating_pattern_length: Option<usize>,
    pub has_ascii_runs: bool,
    pub longest_ascii_run: usize,
    pub printable_ratio: f64,
    pub distinct_bytes: usize,
    #[serde(skip)]
    pub histogram: Vec<u32>,
}

/// Outcome of validating one candidate.
///
/// `valid` implies every hard check passed and `confidence >= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub confidence: f64,
    pub threshold: f64,
    pub hard_check_failures: Vec<String>,
    pub warnings: Vec<String>,
    pub details: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_material_parses_text_and_hex() {
        let text = KeyMaterial::try_from("Evony".to_string()).unwrap();
        assert_eq!(text.as_bytes(), b"Evony");

        let raw = KeyMaterial::try_from("hex:55aa".to_string()).unwrap();
        assert_eq!(raw.as_bytes(), &[0x55, 0xAA]);
    }

    #[test]
    fn key_material_rejects_empty_and_bad_hex() {
        assert!(KeyMaterial::try_from(String::new()).is_err());
        assert!(KeyMaterial::try_from("hex:".to_string()).is_err());
        assert!(KeyMaterial::try_from("hex:zz".to_string()).is_err());
    }

    #[test]
    fn key_material_serializes_as_hex() {
        let key = KeyMaterial::new(b"KEY".to_vec());
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"hex:4B4559\"");
        let back: KeyMaterial = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn key_material_debug_is_redacted() {
        let key = KeyMaterial::new(b"secret".to_vec());
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("len"));
    }

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::Early < Phase::Mid);
        assert!(Phase::Mid < Phase::Late);
        assert_eq!(Phase::Early.next(), Some(Phase::Mid));
        assert_eq!(Phase::Late.next(), None);
    }

    #[test]
    fn tag_clone_shares_payload() {
        let tag = Tag::new(233, 16, vec![1, 2, 3]).with_marker("header2");
        let copy = tag.clone();
        assert_eq!(copy.raw_bytes(), &[1, 2, 3]);
        assert_eq!(copy.marker.as_deref(), Some("header2"));
        assert_eq!(copy.len(), 3);
    }

    #[test]
    fn layer_method_cost_orders_xor_first() {
        let rotating = LayerMethod::Substitution(SubstitutionScheme::RotatingXor);
        assert!(LayerMethod::Xor.cost() < rotating.cost());
        assert!(rotating.cost() < LayerMethod::Rc4.cost());
    }
}

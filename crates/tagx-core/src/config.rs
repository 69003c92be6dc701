use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{TagxError, TagxResult};
use crate::types::{KeyMaterial, LayerMethod, SubstitutionScheme};

/// Hard upper bound on hypotheses per tag attempt. Configured limits are
/// clamped to this so every run terminates within a known number of decodes.
pub const MAX_HYPOTHESES: usize = 64;

/// Deepest layer stack the search will enumerate.
pub const MAX_LAYERS: usize = 3;

/// Layer slots one profile may declare.
pub const MAX_LAYER_SLOTS: usize = 16;

/// Candidate keys one layer slot may carry, header key included.
pub const MAX_SEEDS_PER_LAYER: usize = 64;

/// Top-level configuration (loaded from tagx.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagxConfig {
    pub search: SearchConfig,
    pub validation: ValidationConfig,
    pub history: HistoryConfig,
    pub log: LogConfig,
    pub profiles: Vec<TagProfile>,
}

impl Default for TagxConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            validation: ValidationConfig::default(),
            history: HistoryConfig::default(),
            log: LogConfig::default(),
            profiles: builtin_profiles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hypotheses enumerated per attempt (clamped to 64)
    pub max_hypotheses: usize,
    /// Optional cap on decoded candidates, for interactive latency
    pub attempt_budget: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_hypotheses: MAX_HYPOTHESES,
            attempt_budget: None,
        }
    }
}

impl SearchConfig {
    pub fn hypothesis_limit(&self) -> usize {
        self.max_hypotheses.clamp(1, MAX_HYPOTHESES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Confidence floor for tag types that declare no hard checks
    pub unchecked_floor: f64,
    /// Warn when entropy lands this close below `entropy_max`
    pub entropy_warn_margin: f64,
    /// Warn when confidence lands this close above the threshold
    pub confidence_warn_margin: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            unchecked_floor: 0.8,
            entropy_warn_margin: 0.25,
            confidence_warn_margin: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON-lines file backing the accepted-key log (in-memory when unset)
    pub path: Option<PathBuf>,
    /// Append accepted keys after each successful attempt
    pub record: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Everything the search knows about one tag type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagProfile {
    pub type_id: u16,
    pub name: String,
    pub markers: Vec<MarkerSpec>,
    pub layers: Vec<LayerSpec>,
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
    #[serde(default)]
    pub hard_checks: Vec<HardCheck>,
    #[serde(default)]
    pub soft: SoftThresholds,
}

fn default_max_layers() -> usize {
    1
}

/// Fixed header framing that identifies the applied scheme.
///
/// An empty `pattern` matches any payload at least `header_len` bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpec {
    pub name: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, with = "hex_bytes")]
    pub pattern: Vec<u8>,
    /// Leading bytes kept in plaintext and excluded from decoding
    #[serde(default)]
    pub header_len: usize,
    /// Fixed layer count implied by this marker
    #[serde(default)]
    pub layers: Option<usize>,
    /// Header byte holding the layer count
    #[serde(default)]
    pub layer_count_at: Option<usize>,
    /// Layer names in the order this marker usually implies
    #[serde(default)]
    pub prefer_order: Vec<String>,
}

/// A primitive this tag type may stack, with its candidate seed keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub method: LayerMethod,
    #[serde(default)]
    pub seeds: Vec<KeyMaterial>,
    /// Per-tag seed read from the raw tag header, tried before `seeds`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_key: Option<HeaderKey>,
}

impl LayerSpec {
    /// Seeds for one tag: the header key when present and readable, then
    /// the static seeds.
    pub fn seeds_for(&self, raw: &[u8]) -> Vec<KeyMaterial> {
        let mut seeds = Vec::with_capacity(self.seeds.len() + 1);
        if let Some(key) = self.header_key.as_ref().and_then(|h| h.read(raw)) {
            seeds.push(key);
        }
        seeds.extend(self.seeds.iter().cloned());
        seeds
    }
}

/// Integer key field embedded in the tag header.
///
/// The field is `width` bytes at `offset` of the raw tag. The key is its
/// `key_len` low-order bytes, least significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderKey {
    pub offset: usize,
    pub width: u8,
    #[serde(default)]
    pub big_endian: bool,
    #[serde(default = "default_key_len")]
    pub key_len: usize,
}

fn default_key_len() -> usize {
    1
}

impl HeaderKey {
    pub fn read(&self, raw: &[u8]) -> Option<KeyMaterial> {
        let width = usize::from(self.width);
        let field = raw.get(self.offset..self.offset.checked_add(width)?)?;
        let mut le = field.to_vec();
        if self.big_endian {
            le.reverse();
        }
        le.truncate(self.key_len);
        Some(KeyMaterial::new(le))
    }
}

/// Mandatory structural rule. A failure forces `valid = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum HardCheck {
    MinLength {
        bytes: usize,
    },
    /// Embedded size field: `value + adjust` must not exceed the buffer length
    LengthField {
        offset: usize,
        width: u8,
        #[serde(default)]
        big_endian: bool,
        #[serde(default)]
        adjust: i64,
    },
    /// Embedded offset: must point inside the buffer
    OffsetField {
        offset: usize,
        width: u8,
        #[serde(default)]
        big_endian: bool,
    },
    Magic {
        offset: usize,
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
    },
}

impl HardCheck {
    pub fn name(&self) -> String {
        match self {
            HardCheck::MinLength { bytes } => format!("min_length({bytes})"),
            HardCheck::LengthField { offset, width, .. } => {
                format!("length_field(@{offset}, u{})", u32::from(*width) * 8)
            }
            HardCheck::OffsetField { offset, width, .. } => {
                format!("offset_field(@{offset}, u{})", u32::from(*width) * 8)
            }
            HardCheck::Magic { offset, bytes } => {
                format!("magic(@{offset}, {})", hex::encode_upper(bytes))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftThresholds {
    pub entropy_max: f64,
    pub min_ascii_run: usize,
    pub min_printable_ratio: f64,
    pub min_confidence: f64,
    pub weights: SoftWeights,
}

impl Default for SoftThresholds {
    fn default() -> Self {
        Self {
            entropy_max: 7.0,
            min_ascii_run: 8,
            min_printable_ratio: 0.85,
            min_confidence: 0.75,
            weights: SoftWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftWeights {
    pub entropy: f64,
    pub no_repeat: f64,
    pub ascii_run: f64,
    pub printable: f64,
}

impl Default for SoftWeights {
    fn default() -> Self {
        Self {
            entropy: 0.2,
            no_repeat: 0.15,
            ascii_run: 0.3,
            printable: 0.35,
        }
    }
}

impl SoftWeights {
    pub fn total(&self) -> f64 {
        self.entropy + self.no_repeat + self.ascii_run + self.printable
    }
}

impl TagxConfig {
    pub fn from_toml_str(s: &str) -> TagxResult<Self> {
        let config: TagxConfig =
            toml::from_str(s).map_err(|e| TagxError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> TagxResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| TagxError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> TagxResult<String> {
        toml::to_string(self).map_err(|e| TagxError::Config(format!("serializing config: {e}")))
    }

    pub fn profile(&self, type_id: u16) -> Option<&TagProfile> {
        self.profiles.iter().find(|p| p.type_id == type_id)
    }

    /// Reject profiles the search could not run safely.
    pub fn validate(&self) -> TagxResult<()> {
        let mut seen = BTreeSet::new();
        for profile in &self.profiles {
            let ctx = |msg: String| {
                TagxError::Config(format!(
                    "profile {} ({}): {msg}",
                    profile.type_id, profile.name
                ))
            };
            if !seen.insert(profile.type_id) {
                return Err(ctx("duplicate type_id".into()));
            }
            if profile.markers.is_empty() {
                return Err(ctx("at least one marker is required".into()));
            }
            if profile.layers.is_empty() {
                return Err(ctx("at least one layer is required".into()));
            }
            if profile.max_layers == 0 || profile.max_layers > MAX_LAYERS {
                return Err(ctx(format!("max_layers must be 1..={MAX_LAYERS}")));
            }
            if profile.layers.len() > MAX_LAYER_SLOTS {
                return Err(ctx(format!("at most {MAX_LAYER_SLOTS} layers may be declared")));
            }
            for layer in &profile.layers {
                if layer.seeds.is_empty() && layer.header_key.is_none() {
                    return Err(ctx(format!("layer '{}' has no seeds", layer.name)));
                }
                if layer.seeds.len() + usize::from(layer.header_key.is_some())
                    > MAX_SEEDS_PER_LAYER
                {
                    return Err(ctx(format!(
                        "layer '{}': at most {MAX_SEEDS_PER_LAYER} seeds",
                        layer.name
                    )));
                }
                if let Some(h) = &layer.header_key {
                    if !matches!(h.width, 1 | 2 | 4)
                        || h.key_len == 0
                        || h.key_len > usize::from(h.width)
                    {
                        return Err(ctx(format!(
                            "layer '{}': header_key needs width 1, 2 or 4 and key_len 1..=width",
                            layer.name
                        )));
                    }
                }
                if layer.method == LayerMethod::Composite {
                    return Err(ctx(format!(
                        "layer '{}': composite is built by the search, not configured",
                        layer.name
                    )));
                }
            }
            for marker in &profile.markers {
                if let Some(n) = marker.layers {
                    if n == 0 || n > MAX_LAYERS {
                        return Err(ctx(format!(
                            "marker '{}': layers must be 1..={MAX_LAYERS}",
                            marker.name
                        )));
                    }
                }
                if let Some(at) = marker.layer_count_at {
                    if at >= marker.header_len {
                        return Err(ctx(format!(
                            "marker '{}': layer_count_at must fall inside the header",
                            marker.name
                        )));
                    }
                }
            }
            for check in &profile.hard_checks {
                if let HardCheck::LengthField { width, .. } | HardCheck::OffsetField { width, .. } =
                    check
                {
                    if !matches!(width, 1 | 2 | 4) {
                        return Err(ctx(format!("{}: width must be 1, 2 or 4", check.name())));
                    }
                }
            }
            let w = &profile.soft.weights;
            if [w.entropy, w.no_repeat, w.ascii_run, w.printable]
                .iter()
                .any(|v| *v < 0.0)
                || w.total() <= 0.0
            {
                return Err(ctx("soft weights must be non-negative with a positive sum".into()));
            }
            if !(0.0..=1.0).contains(&profile.soft.min_confidence) {
                return Err(ctx("min_confidence must be within [0, 1]".into()));
            }
        }
        Ok(())
    }
}

fn key(s: &str) -> KeyMaterial {
    KeyMaterial::new(s.as_bytes().to_vec())
}

fn raw(bytes: &[u8]) -> KeyMaterial {
    KeyMaterial::new(bytes.to_vec())
}

fn marker(name: &str, header_len: usize) -> MarkerSpec {
    MarkerSpec {
        name: name.into(),
        offset: 0,
        pattern: Vec::new(),
        header_len,
        layers: None,
        layer_count_at: None,
        prefer_order: Vec::new(),
    }
}

/// Profiles for the tag types observed in the wild. Every numeric threshold
/// here is a starting point to be recalibrated against labelled tags.
pub fn builtin_profiles() -> Vec<TagProfile> {
    vec![
        TagProfile {
            type_id: 233,
            name: "xor_family".into(),
            markers: vec![marker("header2", 2)],
            layers: vec![
                LayerSpec {
                    name: "xor".into(),
                    method: LayerMethod::Xor,
                    header_key: None,
                    seeds: vec![
                        raw(&[0x55]),
                        raw(&[0xAA]),
                        raw(&[0xFF]),
                        raw(&[0x33]),
                        raw(&[0xCC]),
                        raw(&[0x55, 0xAA]),
                        raw(&[0x55, 0xAA, 0x55]),
                    ],
                },
                LayerSpec {
                    name: "rotating".into(),
                    method: LayerMethod::Substitution(SubstitutionScheme::RotatingXor),
                    seeds: vec![raw(&[0x55])],
                    header_key: None,
                },
            ],
            max_layers: 1,
            hard_checks: Vec::new(),
            soft: SoftThresholds::default(),
        },
        TagProfile {
            type_id: 396,
            name: "rc4_stream".into(),
            markers: vec![MarkerSpec {
                prefer_order: vec!["rc4".into(), "positional".into()],
                ..marker("header3", 3)
            }],
            layers: vec![
                LayerSpec {
                    name: "rc4".into(),
                    method: LayerMethod::Rc4,
                    seeds: vec![key("Evony"), key("EvonyAge2"), key("E2"), key("age2")],
                    header_key: None,
                },
                LayerSpec {
                    name: "positional".into(),
                    method: LayerMethod::Substitution(SubstitutionScheme::PositionalXor {
                        multiplier: 0x33,
                    }),
                    seeds: vec![raw(&[0x00])],
                    header_key: None,
                },
            ],
            max_layers: 2,
            hard_checks: Vec::new(),
            soft: SoftThresholds::default(),
        },
        TagProfile {
            type_id: 449,
            name: "multi_layer".into(),
            markers: vec![MarkerSpec {
                layer_count_at: Some(0),
                prefer_order: vec!["rotating".into(), "rc4".into(), "positional".into()],
                ..marker("counted4", 4)
            }],
            layers: vec![
                LayerSpec {
                    name: "rotating".into(),
                    method: LayerMethod::Substitution(SubstitutionScheme::RotatingXor),
                    seeds: vec![raw(&[0x55])],
                    header_key: None,
                },
                LayerSpec {
                    name: "rc4".into(),
                    method: LayerMethod::Rc4,
                    seeds: vec![key("Evony")],
                    header_key: None,
                },
                LayerSpec {
                    name: "positional".into(),
                    method: LayerMethod::Substitution(SubstitutionScheme::PositionalXor {
                        multiplier: 0x55,
                    }),
                    seeds: vec![raw(&[0x00])],
                    header_key: None,
                },
            ],
            max_layers: 3,
            hard_checks: Vec::new(),
            soft: SoftThresholds::default(),
        },
        TagProfile {
            type_id: 82,
            name: "abc_strings".into(),
            markers: vec![MarkerSpec {
                pattern: vec![0xBF, 0x14],
                layers: Some(1),
                ..marker("abc_bf14", 6)
            }],
            layers: vec![LayerSpec {
                name: "stride_xor".into(),
                method: LayerMethod::Substitution(SubstitutionScheme::KeyedStrideXor {
                    stride: 0x55,
                }),
                // big-endian u32 after the marker; its low byte keys the stride
                seeds: Vec::new(),
                header_key: Some(HeaderKey {
                    offset: 2,
                    width: 4,
                    big_endian: true,
                    key_len: 1,
                }),
            }],
            max_layers: 1,
            hard_checks: Vec::new(),
            soft: SoftThresholds::default(),
        },
    ]
}

/// Hex (de)serialization for raw byte patterns in config files.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T: AsRef<[u8]>, S: Serializer>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode_upper(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(cleaned).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = TagxConfig::from_toml_str("").unwrap();

        assert_eq!(config.search.max_hypotheses, 64);
        assert!(config.search.attempt_budget.is_none());
        assert_eq!(config.log.level, "info");
        assert!(!config.history.record);
        assert_eq!(config.validation.unchecked_floor, 0.8);
        let ids: Vec<u16> = config.profiles.iter().map(|p| p.type_id).collect();
        assert_eq!(ids, vec![233, 396, 449, 82]);
        // built-ins rely on the unchecked floor
        assert!(config.profiles.iter().all(|p| p.hard_checks.is_empty()));
    }

    #[test]
    fn test_parse_full_profile() {
        let toml_str = r#"
[search]
max_hypotheses = 32
attempt_budget = 10

[history]
path = "/tmp/tagx-history.jsonl"
record = true

[log]
level = "debug"
format = "json"

[[profiles]]
type_id = 233
name = "custom_xor"
max_layers = 2

[[profiles.markers]]
name = "bare"

[[profiles.markers]]
name = "framed"
pattern = "BF 14"
header_len = 4
layer_count_at = 2
prefer_order = ["xor", "rc4"]

[[profiles.layers]]
name = "xor"
method = "xor"
seeds = ["KEY", "hex:55AA"]

[[profiles.layers]]
name = "rc4"
method = "rc4"
seeds = ["Evony"]

[[profiles.layers]]
name = "positional"
method = { substitution = { kind = "positional_xor", multiplier = 51 } }
seeds = ["hex:00"]

[[profiles.hard_checks]]
check = "length_field"
offset = 0
width = 4

[[profiles.hard_checks]]
check = "magic"
offset = 4
bytes = "5457"

[profiles.soft]
entropy_max = 6.5
min_ascii_run = 4
"#;
        let config = TagxConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.search.hypothesis_limit(), 32);
        assert_eq!(config.search.attempt_budget, Some(10));
        assert!(config.history.record);
        assert_eq!(config.log.format, "json");
        assert_eq!(config.profiles.len(), 1);

        let p = config.profile(233).unwrap();
        assert_eq!(p.max_layers, 2);
        assert_eq!(p.markers[0].pattern, Vec::<u8>::new());
        assert_eq!(p.markers[1].pattern, vec![0xBF, 0x14]);
        assert_eq!(p.markers[1].layer_count_at, Some(2));
        assert_eq!(p.layers[0].seeds[0].as_bytes(), b"KEY");
        assert_eq!(p.layers[0].seeds[1].as_bytes(), &[0x55, 0xAA]);
        assert_eq!(
            p.layers[2].method,
            LayerMethod::Substitution(SubstitutionScheme::PositionalXor { multiplier: 51 })
        );
        assert_eq!(
            p.hard_checks[0],
            HardCheck::LengthField {
                offset: 0,
                width: 4,
                big_endian: false,
                adjust: 0
            }
        );
        // Overridden
        assert_eq!(p.soft.entropy_max, 6.5);
        assert_eq!(p.soft.min_ascii_run, 4);
        // Defaults
        assert_eq!(p.soft.min_confidence, 0.75);
        assert_eq!(p.soft.weights, SoftWeights::default());
    }

    #[test]
    fn test_hypothesis_limit_is_clamped() {
        let config = TagxConfig::from_toml_str("[search]\nmax_hypotheses = 1000\n").unwrap();
        assert_eq!(config.search.hypothesis_limit(), MAX_HYPOTHESES);
    }

    #[test]
    fn test_rejects_duplicate_profiles() {
        let mut config = TagxConfig::default();
        let dup = config.profiles[0].clone();
        config.profiles.push(dup);
        assert!(matches!(config.validate(), Err(TagxError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_field_width() {
        let mut config = TagxConfig::default();
        config.profiles[0].hard_checks.push(HardCheck::LengthField {
            offset: 0,
            width: 3,
            big_endian: false,
            adjust: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_configured_composite() {
        let mut config = TagxConfig::default();
        config.profiles[0].layers[0].method = LayerMethod::Composite;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_header_key_reads_low_byte_of_field() {
        let key = HeaderKey {
            offset: 2,
            width: 4,
            big_endian: true,
            key_len: 1,
        };
        let raw = [0xBF, 0x14, 0x12, 0x34, 0x56, 0x78, 0x00];
        assert_eq!(key.read(&raw).unwrap().as_bytes(), &[0x78]);
        assert!(key.read(&raw[..5]).is_none());

        let wide = HeaderKey {
            key_len: 2,
            big_endian: false,
            ..key
        };
        assert_eq!(wide.read(&raw).unwrap().as_bytes(), &[0x12, 0x34]);
    }

    #[test]
    fn test_header_key_seed_comes_first() {
        let config = TagxConfig::default();
        let abc = config.profile(82).unwrap();
        let seeds = abc.layers[0].seeds_for(&[0xBF, 0x14, 0, 0, 0, 0x07, 0x41]);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].as_bytes(), &[0x07]);
        // header too short for the field: no seed at all
        assert!(abc.layers[0].seeds_for(&[0xBF, 0x14]).is_empty());
    }

    #[test]
    fn test_parse_header_key_layer() {
        let toml_str = r#"
[[profiles]]
type_id = 82
name = "abc"

[[profiles.markers]]
name = "bf14"
pattern = "BF14"
header_len = 6

[[profiles.layers]]
name = "stride"
method = { substitution = { kind = "keyed_stride_xor", stride = 85 } }
header_key = { offset = 2, width = 4, big_endian = true }
"#;
        let config = TagxConfig::from_toml_str(toml_str).unwrap();
        let layer = &config.profile(82).unwrap().layers[0];
        assert!(layer.seeds.is_empty());
        assert_eq!(layer.header_key.map(|h| h.key_len), Some(1));
    }

    #[test]
    fn test_rejects_bad_header_key() {
        let mut config = TagxConfig::default();
        if let Some(h) = config.profiles[3].layers[0].header_key.as_mut() {
            h.key_len = 5;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_search_space() {
        let mut config = TagxConfig::default();
        let slot = config.profiles[0].layers[0].clone();
        config.profiles[0].layers = vec![slot.clone(); MAX_LAYER_SLOTS + 1];
        assert!(config.validate().is_err());

        let mut config = TagxConfig::default();
        config.profiles[0].layers[0].seeds = vec![raw(&[0x55]); MAX_SEEDS_PER_LAYER + 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = TagxConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = TagxConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(config.profiles.len(), parsed.profiles.len());
        assert_eq!(config.profiles[1].layers, parsed.profiles[1].layers);
        assert_eq!(config.profiles[3].markers, parsed.profiles[3].markers);
        assert_eq!(config.profiles[3].layers, parsed.profiles[3].layers);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = TagxConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.profiles.len(), 4);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tagx.toml");
        std::fs::write(&path, "[log]\nlevel = \"trace\"\n").unwrap();
        let config = TagxConfig::load(&path).unwrap();
        assert_eq!(config.log.level, "trace");
    }
}

//! tagx-crypto: key derivation and the reversible layers stacked on tag payloads
//!
//! Key evolution across phases:
//! ```text
//! seed ──EARLY──▶ seed
//!      ──MID────▶ seed + offset_le[i mod 4]          (byte-wise, mod 256)
//!      ──LATE───▶ mid ^ BLAKE3(type ‖ accepted keys) (only once keys were accepted)
//! ```
//!
//! Layers: repeating-key XOR, RC4, table-driven position-dependent
//! substitution, and an ordered composite of two or more of them. Every
//! primitive has a matching `encode` so recipes can be round-tripped.

pub mod composite;
pub mod kdf;
pub mod keys;
pub mod layer;
pub mod rc4;
pub mod substitution;
pub mod xor;

pub use composite::{decode_recipe, encode_recipe, Composite};
pub use kdf::{accepted_digest, derive_key};
pub use keys::{KeyError, KeyState};
pub use layer::{codec_for, LayerCodec, LayerError};
pub use rc4::Rc4Codec;
pub use substitution::{ByteSubstitution, SubstitutionCodec};
pub use xor::XorCodec;

/// Longest repeating XOR key accepted
pub const MAX_XOR_KEY_LEN: usize = 32;

/// Longest RC4 key accepted (one KSA pass)
pub const MAX_RC4_KEY_LEN: usize = 256;

/// BLAKE3 digest length mixed into LATE-phase keys
pub const DIGEST_SIZE: usize = 32;

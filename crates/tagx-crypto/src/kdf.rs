//! Phase key derivation: seed → EARLY / MID / LATE keys

use tagx_core::{KeyMaterial, Phase};

use crate::keys::KeyError;
use crate::DIGEST_SIZE;

/// BLAKE3 derive-key context for the accepted-key digest. Changing it
/// changes every LATE key, so it is versioned.
const LATE_DIGEST_CONTEXT: &str = "tagx 2026-01 late-phase accepted-key digest";

/// Digest of every key previously accepted for `tag_type`, in log order.
///
/// Each key is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
/// Returns `None` when nothing has been accepted yet.
pub fn accepted_digest(tag_type: u16, accepted: &[KeyMaterial]) -> Option<[u8; DIGEST_SIZE]> {
    if accepted.is_empty() {
        return None;
    }
    let mut hasher = blake3::Hasher::new_derive_key(LATE_DIGEST_CONTEXT);
    hasher.update(&tag_type.to_le_bytes());
    for key in accepted {
        hasher.update(&(key.len() as u32).to_le_bytes());
        hasher.update(key.as_bytes());
    }
    Some(*hasher.finalize().as_bytes())
}

/// Derive the key for `phase` from the key the previous phase produced.
///
/// - EARLY returns `prior_key` unchanged (it is the static per-type seed).
/// - MID adds the low 32 bits of `offset`, little-endian, byte-wise mod 256.
/// - LATE XORs with [`accepted_digest`]; fails when `accepted` is empty.
///
/// Pure: the same arguments always produce the same key.
pub fn derive_key(
    tag_type: u16,
    offset: u64,
    phase: Phase,
    prior_key: &KeyMaterial,
    accepted: &[KeyMaterial],
) -> Result<KeyMaterial, KeyError> {
    let prior = prior_key.as_bytes();
    match phase {
        Phase::Early => Ok(prior_key.clone()),
        Phase::Mid => {
            let folded = (offset ^ (offset >> 32)) as u32;
            let mix = folded.to_le_bytes();
            let key: Vec<u8> = prior
                .iter()
                .enumerate()
                .map(|(i, b)| b.wrapping_add(mix[i % mix.len()]))
                .collect();
            Ok(KeyMaterial::new(key))
        }
        Phase::Late => {
            let digest =
                accepted_digest(tag_type, accepted).ok_or(KeyError::NoAcceptedKeys { tag_type })?;
            let key: Vec<u8> = prior
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ digest[i % DIGEST_SIZE])
                .collect();
            Ok(KeyMaterial::new(key))
        }
    }
}

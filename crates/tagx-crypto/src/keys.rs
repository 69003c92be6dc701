//! Per-run key state: one seed evolving EARLY → MID → LATE

use tagx_core::{KeyMaterial, Phase};
use thiserror::Error;

use crate::kdf::derive_key;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("LATE phase needs at least one accepted key for tag type {tag_type}")]
    NoAcceptedKeys { tag_type: u16 },

    #[error("key exhausted after {} phases", history.len())]
    KeyExhausted { history: Vec<KeyMaterial> },
}

/// Key evolution state for one seed within one tag attempt.
///
/// Owned by a single state-machine run and never shared. `evolution_counter`
/// strictly increases with each successful [`KeyState::evolve`], and a fresh
/// state is created for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub tag_type: u16,
    pub offset: u64,
    pub base_key: KeyMaterial,
    pub phase: Phase,
    pub evolution_counter: u32,
    /// Keys produced by earlier phases, oldest first
    pub history: Vec<KeyMaterial>,
    current: KeyMaterial,
}

impl KeyState {
    pub fn new(tag_type: u16, offset: u64, base_key: KeyMaterial) -> Self {
        Self {
            tag_type,
            offset,
            current: base_key.clone(),
            base_key,
            phase: Phase::Early,
            evolution_counter: 0,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> &KeyMaterial {
        &self.current
    }

    /// Advance one phase. Past LATE this returns `KeyExhausted` carrying every
    /// key the state produced, the current one included.
    pub fn evolve(&self, accepted: &[KeyMaterial]) -> Result<KeyState, KeyError> {
        let Some(next) = self.phase.next() else {
            let mut history = self.history.clone();
            history.push(self.current.clone());
            return Err(KeyError::KeyExhausted { history });
        };

        let key = derive_key(self.tag_type, self.offset, next, &self.current, accepted)?;
        let mut history = self.history.clone();
        history.push(self.current.clone());

        tracing::trace!(
            tag_type = self.tag_type,
            from = %self.phase,
            to = %next,
            counter = self.evolution_counter + 1,
            "key evolved"
        );

        Ok(KeyState {
            tag_type: self.tag_type,
            offset: self.offset,
            base_key: self.base_key.clone(),
            phase: next,
            evolution_counter: self.evolution_counter + 1,
            history,
            current: key,
        })
    }

    /// Evolve until `phase` is reached. Never moves backwards: asking for an
    /// earlier phase returns the state unchanged.
    pub fn advance_to(&self, phase: Phase, accepted: &[KeyMaterial]) -> Result<KeyState, KeyError> {
        let mut state = self.clone();
        while state.phase < phase {
            state = state.evolve(accepted)?;
        }
        Ok(state)
    }
}

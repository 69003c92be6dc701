//! The `LayerCodec` seam every primitive implements

use tagx_core::LayerMethod;
use thiserror::Error;

use crate::rc4::Rc4Codec;
use crate::substitution::SubstitutionCodec;
use crate::xor::XorCodec;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("{method} key length {len} out of range 1..={max}")]
    InvalidKeyLength {
        method: &'static str,
        len: usize,
        max: usize,
    },

    #[error("composite needs at least two layers, got {0}")]
    TooFewLayers(usize),

    #[error("recipe is empty")]
    EmptyRecipe,

    #[error("composite is not a primitive layer")]
    NotPrimitive,
}

/// A reversible byte transform keyed by raw key bytes.
///
/// `decode(encode(b, k), k) == b` for every supported key. Output length
/// always equals input length.
pub trait LayerCodec: Send + Sync {
    fn method(&self) -> LayerMethod;

    fn decode(&self, buf: &[u8], key: &[u8]) -> Result<Vec<u8>, LayerError>;

    fn encode(&self, buf: &[u8], key: &[u8]) -> Result<Vec<u8>, LayerError>;
}

/// Resolve the primitive codec for a layer method.
pub fn codec_for(method: LayerMethod) -> Result<Box<dyn LayerCodec>, LayerError> {
    match method {
        LayerMethod::Xor => Ok(Box::new(XorCodec)),
        LayerMethod::Rc4 => Ok(Box::new(Rc4Codec)),
        LayerMethod::Substitution(scheme) => Ok(Box::new(SubstitutionCodec::new(scheme))),
        LayerMethod::Composite => Err(LayerError::NotPrimitive),
    }
}

pub(crate) fn check_key_len(
    method: &'static str,
    key: &[u8],
    max: usize,
) -> Result<(), LayerError> {
    if key.is_empty() || key.len() > max {
        return Err(LayerError::InvalidKeyLength {
            method,
            len: key.len(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagx_core::SubstitutionScheme;

    #[test]
    fn codec_for_primitives() {
        for method in [
            LayerMethod::Xor,
            LayerMethod::Rc4,
            LayerMethod::Substitution(SubstitutionScheme::RotatingXor),
        ] {
            let codec = codec_for(method).unwrap();
            assert_eq!(codec.method(), method);
        }
    }

    #[test]
    fn composite_is_not_a_primitive() {
        assert_eq!(
            codec_for(LayerMethod::Composite).err(),
            Some(LayerError::NotPrimitive)
        );
    }
}

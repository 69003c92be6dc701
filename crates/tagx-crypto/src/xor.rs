//! Repeating-key XOR

use tagx_core::LayerMethod;

use crate::layer::{check_key_len, LayerCodec, LayerError};
use crate::MAX_XOR_KEY_LEN;

/// Cyclic XOR with a 1–32 byte key. Its own inverse.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorCodec;

impl XorCodec {
    fn apply(buf: &[u8], key: &[u8]) -> Result<Vec<u8>, LayerError> {
        check_key_len("XOR", key, MAX_XOR_KEY_LEN)?;
        Ok(buf
            .iter()
            .zip(key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect())
    }
}

impl LayerCodec for XorCodec {
    fn method(&self) -> LayerMethod {
        LayerMethod::Xor
    }

    fn decode(&self, buf: &[u8], key: &[u8]) -> Result<Vec<u8>, LayerError> {
        Self::apply(buf, key)
    }

    fn encode(&self, buf: &[u8], key: &[u8]) -> Result<Vec<u8>, LayerError> {
        Self::apply(buf, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_output() {
        let out = XorCodec.encode(b"TEST", b"KEY").unwrap();
        assert_eq!(out, vec![b'T' ^ b'K', b'E' ^ b'E', b'S' ^ b'Y', b'T' ^ b'K']);
    }

    #[test]
    fn rejects_bad_key_lengths() {
        assert!(XorCodec.decode(b"data", b"").is_err());
        assert!(XorCodec.decode(b"data", &[0u8; 33]).is_err());
        assert!(XorCodec.decode(b"data", &[0u8; 32]).is_ok());
    }

    #[test]
    fn empty_buffer_stays_empty() {
        assert!(XorCodec.decode(b"", b"K").unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=512),
            key in proptest::collection::vec(any::<u8>(), 1..=MAX_XOR_KEY_LEN),
        ) {
            let encoded = XorCodec.encode(&data, &key).unwrap();
            prop_assert_eq!(encoded.len(), data.len());
            prop_assert_eq!(XorCodec.decode(&encoded, &key).unwrap(), data);
        }
    }
}

//! RC4 stream layer (KSA + PRGA)
//!
//! Keys are variable length (1–256 bytes) and come straight from config or
//! key derivation, so the cipher state is built here rather than through a
//! fixed-key-size cipher type.

use tagx_core::LayerMethod;
use zeroize::Zeroize;

use crate::layer::{check_key_len, LayerCodec, LayerError};
use crate::MAX_RC4_KEY_LEN;

struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Key-scheduling algorithm. The caller guarantees `key` is non-empty.
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256usize {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Rc4 { s, i: 0, j: 0 }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        for b in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *b ^= self.s[idx as usize];
        }
    }
}

impl Drop for Rc4 {
    fn drop(&mut self) {
        self.s.zeroize();
    }
}

/// RC4 keystream XOR. Encryption and decryption are the same operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rc4Codec;

impl Rc4Codec {
    fn apply(buf: &[u8], key: &[u8]) -> Result<Vec<u8>, LayerError> {
        check_key_len("RC4", key, MAX_RC4_KEY_LEN)?;
        let mut out = buf.to_vec();
        Rc4::new(key).apply_keystream(&mut out);
        Ok(out)
    }
}

impl LayerCodec for Rc4Codec {
    fn method(&self) -> LayerMethod {
        LayerMethod::Rc4
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

    fn encrypt_hex(key: &[u8], plaintext: &[u8]) -> String {
        hex::encode_upper(Rc4Codec.encode(plaintext, key).unwrap())
    }

    #[test]
    fn known_answer_vectors() {
        assert_eq!(encrypt_hex(b"Key", b"Plaintext"), "BBF316E8D940AF0AD3");
        assert_eq!(encrypt_hex(b"Wiki", b"pedia"), "1021BF0420");
        assert_eq!(
            encrypt_hex(b"Secret", b"Attack at dawn"),
            "45A01F645FC35B383552544B9BF5"
        );
    }

    #[test]
    fn rfc6229_keystream_prefix() {
        // RFC 6229, 40-bit key 0x0102030405, keystream bytes 0..16
        let key = [0x01, 0x02, 0x03, 0x04, 0x05];
        let keystream = Rc4Codec.encode(&[0u8; 16], &key).unwrap();
        assert_eq!(
            hex::encode(keystream),
            "b2396305f03dc027ccc3524a0a1118a8"
        );
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(
            Rc4Codec.decode(b"abc", b""),
            Err(LayerError::InvalidKeyLength { .. })
        ));
    }

    proptest! {
        #[test]
        fn roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=512),
            key in proptest::collection::vec(any::<u8>(), 1..=MAX_RC4_KEY_LEN),
        ) {
            let encoded = Rc4Codec.encode(&data, &key).unwrap();
            prop_assert_eq!(Rc4Codec.decode(&encoded, &key).unwrap(), data);
        }
    }
}

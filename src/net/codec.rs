//! The payload envelope: a symmetric-cipher wrapper with a weak integrity check.
//!
//! Plaintext envelope layout before encryption:
//!
//! ```text
//! [16 random bytes][application bytes][16 magic bytes]
//! ```
//!
//! The envelope is PKCS#7 padded to an AES block boundary and encrypted with
//! AES-CBC using the first 16 bytes of the shared secret as *both* the key and
//! the IV. This is a known weakness (fixed IV, key reused as IV) inherited
//! bit-for-bit from the wire format this replaces — changing it would break
//! compatibility with any peer using the same secret, so it is preserved here
//! rather than "fixed".

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::Engine;
use rand::RngCore;

use super::error::CodecError;

/// The fixed 16-byte sentinel appended to every envelope before encryption.
pub const MAGIC: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

const RANDOM_PREFIX_LEN: usize = 16;

/// Wrap `plain` into a base64-encoded, AES-CBC-encrypted envelope keyed by `key`.
///
/// `key` must be 16, 24, or 32 bytes.
pub fn wrap(plain: &[u8], key: &[u8]) -> Result<String, CodecError> {
    let mut prefix = [0u8; RANDOM_PREFIX_LEN];
    rand::rng().fill_bytes(&mut prefix);

    let mut envelope = Vec::with_capacity(RANDOM_PREFIX_LEN + plain.len() + MAGIC.len());
    envelope.extend_from_slice(&prefix);
    envelope.extend_from_slice(plain);
    envelope.extend_from_slice(&MAGIC);

    let iv = key_iv(key)?;
    let cipher = encrypt_cbc(key, &iv, &envelope)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(cipher))
}

/// Unwrap a base64-encoded envelope produced by [`wrap`], verifying the magic tail.
pub fn unwrap(cipher_b64: &str, key: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cipher = base64::engine::general_purpose::STANDARD
        .decode(cipher_b64)
        .map_err(|_| CodecError::BadBase64)?;

    let iv = key_iv(key)?;
    let envelope = decrypt_cbc(key, &iv, &cipher)?;

    if envelope.len() < RANDOM_PREFIX_LEN + MAGIC.len() {
        return Err(CodecError::BadEnvelope);
    }

    let tail = &envelope[envelope.len() - MAGIC.len()..];
    if tail != MAGIC {
        return Err(CodecError::BadEnvelope);
    }

    Ok(envelope[RANDOM_PREFIX_LEN..envelope.len() - MAGIC.len()].to_vec())
}

/// The first 16 bytes of `key`, reused as the CBC IV per the wire format.
fn key_iv(key: &[u8]) -> Result<[u8; 16], CodecError> {
    if ![16, 24, 32].contains(&key.len()) {
        return Err(CodecError::InvalidKeyLength(key.len()));
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&key[..16]);
    Ok(iv)
}

fn encrypt_cbc(key: &[u8], iv: &[u8; 16], plain: &[u8]) -> Result<Vec<u8>, CodecError> {
    match key.len() {
        16 => Ok(cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain)),
        24 => Ok(cbc::Encryptor::<Aes192>::new(key.into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain)),
        32 => Ok(cbc::Encryptor::<Aes256>::new(key.into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain)),
        n => Err(CodecError::InvalidKeyLength(n)),
    }
}

fn decrypt_cbc(key: &[u8], iv: &[u8; 16], cipher: &[u8]) -> Result<Vec<u8>, CodecError> {
    let result = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new(key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(cipher),
        24 => cbc::Decryptor::<Aes192>::new(key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(cipher),
        32 => cbc::Decryptor::<Aes256>::new(key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(cipher),
        n => return Err(CodecError::InvalidKeyLength(n)),
    };
    result.map_err(|_| CodecError::BadPadding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_all_key_sizes() {
        for key_len in [16usize, 24, 32] {
            let key: Vec<u8> = (0..key_len as u8).collect();
            let plain = b"the quick brown fox jumps over the lazy dog";
            let cipher = wrap(plain, &key).unwrap();
            let decoded = unwrap(&cipher, &key).unwrap();
            assert_eq!(decoded, plain);
        }
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = b"0123456789ABCDEF";
        let cipher = wrap(b"", key).unwrap();
        assert_eq!(unwrap(&cipher, key).unwrap(), b"");
    }

    #[test]
    fn wrong_key_fails_with_bad_envelope() {
        let key = b"0123456789ABCDEF";
        let wrong = b"FEDCBA9876543210";
        let cipher = wrap(b"secret message", key).unwrap();
        let err = unwrap(&cipher, wrong).unwrap_err();
        assert_eq!(err, CodecError::BadEnvelope);
    }

    #[test]
    fn rejects_invalid_key_length() {
        let bad_key = b"too-short";
        assert_eq!(
            wrap(b"x", bad_key).unwrap_err(),
            CodecError::InvalidKeyLength(bad_key.len())
        );
    }

    #[test]
    fn envelope_prefix_is_randomized() {
        let key = b"0123456789ABCDEF";
        let a = wrap(b"same plaintext", key).unwrap();
        let b = wrap(b"same plaintext", key).unwrap();
        assert_ne!(a, b, "random prefix should make repeated wraps differ");
    }
}

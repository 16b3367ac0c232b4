//! Crypto primitives used by the authenticator and secure exchanger:
//! AES-128-CBC, HMAC-SHA-256, a CSPRNG, and constant-time comparison.
//!
//! These are "external collaborators" per the protocol spec — the spec
//! treats the algorithms as black boxes — but a runnable crate needs real
//! implementations behind them. `aes`+`cbc` and `hmac`+`sha2` are the
//! RustCrypto crates the retrieved M-Bus serial-protocol crate
//! (`jfabienke-mbuscrate`) depends on for the same encrypt-then-authenticate
//! shape; `subtle` for constant-time comparison matches the retrieved STUN
//! implementation's own message-integrity check.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{SscpError, SscpResult};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// The default 16-byte long-term transport key, used when the caller
/// provides none to `Authenticator::authenticate`.
pub const DEFAULT_TRANSPORT_KEY: [u8; 16] = [
    0xE7, 0x4A, 0x54, 0x0F, 0xA0, 0x7C, 0x4D, 0xB1, 0xB4, 0x64, 0x21, 0x12, 0x6D, 0xF7, 0xAD, 0x36,
];

/// AES-128-CBC-encrypts `plaintext` (already padded to a 16-byte multiple)
/// under `key`/`iv`, with no additional padding applied.
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> SscpResult<Vec<u8>> {
    if plaintext.is_empty() || plaintext.len() % 16 != 0 {
        return Err(SscpError::Internal("aes-cbc plaintext must be a nonzero multiple of 16"));
    }
    let enc = Aes128CbcEnc::new(key.into(), iv.into());
    Ok(enc.encrypt_padded_vec_mut::<NoPadding>(plaintext))
}

/// AES-128-CBC-decrypts `ciphertext` under `key`/`iv`, with no padding
/// removal: the caller strips protocol-level padding itself.
pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> SscpResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(SscpError::WrongResponseLength);
    }
    let dec = Aes128CbcDec::new(key.into(), iv.into());
    dec.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map(|s| s.to_vec())
        .map_err(|_| SscpError::Internal("aes-cbc decrypt failed"))
}

/// HMAC-SHA-256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8; 16], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("16-byte key is valid for HMAC-SHA-256");
    mac.update(data);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Constant-time HMAC verification: recomputes the tag and compares without
/// short-circuiting, to avoid a timing oracle on the comparison.
pub fn hmac_verify(key: &[u8; 16], data: &[u8], tag: &[u8]) -> bool {
    if tag.len() != 32 {
        return false;
    }
    let computed = hmac_sha256(key, data);
    bool::from(computed.ct_eq(tag))
}

/// Byte-slice constant-time equality, used wherever a mismatch must not
/// leak timing information (HMAC tags, anywhere else secret bytes are
/// compared).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

/// Draws `N` random bytes from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// The four 16-byte session keys derived from the long-term key and the
/// two handshake nonces.
#[derive(Clone, Copy)]
pub struct SessionKeys {
    pub k_cipher_ab: [u8; 16],
    pub k_cipher_ba: [u8; 16],
    pub k_sign_ab: [u8; 16],
    pub k_sign_ba: [u8; 16],
}

/// Deterministically derives the four session keys from `(k, rnd_a,
/// rnd_b)`. The wire protocol treats this derivation as a black box that a
/// real implementation must reproduce bit-exactly to interoperate with the
/// reference reader; since no vector for the derived keys themselves is
/// specified (only the handshake messages that surround it), this crate
/// defines the transform as HMAC-SHA-256 keyed by `k`, over `rnd_a‖rnd_b`,
/// with a one-byte domain-separation label per output key — an
/// HKDF-expand-like construction using primitives already in this module.
/// Re-deriving from the same three inputs always yields the same four keys
/// (the law required by the testable-properties section).
pub fn derive_session_keys(k: &[u8; 16], rnd_a: &[u8; 16], rnd_b: &[u8; 16]) -> SessionKeys {
    let mut material = Vec::with_capacity(32);
    material.extend_from_slice(rnd_a);
    material.extend_from_slice(rnd_b);

    let derive_one = |label: u8| -> [u8; 16] {
        let mut input = material.clone();
        input.push(label);
        let full = hmac_sha256(k, &input);
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        out
    };

    SessionKeys {
        k_cipher_ab: derive_one(0x01),
        k_cipher_ba: derive_one(0x02),
        k_sign_ab: derive_one(0x03),
        k_sign_ba: derive_one(0x04),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_cbc_round_trips() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let plaintext = [0xABu8; 32];
        let ciphertext = aes_cbc_encrypt(&key, &iv, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), 32);
        let decrypted = aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn hmac_verify_rejects_bit_flips() {
        let key = [0x01u8; 16];
        let data = b"some protocol bytes";
        let tag = hmac_sha256(&key, data);
        assert!(hmac_verify(&key, data, &tag));

        for bit in 0..32usize * 8 {
            let mut flipped = tag;
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert!(!hmac_verify(&key, data, &flipped), "bit {bit} flip not rejected");
        }
    }

    #[test]
    fn derive_session_keys_is_deterministic() {
        let k = DEFAULT_TRANSPORT_KEY;
        let rnd_a = [0x01u8; 16];
        let rnd_b = [0x02u8; 16];
        let first = derive_session_keys(&k, &rnd_a, &rnd_b);
        let second = derive_session_keys(&k, &rnd_a, &rnd_b);
        assert_eq!(first.k_cipher_ab, second.k_cipher_ab);
        assert_eq!(first.k_cipher_ba, second.k_cipher_ba);
        assert_eq!(first.k_sign_ab, second.k_sign_ab);
        assert_eq!(first.k_sign_ba, second.k_sign_ba);
    }

    #[test]
    fn derived_keys_are_pairwise_distinct() {
        let keys = derive_session_keys(&DEFAULT_TRANSPORT_KEY, &[1u8; 16], &[2u8; 16]);
        let all = [keys.k_cipher_ab, keys.k_cipher_ba, keys.k_sign_ab, keys.k_sign_ba];
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }
}

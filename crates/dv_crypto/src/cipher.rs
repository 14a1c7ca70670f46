//! Envelope encryption for journal fields.
//!
//! Key derivation: PBKDF2-HMAC-SHA256, 10 000 iterations, 32-byte output.
//! Cipher: AES-256-CBC with PKCS#7 padding and a fresh random 16-byte IV
//! per call.
//!
//! Envelope wire format (one encrypted field = one envelope):
//!   `<hex-iv>:<base64-ciphertext>`
//!
//! The IV is not secret and travels in the clear next to the ciphertext so
//! decryption is self-contained. There is no authentication tag; a wrong
//! key is detected through PKCS#7 unpadding, UTF-8 validation and an
//! empty-output check, and always surfaces as [`CryptoError::Decryption`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// PBKDF2 round count. Slow on purpose — brute-forcing the passphrase has
/// to cost something.
const PBKDF2_ROUNDS: u32 = 10_000;

const IV_LEN: usize = 16;
const SALT_LEN: usize = 32;

/// Hex-encoded 256-bit key derived from a passphrase. Zeroized on drop.
///
/// The passphrase itself is never persisted anywhere; losing it makes all
/// existing ciphertext permanently unrecoverable.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey(String);

impl DerivedKey {
    /// The key string to pass to [`encrypt`] / [`decrypt`].
    pub fn expose(&self) -> &str {
        &self.0
    }
}

/// Derive the per-user encryption key from a passphrase + stored salt.
///
/// Deterministic: the same passphrase and salt always yield the same key,
/// which is how the key is recreated each session without ever storing it.
pub fn derive_key(passphrase: &str, salt: &str) -> Result<DerivedKey, CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput("passphrase must not be empty"));
    }
    if salt.is_empty() {
        return Err(CryptoError::InvalidInput("salt must not be empty"));
    }

    let mut output = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ROUNDS,
        &mut output,
    );
    Ok(DerivedKey(hex::encode(output)))
}

/// Generate a fresh random 256-bit salt, hex-encoded (printable).
/// Call once per user at first key initialization; store next to the user,
/// not next to the key (there is no stored key).
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Generate a random passphrase from a printable charset.
pub fn generate_passphrase(length: usize) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::rngs::OsRng;
    (0..length)
        .map(|_| {
            let idx = (rng.next_u32() as usize) % CHARSET.len();
            CHARSET[idx] as char
        })
        .collect()
}

/// Encrypt `plaintext` into an `iv:ciphertext` envelope.
///
/// A fresh IV is drawn per call, so encrypting the same plaintext twice
/// with the same key yields different envelopes.
pub fn encrypt(plaintext: &str, key: &str) -> Result<String, CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::InvalidInput("plaintext must not be empty"));
    }
    if key.is_empty() {
        return Err(CryptoError::InvalidInput("key must not be empty"));
    }

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&cipher_key(key).into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!("{}:{}", hex::encode(iv), BASE64.encode(ciphertext)))
}

/// Decrypt an `iv:ciphertext` envelope.
///
/// Pure function of its inputs. Envelope shape problems surface as
/// [`CryptoError::MalformedEnvelope`]; cipher failures (wrong key,
/// corrupted ciphertext) as [`CryptoError::Decryption`].
pub fn decrypt(envelope: &str, key: &str) -> Result<String, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::InvalidInput("key must not be empty"));
    }

    let (iv_part, ct_part) = parse_envelope(envelope)?;

    let mut iv = [0u8; IV_LEN];
    hex::decode_to_slice(iv_part, &mut iv).map_err(|_| CryptoError::MalformedEnvelope)?;
    let ciphertext = BASE64
        .decode(ct_part)
        .map_err(|_| CryptoError::MalformedEnvelope)?;

    let plaintext = Aes256CbcDec::new(&cipher_key(key).into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    let plaintext = String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)?;
    if plaintext.is_empty() {
        // Treated as "wrong key": valid padding cannot produce an empty
        // message from a non-empty plaintext.
        return Err(CryptoError::Decryption);
    }
    Ok(plaintext)
}

/// Encrypt any JSON-serializable value as a single envelope.
pub fn encrypt_object<T: Serialize>(value: &T, key: &str) -> Result<String, CryptoError> {
    let json = serde_json::to_string(value)?;
    encrypt(&json, key)
}

/// Decrypt and deserialize a value produced by [`encrypt_object`].
pub fn decrypt_object<T: DeserializeOwned>(envelope: &str, key: &str) -> Result<T, CryptoError> {
    let json = decrypt(envelope, key)?;
    Ok(serde_json::from_str(&json)?)
}

/// One-way SHA-256 digest, hex-encoded. Integrity checks only — this is
/// not an authentication tag for ciphertext.
pub fn hash(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Check `data` against a digest produced by [`hash`].
pub fn verify_hash(data: &str, digest: &str) -> bool {
    hash(data) == digest
}

/// Split an envelope into its IV and ciphertext parts.
/// Exactly one `:` separator, both parts non-empty, IV is 32 hex chars.
fn parse_envelope(envelope: &str) -> Result<(&str, &str), CryptoError> {
    let mut parts = envelope.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(iv), Some(ct), None) if iv.len() == IV_LEN * 2 && !ct.is_empty() => Ok((iv, ct)),
        _ => Err(CryptoError::MalformedEnvelope),
    }
}

/// Widen an arbitrary non-empty key string to the 256-bit cipher key.
/// Production callers pass the PBKDF2 hex key from [`derive_key`]; any
/// non-empty string works, which keeps keys opaque to the rest of the app.
fn cipher_key(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

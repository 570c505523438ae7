//! AES-256-GCM field encryption for data at rest.
//!
//! Sensitive fields (email bodies, classification reasoning, audit details)
//! are stored in the format:
//! `ENC[AES256-GCM,key:<id>,data:<b64>,iv:<b64>,tag:<b64>]`
//!
//! Each envelope carries the id of the key that produced it, so keys can be
//! rotated: new writes use the active key while reads still decrypt values
//! produced under retired keys. Decrypted values are returned as
//! [`SecretString`] to prevent accidental logging. The [`MasterKey`] wrapper
//! zeroizes key material on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use regex::Regex;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

// Re-export for consumers so they don't need a direct `secrecy` dependency.
pub use secrecy::{ExposeSecret, SecretString};

/// Compiled regex for parsing
/// `ENC[AES256-GCM,key:<id>,data:<b64>,iv:<b64>,tag:<b64>]`.
static ENC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^ENC\[AES256-GCM,key:([A-Za-z0-9_-]+),data:([A-Za-z0-9+/=]*),iv:([A-Za-z0-9+/=]+),tag:([A-Za-z0-9+/=]+)\]$",
    )
    .expect("ENC regex is valid")
});

/// A 32-byte AES-256 key that is zeroized when dropped.
///
/// The [`Debug`] implementation is redacted to avoid accidental logging.
/// Raw bytes are not accessible outside this crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Errors that can occur during encryption/decryption operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The provided key is not valid (wrong length or encoding).
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// The encrypted value format is malformed.
    #[error("invalid encrypted value: {0}")]
    InvalidFormat(String),

    /// No key with the id recorded in the envelope is available.
    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    /// Decryption failed — wrong key or corrupted data.
    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Parse a 32-byte key from hex or base64.
///
/// Accepts either 64 hex characters or a base64 string that decodes to
/// exactly 32 bytes. The returned [`MasterKey`] is zeroized on drop.
pub fn parse_master_key(raw: &str) -> Result<MasterKey, CryptoError> {
    let trimmed = raw.trim();
    if trimmed.len() == 64
        && let Ok(bytes) = hex::decode(trimmed)
        && bytes.len() == 32
    {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        return Ok(MasterKey(key));
    }
    if let Ok(bytes) = B64.decode(trimmed)
        && bytes.len() == 32
    {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        return Ok(MasterKey(key));
    }
    Err(CryptoError::InvalidKey(
        "must be 32 bytes encoded as 64 hex chars or base64".to_owned(),
    ))
}

/// Returns `true` if `value` looks like an `ENC[AES256-GCM,...]` envelope.
#[must_use]
pub fn is_encrypted(value: &str) -> bool {
    ENC_RE.is_match(value.trim())
}

/// Encrypts and decrypts sensitive fields with key-rotation support.
///
/// Holds one active key used for all new writes plus any number of retired
/// keys addressed by id. `decrypt` selects the key named in the envelope, so
/// data written under a retired key stays readable until it is re-encrypted.
/// Plaintext (non-`ENC[...]`) inputs pass through `decrypt` unchanged for
/// compatibility with data written before encryption was enabled.
pub struct FieldCipher {
    active_id: String,
    keys: HashMap<String, MasterKey>,
}

impl FieldCipher {
    /// Create a cipher with a single active key.
    #[must_use]
    pub fn new(active_id: impl Into<String>, key: MasterKey) -> Self {
        let active_id = active_id.into();
        let mut keys = HashMap::new();
        keys.insert(active_id.clone(), key);
        Self { active_id, keys }
    }

    /// Register a retired key that decrypts existing data but is never used
    /// for new writes.
    #[must_use]
    pub fn with_retired_key(mut self, id: impl Into<String>, key: MasterKey) -> Self {
        self.keys.insert(id.into(), key);
        self
    }

    /// The id stamped into envelopes produced by [`encrypt`](Self::encrypt).
    #[must_use]
    pub fn active_key_id(&self) -> &str {
        &self.active_id
    }

    /// Encrypt a plaintext string under the active key.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let key = self
            .keys
            .get(&self.active_id)
            .ok_or_else(|| CryptoError::UnknownKeyId(self.active_id.clone()))?;

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid AES key: {e}")))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // AES-GCM output = ciphertext_data || 16-byte tag
        let (data, tag) = ciphertext.split_at(ciphertext.len() - 16);

        Ok(format!(
            "ENC[AES256-GCM,key:{},data:{},iv:{},tag:{}]",
            self.active_id,
            B64.encode(data),
            B64.encode(nonce.as_slice()),
            B64.encode(tag),
        ))
    }

    /// Decrypt an `ENC[...]` envelope using the key named inside it.
    ///
    /// Non-encrypted inputs pass through unchanged.
    pub fn decrypt(&self, value: &str) -> Result<SecretString, CryptoError> {
        let trimmed = value.trim();

        let Some(caps) = ENC_RE.captures(trimmed) else {
            // Not an ENC[...] envelope — pass through unchanged.
            return Ok(SecretString::new(value.to_owned()));
        };

        let key_id = &caps[1];
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::UnknownKeyId(key_id.to_owned()))?;

        let data = B64
            .decode(&caps[2])
            .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 in data: {e}")))?;
        let iv = B64
            .decode(&caps[3])
            .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 in iv: {e}")))?;
        let tag = B64
            .decode(&caps[4])
            .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 in tag: {e}")))?;

        if iv.len() != 12 {
            return Err(CryptoError::InvalidFormat(format!(
                "IV must be 12 bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != 16 {
            return Err(CryptoError::InvalidFormat(format!(
                "tag must be 16 bytes, got {}",
                tag.len()
            )));
        }

        // AES-GCM ciphertext = data || tag
        let mut ciphertext = data;
        ciphertext.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid AES key: {e}")))?;
        let nonce = Nonce::from_slice(&iv);

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let s = String::from_utf8(plaintext).map_err(|e| {
            CryptoError::InvalidFormat(format!("decrypted value is not UTF-8: {e}"))
        })?;

        Ok(SecretString::new(s))
    }

    /// Decrypt straight to an owned `String`.
    pub fn decrypt_to_string(&self, value: &str) -> Result<String, CryptoError> {
        Ok(self.decrypt(value)?.expose_secret().clone())
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher")
            .field("active_id", &self.active_id)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> MasterKey {
        parse_master_key(&hex::encode([byte; 32])).unwrap()
    }

    fn cipher() -> FieldCipher {
        FieldCipher::new("k1", key(0x42))
    }

    #[test]
    fn roundtrip() {
        let c = cipher();
        let encrypted = c.encrypt("I forgot my password, please help.").unwrap();
        assert!(encrypted.starts_with("ENC[AES256-GCM,key:k1,"));
        let decrypted = c.decrypt(&encrypted).unwrap();
        assert_eq!(
            decrypted.expose_secret(),
            "I forgot my password, please help."
        );
    }

    #[test]
    fn roundtrip_empty_string() {
        let c = cipher();
        let encrypted = c.encrypt("").unwrap();
        assert_eq!(c.decrypt_to_string(&encrypted).unwrap(), "");
    }

    #[test]
    fn plaintext_passes_through() {
        let c = cipher();
        let result = c.decrypt("not-encrypted").unwrap();
        assert_eq!(result.expose_secret(), "not-encrypted");
    }

    #[test]
    fn rotation_keeps_old_data_readable() {
        let old = FieldCipher::new("k1", key(0x42));
        let encrypted_under_old = old.encrypt("legacy body").unwrap();

        // Rotate: k2 becomes active, k1 is retired.
        let rotated = FieldCipher::new("k2", key(0x77)).with_retired_key("k1", key(0x42));

        let decrypted = rotated.decrypt(&encrypted_under_old).unwrap();
        assert_eq!(decrypted.expose_secret(), "legacy body");

        // New writes carry the new id.
        let fresh = rotated.encrypt("new body").unwrap();
        assert!(fresh.starts_with("ENC[AES256-GCM,key:k2,"));
    }

    #[test]
    fn unknown_key_id_is_an_error() {
        let writer = FieldCipher::new("k9", key(0x11));
        let encrypted = writer.encrypt("secret").unwrap();

        let reader = cipher();
        assert!(matches!(
            reader.decrypt(&encrypted),
            Err(CryptoError::UnknownKeyId(_))
        ));
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let writer = FieldCipher::new("k1", key(0x42));
        let encrypted = writer.encrypt("secret").unwrap();

        let reader = FieldCipher::new("k1", key(0x43));
        assert!(matches!(
            reader.decrypt(&encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn bad_iv_length_is_invalid_format() {
        let c = cipher();
        let bad = "ENC[AES256-GCM,key:k1,data:AAAA,iv:AAAA,tag:AAAAAAAAAAAAAAAAAAAAAA==]";
        assert!(matches!(
            c.decrypt(bad),
            Err(CryptoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn malformed_envelope_passes_through() {
        let c = cipher();
        // Looks like ENC but doesn't match the format — treated as plain.
        let malformed = "ENC[AES256-GCM,garbage]";
        let result = c.decrypt(malformed).unwrap();
        assert_eq!(result.expose_secret(), malformed);
    }

    #[test]
    fn parse_hex_and_base64_keys() {
        let hex_key = "aa".repeat(32);
        parse_master_key(&hex_key).unwrap();

        let b64 = B64.encode([0xbbu8; 32]);
        parse_master_key(&b64).unwrap();

        assert!(parse_master_key("too-short").is_err());
    }

    #[test]
    fn is_encrypted_detects_envelope() {
        let c = cipher();
        let encrypted = c.encrypt("x").unwrap();
        assert!(is_encrypted(&encrypted));
        assert!(!is_encrypted("plain"));
        assert!(!is_encrypted("ENC[AES256-GCM,incomplete"));
    }

    #[test]
    fn debug_is_redacted() {
        let c = cipher();
        let debug = format!("{c:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("42"));

        let k = key(0x42);
        assert_eq!(format!("{k:?}"), "MasterKey([REDACTED])");
    }
}

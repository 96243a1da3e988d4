use crate::config::AppConfig;
use crate::errors::CryptoError;
use crate::models::IntegrationConfig;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_HEX_LEN: usize = 64;

/// AES-256-GCM cipher for integration configs at rest.
///
/// Stored form is `base64(nonce[12] || tag[16] || ciphertext)`.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn from_config(config: &AppConfig) -> Result<Self, CryptoError> {
        let key_hex = config.encryption_key.as_deref().ok_or_else(|| {
            CryptoError::KeyConfiguration("INTEGRATION_ENCRYPTION_KEY is not set".to_string())
        })?;
        Self::from_hex(key_hex)
    }

    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let key_hex = key_hex.trim();
        if key_hex.len() != KEY_HEX_LEN {
            return Err(CryptoError::KeyConfiguration(format!(
                "key must be {} hex chars (32 bytes), got {}",
                KEY_HEX_LEN,
                key_hex.len()
            )));
        }
        let key = hex::decode(key_hex)
            .map_err(|error| CryptoError::KeyConfiguration(format!("key is not valid hex: {}", error)))?;
        Self::from_key(&key)
    }

    pub fn from_key(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|error| CryptoError::KeyConfiguration(error.to_string()))?;
        Ok(Self { cipher })
    }

    /// Random 32-byte key rendered as hex, suitable for `INTEGRATION_ENCRYPTION_KEY`.
    pub fn generate_key_hex() -> String {
        let key: [u8; 32] = rand::random();
        hex::encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|error| CryptoError::Encryption(error.to_string()))?;

        // aes-gcm appends the tag; the stored layout puts it before the body.
        let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut packed = Vec::with_capacity(NONCE_LEN + TAG_LEN + body.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(tag);
        packed.extend_from_slice(body);
        Ok(base64::engine::general_purpose::STANDARD.encode(packed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let packed = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|error| CryptoError::Malformed(error.to_string()))?;
        if packed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Malformed(format!(
                "expected at least {} bytes, got {}",
                NONCE_LEN + TAG_LEN,
                packed.len()
            )));
        }

        let (nonce_bytes, rest) = packed.split_at(NONCE_LEN);
        let (tag, body) = rest.split_at(TAG_LEN);
        let mut sealed = Vec::with_capacity(body.len() + TAG_LEN);
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed.as_slice())
            .map_err(|_| CryptoError::Authentication)?;
        String::from_utf8(plaintext).map_err(|error| CryptoError::Malformed(error.to_string()))
    }

    pub fn encrypt_config(&self, config: &IntegrationConfig) -> Result<String, CryptoError> {
        let json = serde_json::to_string(config)
            .map_err(|error| CryptoError::Encryption(error.to_string()))?;
        self.encrypt(&json)
    }

    /// Empty ciphertext decodes to an empty config.
    pub fn decrypt_config(&self, encoded: &str) -> Result<IntegrationConfig, CryptoError> {
        if encoded.trim().is_empty() {
            return Ok(IntegrationConfig::new());
        }
        let json = self.decrypt(encoded)?;
        let value: serde_json::Value = serde_json::from_str(&json)
            .map_err(|error| CryptoError::Malformed(error.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| CryptoError::Malformed("config is not a JSON object".to_string()))?;

        // Older rows may carry numbers or booleans; keep them as strings.
        Ok(object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(text) => text.clone(),
                    serde_json::Value::Null => return None,
                    other => other.to_string(),
                };
                Some((key.clone(), text))
            })
            .collect())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("VALIDATION_FAILED: {0}")]
    Validation(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CRYPTO_FAILURE: {0}")]
    Crypto(#[from] CryptoError),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Failures of the credential cipher. `Authentication` covers both tampered
/// ciphertext and a key that differs from the one used to encrypt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("encryption key misconfigured: {0}")]
    KeyConfiguration(String),
    #[error("ciphertext failed authentication")]
    Authentication,
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Error returned by a single provider attempt. Never fatal to a sync run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Configuration(String),
    #[error("{service} API {status}: {body}")]
    ExternalApi {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Internal(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Transport(format!("request timed out: {}", value));
        }
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        Self::Transport(value.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::{AppError, CryptoError, ProviderError};

    #[test]
    fn external_api_error_carries_status_and_body() {
        let error = ProviderError::ExternalApi {
            service: "Yelp",
            status: 401,
            body: "bad token".to_string(),
        };
        assert_eq!(error.to_string(), "Yelp API 401: bad token");
    }

    #[test]
    fn crypto_errors_convert_into_app_errors() {
        let error: AppError = CryptoError::Authentication.into();
        assert!(error.to_string().starts_with("CRYPTO_FAILURE"));
    }
}

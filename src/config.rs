use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
pub const ENV_ENCRYPTION_KEY: &str = "INTEGRATION_ENCRYPTION_KEY";
pub const ENV_GOOGLE_SERVICE_ACCOUNT: &str = "GOOGLE_SERVICE_ACCOUNT_JSON";
pub const ENV_YELP_API_KEY: &str = "YELP_API_KEY";
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_LOG_DIR: &str = "BCC_LOG_DIR";

/// Base URLs for every outbound API. Overridable so tests can point the
/// provider clients at a local mock server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiEndpoints {
    pub clickup: String,
    pub google_token: String,
    pub analytics: String,
    pub search_console: String,
    pub business_accounts: String,
    pub business_info: String,
    pub yelp: String,
    pub openrouter: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            clickup: "https://api.clickup.com/api/v2".to_string(),
            google_token: "https://oauth2.googleapis.com/token".to_string(),
            analytics: "https://analyticsdata.googleapis.com/v1beta".to_string(),
            search_console: "https://www.googleapis.com/webmasters/v3".to_string(),
            business_accounts: "https://mybusinessaccountmanagement.googleapis.com/v1".to_string(),
            business_info: "https://mybusinessbusinessinformation.googleapis.com/v1".to_string(),
            yelp: "https://api.yelp.com/v3".to_string(),
            openrouter: "https://openrouter.ai/api/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    /// 64 hex characters (32 bytes). Validated lazily by the credential cipher.
    pub encryption_key: Option<String>,
    /// Raw service-account JSON as downloaded from the Google console.
    pub google_service_account_json: Option<String>,
    pub yelp_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub provider_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub stale_after_minutes: i64,
    pub cron_interval_minutes: u64,
    pub recent_review_limit: usize,
    pub max_queue_size: usize,
    pub endpoints: ApiEndpoints,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/command-center.sqlite"),
            log_dir: None,
            encryption_key: None,
            google_service_account_json: None,
            yelp_api_key: None,
            openrouter_api_key: None,
            provider_timeout_secs: 30,
            http_timeout_secs: 30,
            stale_after_minutes: 15,
            cron_interval_minutes: 30,
            recent_review_limit: 20,
            max_queue_size: 512,
            endpoints: ApiEndpoints::default(),
        }
    }
}

impl AppConfig {
    /// Reads the optional YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            AppError::Config(format!("failed to read {}: {}", path.to_string_lossy(), error))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = non_empty(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = non_empty(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(ENV_ENCRYPTION_KEY) {
            self.encryption_key = Some(value);
        }
        if let Some(value) = non_empty(ENV_GOOGLE_SERVICE_ACCOUNT) {
            self.google_service_account_json = Some(value);
        }
        if let Some(value) = non_empty(ENV_YELP_API_KEY) {
            self.yelp_api_key = Some(value);
        }
        if let Some(value) = non_empty(ENV_OPENROUTER_API_KEY) {
            self.openrouter_api_key = Some(value);
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_after_minutes)
    }

    pub fn cron_interval(&self) -> Duration {
        Duration::from_secs(self.cron_interval_minutes.max(1) * 60)
    }

    pub fn service_account(&self) -> AppResult<Option<ServiceAccountKey>> {
        self.google_service_account_json
            .as_deref()
            .map(ServiceAccountKey::from_json)
            .transpose()
    }
}

/// The subset of a Google service-account key file used for the JWT-bearer grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let key: Self = serde_json::from_str(raw)
            .map_err(|error| AppError::Config(format!("invalid service account JSON: {}", error)))?;
        if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
            return Err(AppError::Config(
                "service account JSON is missing client_email or private_key".to_string(),
            ));
        }
        Ok(key)
    }
}

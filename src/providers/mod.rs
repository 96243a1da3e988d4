pub mod clickup;
pub mod google_analytics;
pub mod google_auth;
pub mod google_business;
pub mod google_search_console;
pub mod yelp;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult, ProviderError, ProviderResult};
use crate::models::{
    AnalyticsMetrics, BusinessReviewData, ClickUpData, IntegrationConfig, Provider,
    SearchConsoleMetrics, YelpReviewData,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Normalized result of one provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutput {
    ClickUp(ClickUpData),
    Analytics(AnalyticsMetrics),
    SearchConsole(SearchConsoleMetrics),
    BusinessReviews(BusinessReviewData),
    YelpReviews(YelpReviewData),
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Pulls and normalizes the provider's data. Failures are values, never panics.
    async fn sync(&self, config: &IntegrationConfig) -> ProviderResult<ProviderOutput>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the production client for every provider.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let http = build_http_client(config.http_timeout())
            .map_err(|error| AppError::Config(format!("failed to build HTTP client: {}", error)))?;
        let google_key = match config.service_account() {
            Ok(Some(key)) => Ok(key),
            Ok(None) => Err(google_auth::NOT_CONFIGURED.to_string()),
            Err(error) => {
                tracing::warn!(error = %error, "Google providers disabled until the service account is fixed");
                Err(match error {
                    AppError::Config(message) => message,
                    other => other.to_string(),
                })
            }
        };
        let google = Arc::new(google_auth::GoogleAuth::with_key(
            http.clone(),
            google_key,
            config.endpoints.google_token.clone(),
        ));
        let endpoints = &config.endpoints;

        let mut registry = Self::new();
        registry.register(Arc::new(clickup::ClickUpClient::new(
            http.clone(),
            endpoints.clickup.clone(),
        )));
        registry.register(Arc::new(google_analytics::GoogleAnalyticsClient::new(
            http.clone(),
            google.clone(),
            endpoints.analytics.clone(),
        )));
        registry.register(Arc::new(google_search_console::SearchConsoleClient::new(
            http.clone(),
            google.clone(),
            endpoints.search_console.clone(),
        )));
        registry.register(Arc::new(google_business::GoogleBusinessClient::new(
            http.clone(),
            google,
            endpoints.business_accounts.clone(),
            endpoints.business_info.clone(),
        )));
        registry.register(Arc::new(yelp::YelpClient::new(
            http,
            config.yelp_api_key.clone(),
            endpoints.yelp.clone(),
        )));
        Ok(registry)
    }

    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.provider(), client);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&provider).cloned()
    }
}

pub fn build_http_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("brand-command-center/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProviderError::from)
}

/// Decodes a JSON body, turning any non-2xx status into `ExternalApi`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> ProviderResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ExternalApi {
            service,
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|error| ProviderError::Decode(format!("{} response: {}", service, error)))
}

const MAX_ERROR_BODY_CHARS: usize = 500;

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

/// A required, non-blank config value.
pub(crate) fn required<'a>(
    config: &'a IntegrationConfig,
    key: &str,
    message: &str,
) -> ProviderResult<&'a str> {
    optional(config, key).ok_or_else(|| ProviderError::Configuration(message.to_string()))
}

pub(crate) fn optional<'a>(config: &'a IntegrationConfig, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        optional, read_json, required, ProviderClient, ProviderOutput, ProviderRegistry,
        MAX_ERROR_BODY_CHARS,
    };
    use crate::config::AppConfig;
    use crate::errors::{ProviderError, ProviderResult};
    use crate::models::{ClickUpData, IntegrationConfig, Provider};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Stub;

    #[async_trait]
    impl ProviderClient for Stub {
        fn provider(&self) -> Provider {
            Provider::Clickup
        }

        async fn sync(&self, _config: &IntegrationConfig) -> ProviderResult<ProviderOutput> {
            Ok(ProviderOutput::ClickUp(ClickUpData::default()))
        }
    }

    #[test]
    fn registry_resolves_by_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Stub));
        assert!(registry.get(Provider::Clickup).is_some());
        assert!(registry.get(Provider::Yelp).is_none());
    }

    #[test]
    fn production_registry_covers_every_provider() {
        let registry = ProviderRegistry::from_config(&AppConfig::default()).expect("registry");
        for provider in Provider::ALL {
            let client = registry.get(provider).expect("registered");
            assert_eq!(client.provider(), provider);
        }
    }

    #[tokio::test]
    async fn broken_google_key_only_fails_google_providers() {
        let config = AppConfig {
            google_service_account_json: Some("{not json".to_string()),
            ..AppConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config).expect("registry still builds");
        assert!(registry.get(Provider::Clickup).is_some());
        assert!(registry.get(Provider::Yelp).is_some());

        let analytics = registry.get(Provider::GoogleAnalytics).expect("analytics");
        let config = IntegrationConfig::from([("property_id".to_string(), "123".to_string())]);
        match analytics.sync(&config).await {
            Err(ProviderError::Configuration(reason)) => {
                assert!(reason.contains("invalid service account JSON"), "{}", reason)
            }
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn error_bodies_are_capped() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(502).set_body_string("x".repeat(2000)))
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.expect("response");
        match read_json::<serde_json::Value>("Yelp", response).await {
            Err(ProviderError::ExternalApi { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), MAX_ERROR_BODY_CHARS + 1);
                assert!(body.ends_with('…'));
            }
            other => panic!("expected api error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = IntegrationConfig::from([("business_id".to_string(), "  ".to_string())]);
        assert!(optional(&config, "business_id").is_none());
        let error = required(&config, "business_id", "No Yelp business_id configured")
            .expect_err("blank");
        assert!(matches!(error, ProviderError::Configuration(_)));
    }
}

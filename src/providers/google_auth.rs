use super::read_json;
use crate::config::ServiceAccountKey;
use crate::errors::{ProviderError, ProviderResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub const ANALYTICS_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const SEARCH_CONSOLE_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";
pub const BUSINESS_SCOPE: &str = "https://www.googleapis.com/auth/business.manage";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;
pub const NOT_CONFIGURED: &str = "GOOGLE_SERVICE_ACCOUNT_JSON is not configured";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Service-account token source shared by every Google client.
///
/// Tokens are cached per scope and reused until shortly before they expire.
pub struct GoogleAuth {
    http: reqwest::Client,
    key: Result<ServiceAccountKey, String>,
    token_url: String,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl GoogleAuth {
    pub fn new(http: reqwest::Client, key: Option<ServiceAccountKey>, token_url: String) -> Self {
        Self::with_key(http, key.ok_or_else(|| NOT_CONFIGURED.to_string()), token_url)
    }

    /// A key that failed to load makes every token request fail with `reason`.
    pub fn with_key(
        http: reqwest::Client,
        key: Result<ServiceAccountKey, String>,
        token_url: String,
    ) -> Self {
        Self {
            http,
            key,
            token_url,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn access_token(&self, scope: &str) -> ProviderResult<String> {
        let key = self
            .key
            .as_ref()
            .map_err(|reason| ProviderError::Configuration(reason.clone()))?;

        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(cached) = cache.get(scope) {
            if cached.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(cached.access_token.clone());
            }
        }

        let assertion = self.build_assertion(key, scope, now)?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let token: TokenResponse = read_json("Google OAuth", response).await?;

        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        cache.insert(
            scope.to_string(),
            CachedToken {
                access_token: token.access_token.clone(),
                expires_at: now + Duration::seconds(lifetime),
            },
        );
        tracing::debug!(scope = %scope, expires_in = lifetime, "fetched Google access token");
        Ok(token.access_token)
    }

    fn build_assertion(
        &self,
        key: &ServiceAccountKey,
        scope: &str,
        now: DateTime<Utc>,
    ) -> ProviderResult<String> {
        let claims = AssertionClaims {
            iss: key.client_email.clone(),
            scope: scope.to_string(),
            aud: self.token_url.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|error| {
            ProviderError::Configuration(format!("invalid service account private key: {}", error))
        })?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|error| ProviderError::Internal(format!("failed to sign JWT assertion: {}", error)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{AssertionClaims, GoogleAuth, ANALYTICS_SCOPE, BUSINESS_SCOPE, SEARCH_CONSOLE_SCOPE};
    use crate::config::ServiceAccountKey;
    use crate::errors::ProviderError;
    use base64::Engine;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    pub(crate) const FIXTURE_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    pub(crate) fn service_account() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "sync@brand-cc.iam.gserviceaccount.com".to_string(),
            private_key: FIXTURE_KEY.to_string(),
            token_uri: None,
        }
    }

    /// Token endpoint that answers every grant with a fixed token.
    pub(crate) async fn mount_token_endpoint(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(server)
            .await;
    }

    pub(crate) fn auth_for(server: &MockServer) -> GoogleAuth {
        GoogleAuth::new(
            reqwest::Client::new(),
            Some(service_account()),
            format!("{}/token", server.uri()),
        )
    }

    fn assertion_claims(request: &Request) -> AssertionClaims {
        let body = String::from_utf8(request.body.clone()).expect("utf8 body");
        let assertion = body
            .split('&')
            .find_map(|pair| pair.strip_prefix("assertion="))
            .expect("assertion param");
        let payload = assertion.split('.').nth(1).expect("jwt payload");
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .expect("base64url");
        serde_json::from_slice(&decoded).expect("claims")
    }

    #[tokio::test]
    async fn exchanges_signed_assertion_and_caches_per_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("jwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test-token",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;

        let auth = auth_for(&server);
        assert_eq!(auth.access_token(ANALYTICS_SCOPE).await.expect("token"), "ya29.test-token");
        auth.access_token(ANALYTICS_SCOPE).await.expect("cached");
        auth.access_token(SEARCH_CONSOLE_SCOPE).await.expect("second scope");

        let requests = server.received_requests().await.expect("recorded");
        let claims = assertion_claims(&requests[0]);
        assert_eq!(claims.iss, "sync@brand-cc.iam.gserviceaccount.com");
        assert_eq!(claims.scope, ANALYTICS_SCOPE);
        assert_eq!(claims.aud, format!("{}/token", server.uri()));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn missing_service_account_is_a_configuration_error() {
        let auth = GoogleAuth::new(reqwest::Client::new(), None, "http://127.0.0.1:9/token".to_string());
        let error = auth.access_token(ANALYTICS_SCOPE).await.expect_err("no key");
        assert!(matches!(error, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn unloadable_key_reports_its_reason() {
        let auth = GoogleAuth::with_key(
            reqwest::Client::new(),
            Err("invalid service account JSON: EOF".to_string()),
            "http://127.0.0.1:9/token".to_string(),
        );
        match auth.access_token(BUSINESS_SCOPE).await {
            Err(ProviderError::Configuration(reason)) => {
                assert_eq!(reason, "invalid service account JSON: EOF")
            }
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn rejected_grant_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;
        let error = auth_for(&server)
            .access_token(ANALYTICS_SCOPE)
            .await
            .expect_err("rejected");
        assert_eq!(error.to_string(), "Google OAuth API 400: invalid_grant");
    }
}

use super::google_auth::{GoogleAuth, ANALYTICS_SCOPE};
use super::{read_json, required, trim_base, ProviderClient, ProviderOutput};
use crate::errors::ProviderResult;
use crate::models::{AnalyticsMetrics, IntegrationConfig, Provider, TopPage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const SERVICE: &str = "GA4";
const PERIOD: &str = "Last 7 days";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<ReportValue>,
    #[serde(default)]
    metric_values: Vec<ReportValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportValue {
    #[serde(default)]
    value: String,
}

impl ReportRow {
    fn metric(&self, index: usize) -> f64 {
        self.metric_values
            .get(index)
            .and_then(|value| value.value.trim().parse().ok())
            .unwrap_or(0.0)
    }
}

pub struct GoogleAnalyticsClient {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    base_url: String,
}

impl GoogleAnalyticsClient {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>, base_url: String) -> Self {
        Self {
            http,
            auth,
            base_url: trim_base(&base_url),
        }
    }

    async fn run_report(&self, token: &str, property_id: &str, body: Value) -> ProviderResult<ReportResponse> {
        let url = format!("{}/{}:runReport", self.base_url, property_id);
        let response = self.http.post(url).bearer_auth(token).json(&body).send().await?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl ProviderClient for GoogleAnalyticsClient {
    fn provider(&self) -> Provider {
        Provider::GoogleAnalytics
    }

    async fn sync(&self, config: &IntegrationConfig) -> ProviderResult<ProviderOutput> {
        let property_id = required(config, "property_id", "No GA4 property_id configured")?;
        let token = self.auth.access_token(ANALYTICS_SCOPE).await?;

        let overview = self
            .run_report(
                &token,
                property_id,
                json!({
                    "dateRanges": [{ "startDate": "7daysAgo", "endDate": "today" }],
                    "metrics": [
                        { "name": "sessions" },
                        { "name": "totalUsers" },
                        { "name": "averageSessionDuration" },
                        { "name": "bounceRate" }
                    ]
                }),
            )
            .await?;
        let pages = self
            .run_report(
                &token,
                property_id,
                json!({
                    "dateRanges": [{ "startDate": "7daysAgo", "endDate": "today" }],
                    "dimensions": [{ "name": "pagePath" }],
                    "metrics": [{ "name": "screenPageViews" }],
                    "orderBys": [{ "metric": { "metricName": "screenPageViews" }, "desc": true }],
                    "limit": 5
                }),
            )
            .await?;

        Ok(ProviderOutput::Analytics(to_metrics(&overview, &pages)))
    }
}

fn to_metrics(overview: &ReportResponse, pages: &ReportResponse) -> AnalyticsMetrics {
    let totals = overview.rows.first();
    let metric = |index: usize| totals.map(|row| row.metric(index)).unwrap_or(0.0);

    AnalyticsMetrics {
        sessions: metric(0).max(0.0) as u64,
        users: metric(1).max(0.0) as u64,
        avg_session_duration: metric(2),
        bounce_rate: metric(3),
        top_pages: pages
            .rows
            .iter()
            .map(|row| TopPage {
                page: row
                    .dimension_values
                    .first()
                    .map(|value| value.value.clone())
                    .filter(|page| !page.is_empty())
                    .unwrap_or_else(|| "/".to_string()),
                views: row.metric(0).max(0.0) as u64,
            })
            .collect(),
        period: PERIOD.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::GoogleAnalyticsClient;
    use crate::errors::ProviderError;
    use crate::models::IntegrationConfig;
    use crate::providers::google_auth::tests::{auth_for, mount_token_endpoint};
    use crate::providers::{ProviderClient, ProviderOutput};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> IntegrationConfig {
        IntegrationConfig::from([("property_id".to_string(), "properties/123456".to_string())])
    }

    #[tokio::test]
    async fn runs_overview_and_top_pages_reports() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .and(path("/properties/123456:runReport"))
            .and(header("authorization", "Bearer ya29.test-token"))
            .and(body_string_contains("totalUsers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [{ "metricValues": [
                    { "value": "1204" }, { "value": "873" }, { "value": "95.5" }, { "value": "0.42" }
                ] }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/properties/123456:runReport"))
            .and(body_string_contains("pagePath"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [
                    { "dimensionValues": [{ "value": "/menu" }], "metricValues": [{ "value": "410" }] },
                    { "dimensionValues": [{ "value": "" }], "metricValues": [{ "value": "12" }] }
                ]
            })))
            .mount(&server)
            .await;

        let client = GoogleAnalyticsClient::new(reqwest::Client::new(), Arc::new(auth_for(&server)), server.uri());
        let ProviderOutput::Analytics(metrics) = client.sync(&config()).await.expect("sync") else {
            panic!("unexpected output");
        };
        assert_eq!(metrics.sessions, 1204);
        assert_eq!(metrics.users, 873);
        assert!((metrics.avg_session_duration - 95.5).abs() < f64::EPSILON);
        assert!((metrics.bounce_rate - 0.42).abs() < f64::EPSILON);
        assert_eq!(metrics.top_pages.len(), 2);
        assert_eq!(metrics.top_pages[0].page, "/menu");
        assert_eq!(metrics.top_pages[1].page, "/");
        assert_eq!(metrics.period, "Last 7 days");
    }

    #[tokio::test]
    async fn empty_report_yields_zeroes() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .and(path("/properties/123456:runReport"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = GoogleAnalyticsClient::new(reqwest::Client::new(), Arc::new(auth_for(&server)), server.uri());
        let ProviderOutput::Analytics(metrics) = client.sync(&config()).await.expect("sync") else {
            panic!("unexpected output");
        };
        assert_eq!(metrics.sessions, 0);
        assert!(metrics.top_pages.is_empty());
    }

    #[tokio::test]
    async fn api_failure_carries_status_and_body() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .and(path("/properties/123456:runReport"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let client = GoogleAnalyticsClient::new(reqwest::Client::new(), Arc::new(auth_for(&server)), server.uri());
        let error = client.sync(&config()).await.expect_err("forbidden");
        assert_eq!(error.to_string(), "GA4 API 403: permission denied");
    }

    #[tokio::test]
    async fn missing_property_is_a_configuration_error() {
        let server = MockServer::start().await;
        let client = GoogleAnalyticsClient::new(reqwest::Client::new(), Arc::new(auth_for(&server)), server.uri());
        let error = client.sync(&IntegrationConfig::new()).await.expect_err("no property");
        assert!(matches!(error, ProviderError::Configuration(_)));
    }
}

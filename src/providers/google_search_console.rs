use super::google_auth::{GoogleAuth, SEARCH_CONSOLE_SCOPE};
use super::{read_json, required, trim_base, ProviderClient, ProviderOutput};
use crate::errors::ProviderResult;
use crate::models::{IntegrationConfig, Provider, SearchConsoleMetrics, TopQuery};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const SERVICE: &str = "GSC";
/// Search Console data lags by about three days.
const LAG_DAYS: u64 = 3;
const WINDOW_DAYS: u64 = 7;

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryRow {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    #[serde(default)]
    ctr: f64,
    #[serde(default)]
    position: f64,
}

/// `(start, end)` where end is `today - 3` and start is a week before that.
pub fn search_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = today.checked_sub_days(Days::new(LAG_DAYS)).unwrap_or(today);
    let start = end.checked_sub_days(Days::new(WINDOW_DAYS)).unwrap_or(end);
    (start, end)
}

pub struct SearchConsoleClient {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    base_url: String,
}

impl SearchConsoleClient {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>, base_url: String) -> Self {
        Self {
            http,
            auth,
            base_url: trim_base(&base_url),
        }
    }

    async fn query(&self, token: &str, site_url: &str, body: Value) -> ProviderResult<QueryResponse> {
        let url = format!(
            "{}/sites/{}/searchAnalytics/query",
            self.base_url,
            urlencoding::encode(site_url)
        );
        let response = self.http.post(url).bearer_auth(token).json(&body).send().await?;
        read_json(SERVICE, response).await
    }

    pub async fn fetch(&self, site_url: &str, today: NaiveDate) -> ProviderResult<SearchConsoleMetrics> {
        let token = self.auth.access_token(SEARCH_CONSOLE_SCOPE).await?;
        let (start, end) = search_window(today);
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let totals = self
            .query(
                &token,
                site_url,
                json!({ "startDate": start, "endDate": end, "dimensions": [] }),
            )
            .await?;
        let queries = self
            .query(
                &token,
                site_url,
                json!({ "startDate": start, "endDate": end, "dimensions": ["query"], "rowLimit": 10 }),
            )
            .await?;

        let overview = totals.rows.first();
        Ok(SearchConsoleMetrics {
            total_clicks: overview.map(|row| row.clicks).unwrap_or(0.0),
            total_impressions: overview.map(|row| row.impressions).unwrap_or(0.0),
            avg_ctr: overview.map(|row| row.ctr).unwrap_or(0.0),
            avg_position: overview.map(|row| row.position).unwrap_or(0.0),
            top_queries: queries
                .rows
                .into_iter()
                .map(|row| TopQuery {
                    query: row.keys.into_iter().next().unwrap_or_default(),
                    clicks: row.clicks,
                    impressions: row.impressions,
                })
                .collect(),
            period: format!("{} to {}", start, end),
        })
    }
}

#[async_trait]
impl ProviderClient for SearchConsoleClient {
    fn provider(&self) -> Provider {
        Provider::GoogleSearchConsole
    }

    async fn sync(&self, config: &IntegrationConfig) -> ProviderResult<ProviderOutput> {
        let site_url = required(config, "site_url", "No Search Console site_url configured")?;
        let metrics = self.fetch(site_url, Utc::now().date_naive()).await?;
        Ok(ProviderOutput::SearchConsole(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::{search_window, SearchConsoleClient};
    use crate::providers::google_auth::tests::{auth_for, mount_token_endpoint};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn window_ends_three_days_back_and_spans_a_week() {
        assert_eq!(search_window(date(2025, 3, 12)), (date(2025, 3, 2), date(2025, 3, 9)));
        assert_eq!(search_window(date(2025, 3, 2)), (date(2025, 2, 20), date(2025, 2, 27)));
    }

    #[tokio::test]
    async fn fetches_totals_and_top_queries_for_encoded_site() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        let site_path = "/sites/https%3A%2F%2Fharborcafe.com%2F/searchAnalytics/query";
        Mock::given(method("POST"))
            .and(path(site_path))
            .and(body_string_contains("\"dimensions\":[]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [{ "clicks": 120.0, "impressions": 4800.0, "ctr": 0.025, "position": 8.4 }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(site_path))
            .and(body_string_contains("rowLimit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [{ "keys": ["harbor cafe brunch"], "clicks": 40.0, "impressions": 300.0 }]
            })))
            .mount(&server)
            .await;

        let client = SearchConsoleClient::new(reqwest::Client::new(), Arc::new(auth_for(&server)), server.uri());
        let metrics = client
            .fetch("https://harborcafe.com/", date(2025, 3, 12))
            .await
            .expect("metrics");
        assert!((metrics.total_clicks - 120.0).abs() < f64::EPSILON);
        assert!((metrics.avg_position - 8.4).abs() < f64::EPSILON);
        assert_eq!(metrics.top_queries[0].query, "harbor cafe brunch");
        assert_eq!(metrics.period, "2025-03-02 to 2025-03-09");
    }

    #[tokio::test]
    async fn no_rows_means_zero_totals() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = SearchConsoleClient::new(reqwest::Client::new(), Arc::new(auth_for(&server)), server.uri());
        let metrics = client
            .fetch("sc-domain:harborcafe.com", date(2025, 3, 12))
            .await
            .expect("metrics");
        assert_eq!(metrics.total_impressions, 0.0);
        assert!(metrics.top_queries.is_empty());
    }
}

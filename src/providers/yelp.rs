use super::{read_json, required, trim_base, ProviderClient, ProviderOutput};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::{IndividualReview, IntegrationConfig, Provider, YelpReviewData};
use async_trait::async_trait;
use serde::Deserialize;

const SERVICE: &str = "Yelp";

#[derive(Debug, Deserialize)]
struct Business {
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    review_count: u64,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct ReviewsResponse {
    #[serde(default)]
    reviews: Vec<YelpReview>,
}

#[derive(Debug, Deserialize)]
struct YelpReview {
    id: String,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    time_created: String,
    #[serde(default)]
    user: Option<YelpUser>,
}

#[derive(Debug, Deserialize)]
struct YelpUser {
    #[serde(default)]
    name: String,
}

pub struct YelpClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl YelpClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>, base_url: String) -> Self {
        Self {
            http,
            api_key,
            base_url: trim_base(&base_url),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        api_key: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> ProviderResult<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl ProviderClient for YelpClient {
    fn provider(&self) -> Provider {
        Provider::Yelp
    }

    async fn sync(&self, config: &IntegrationConfig) -> ProviderResult<ProviderOutput> {
        let business_id = required(config, "business_id", "No Yelp business ID configured")?;
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::Configuration("YELP_API_KEY is not configured".to_string()))?;

        let business_path = format!("/businesses/{}", urlencoding::encode(business_id));
        let business: Business = self.get(api_key, &business_path, &[]).await?;
        let reviews: ReviewsResponse = self
            .get(
                api_key,
                &format!("{}/reviews", business_path),
                &[("limit", "3"), ("sort_by", "newest")],
            )
            .await?;

        let reviews = reviews
            .reviews
            .into_iter()
            .map(|review| IndividualReview {
                platform: "Yelp".to_string(),
                external_id: Some(review.id),
                author_name: review
                    .user
                    .map(|user| user.name)
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "Anonymous".to_string()),
                rating: review.rating.round().clamp(1.0, 5.0) as u8,
                text: review.text,
                reply_text: None,
                review_date: review.time_created,
            })
            .collect();

        Ok(ProviderOutput::YelpReviews(YelpReviewData {
            rating: business.rating,
            review_count: business.review_count,
            reviews,
            business_url: business.url,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::YelpClient;
    use crate::errors::ProviderError;
    use crate::models::IntegrationConfig;
    use crate::providers::{ProviderClient, ProviderOutput};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> IntegrationConfig {
        IntegrationConfig::from([("business_id".to_string(), "harbor-cafe-portland".to_string())])
    }

    #[tokio::test]
    async fn fetches_business_then_newest_reviews() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/businesses/harbor-cafe-portland"))
            .and(header("authorization", "Bearer yelp-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rating": 4.5, "review_count": 318, "url": "https://www.yelp.com/biz/harbor-cafe-portland"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/businesses/harbor-cafe-portland/reviews"))
            .and(query_param("limit", "3"))
            .and(query_param("sort_by", "newest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "reviews": [{
                    "id": "y1", "rating": 4, "text": "Great coffee, slow service",
                    "time_created": "2025-03-02 09:15:00", "user": { "name": "Sam K." }
                }],
                "total": 318
            })))
            .mount(&server)
            .await;

        let client = YelpClient::new(reqwest::Client::new(), Some("yelp-key".to_string()), server.uri());
        let ProviderOutput::YelpReviews(data) = client.sync(&config()).await.expect("sync") else {
            panic!("unexpected output");
        };
        assert_eq!(data.review_count, 318);
        assert_eq!(data.business_url, "https://www.yelp.com/biz/harbor-cafe-portland");
        assert_eq!(data.reviews[0].author_name, "Sam K.");
        assert_eq!(data.reviews[0].rating, 4);
        assert_eq!(data.reviews[0].platform, "Yelp");
    }

    #[tokio::test]
    async fn missing_business_or_key_is_a_configuration_error() {
        let server = MockServer::start().await;
        let with_key = YelpClient::new(reqwest::Client::new(), Some("yelp-key".to_string()), server.uri());
        assert!(matches!(
            with_key.sync(&IntegrationConfig::new()).await,
            Err(ProviderError::Configuration(_))
        ));

        let without_key = YelpClient::new(reqwest::Client::new(), None, server.uri());
        assert!(matches!(
            without_key.sync(&config()).await,
            Err(ProviderError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_response_is_an_external_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("TOKEN_INVALID"))
            .mount(&server)
            .await;
        let client = YelpClient::new(reqwest::Client::new(), Some("yelp-key".to_string()), server.uri());
        let error = client.sync(&config()).await.expect_err("unauthorized");
        assert!(matches!(error, ProviderError::ExternalApi { status: 401, .. }));
        assert_eq!(error.to_string(), "Yelp API 401: TOKEN_INVALID");
    }
}

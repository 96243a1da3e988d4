use super::google_auth::{GoogleAuth, BUSINESS_SCOPE};
use super::{optional, read_json, required, trim_base, ProviderClient, ProviderOutput};
use crate::errors::ProviderResult;
use crate::models::{BusinessReviewData, IndividualReview, IntegrationConfig, Provider};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SERVICE: &str = "GBP";
const PAGE_SIZE: &str = "50";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewsResponse {
    #[serde(default)]
    reviews: Vec<GbpReview>,
    #[serde(default)]
    average_rating: Option<f64>,
    #[serde(default)]
    total_review_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GbpReview {
    #[serde(default)]
    review_id: Option<String>,
    #[serde(default)]
    reviewer: Option<Reviewer>,
    #[serde(default)]
    star_rating: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    create_time: Option<String>,
    #[serde(default)]
    review_reply: Option<ReviewReply>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reviewer {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewReply {
    #[serde(default)]
    comment: Option<String>,
}

/// Unknown or missing star values count as five stars.
pub fn star_rating(raw: Option<&str>) -> u8 {
    match raw {
        Some("ONE") => 1,
        Some("TWO") => 2,
        Some("THREE") => 3,
        Some("FOUR") => 4,
        _ => 5,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn to_review(review: GbpReview) -> IndividualReview {
    IndividualReview {
        platform: "Google".to_string(),
        external_id: review.review_id,
        author_name: non_empty(review.reviewer.and_then(|reviewer| reviewer.display_name))
            .unwrap_or_else(|| "Anonymous".to_string()),
        rating: star_rating(review.star_rating.as_deref()),
        text: review.comment.unwrap_or_default(),
        reply_text: non_empty(review.review_reply.and_then(|reply| reply.comment)),
        review_date: review.create_time.unwrap_or_default(),
    }
}

pub struct GoogleBusinessClient {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    accounts_base: String,
    info_base: String,
}

impl GoogleBusinessClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<GoogleAuth>,
        accounts_base: String,
        info_base: String,
    ) -> Self {
        Self {
            http,
            auth,
            accounts_base: trim_base(&accounts_base),
            info_base: trim_base(&info_base),
        }
    }

    fn reviews_url(&self, location_id: &str, account_id: Option<&str>) -> String {
        match account_id {
            Some(account_id) => format!(
                "{}/accounts/{}/locations/{}/reviews",
                self.accounts_base, account_id, location_id
            ),
            None => format!("{}/{}/reviews", self.info_base, location_id),
        }
    }
}

#[async_trait]
impl ProviderClient for GoogleBusinessClient {
    fn provider(&self) -> Provider {
        Provider::GoogleBusiness
    }

    async fn sync(&self, config: &IntegrationConfig) -> ProviderResult<ProviderOutput> {
        let location_id = required(config, "location_id", "No Google Business location_id configured")?;
        let url = self.reviews_url(location_id, optional(config, "account_id"));
        let token = self.auth.access_token(BUSINESS_SCOPE).await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[("pageSize", PAGE_SIZE)])
            .send()
            .await?;
        let data: ReviewsResponse = read_json(SERVICE, response).await?;

        let reviews: Vec<IndividualReview> = data.reviews.into_iter().map(to_review).collect();
        Ok(ProviderOutput::BusinessReviews(BusinessReviewData {
            average_rating: data.average_rating.unwrap_or(0.0),
            total_reviews: data
                .total_review_count
                .filter(|count| *count > 0)
                .unwrap_or(reviews.len() as u64),
            reviews,
        }))
    }
}

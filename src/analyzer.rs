//! Guest happiness analysis over stored reviews.
//!
//! Sentiment and menu mentions come from an optional LLM backend; without one,
//! or when its reply cannot be used, the summary is derived from platform
//! ratings. Response-time figures are always computed locally.

use crate::errors::{ProviderError, ProviderResult};
use crate::models::{
    GuestHappiness, IndividualReview, MentionSentiment, MenuMention, ResponseTimeSummary,
    ReviewPlatform, SentimentSummary,
};
use crate::providers::{read_json, trim_base};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OPENROUTER_MODEL: &str = "google/gemini-flash-1.5";
const SERVICE: &str = "OpenRouter";
const MAX_DIGEST_REVIEWS: usize = 20;
const MAX_REVIEW_CHARS: usize = 300;
const MAX_THEMES: usize = 5;
const MAX_MENU_ITEMS: usize = 8;
const RESPONSIVE_PERCENT: u32 = 80;

const SYSTEM_PROMPT: &str = "You are a warm, friendly marketing analytics assistant. You analyze customer reviews for small business owners. Always respond in valid JSON. No markdown, no code fences, just pure JSON.";

#[async_trait]
pub trait SentimentBackend: Send + Sync {
    /// Returns the raw completion text for `prompt`.
    async fn complete(&self, prompt: &str) -> ProviderResult<String>;
}

pub struct OpenRouterBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterBackend {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
            api_key: api_key.into(),
            model: OPENROUTER_MODEL.to_string(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SentimentBackend for OpenRouterBackend {
    async fn complete(&self, prompt: &str) -> ProviderResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 1500,
        };
        let response = self
            .http
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let chat: ChatResponse = read_json(SERVICE, response).await?;
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[derive(Debug, Serialize)]
struct DigestEntry<'a> {
    rating: u8,
    text: String,
    platform: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelReply {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    positive_percent: Option<f64>,
    #[serde(default)]
    negative_percent: Option<f64>,
    #[serde(default)]
    top_praises: Option<Value>,
    #[serde(default)]
    top_complaints: Option<Value>,
    #[serde(default)]
    menu_items: Option<Value>,
}

struct SentimentAnalysis {
    sentiment: SentimentSummary,
    menu_mentions: Vec<MenuMention>,
}

fn build_prompt(reviews: &[&IndividualReview]) -> ProviderResult<String> {
    let digest: Vec<DigestEntry> = reviews
        .iter()
        .map(|review| DigestEntry {
            rating: review.rating,
            text: review.text.chars().take(MAX_REVIEW_CHARS).collect(),
            platform: &review.platform,
        })
        .collect();
    let digest = serde_json::to_string(&digest)
        .map_err(|error| ProviderError::Internal(format!("review digest: {}", error)))?;

    Ok(format!(
        r#"Analyze these {count} customer reviews for a cafe/restaurant and respond with ONLY valid JSON (no markdown, no code fences):

Reviews:
{digest}

Return this exact JSON structure:
{{
  "summary": "A warm 2-3 sentence summary of what customers are saying. Write like you're talking to the business owner: friendly, encouraging, specific.",
  "positivePercent": 85,
  "negativePercent": 15,
  "topPraises": ["Specific praise 1", "Specific praise 2", "Specific praise 3"],
  "topComplaints": ["Specific complaint 1"],
  "menuItems": [
    {{"name": "Item Name", "mentions": 3, "sentiment": "positive"}},
    {{"name": "Another Item", "mentions": 2, "sentiment": "mixed"}}
  ]
}}

Rules:
- menuItems: Extract specific food/drink items mentioned. If none mentioned, return empty array.
- topPraises/topComplaints: Be specific (e.g. "Fresh smoothies" not just "Food quality")
- positivePercent + negativePercent should equal 100
- summary: Be warm and encouraging, mention specific highlights"#,
        count = reviews.len(),
        digest = digest
    ))
}

/// Drops markdown code fences some models wrap JSON in.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

fn clamp_percent(value: Option<f64>, fallback: f64) -> u8 {
    value.unwrap_or(fallback).clamp(0.0, 100.0).round() as u8
}

fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .take(MAX_THEMES)
            .collect(),
        _ => Vec::new(),
    }
}

fn menu_items(value: Option<Value>) -> Vec<MenuMention> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .take(MAX_MENU_ITEMS)
        .map(|item| {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .unwrap_or("Unknown")
                .to_string();
            let mentions = item
                .get("mentions")
                .and_then(Value::as_u64)
                .filter(|count| *count > 0)
                .map(|count| count.min(u32::MAX as u64) as u32)
                .unwrap_or(1);
            let sentiment = match item.get("sentiment").and_then(Value::as_str) {
                Some("mixed") => MentionSentiment::Mixed,
                Some("negative") => MentionSentiment::Negative,
                _ => MentionSentiment::Positive,
            };
            MenuMention {
                name,
                mentions,
                sentiment,
            }
        })
        .collect()
}

pub(crate) fn parse_model_reply(raw: &str) -> ProviderResult<(SentimentSummary, Vec<MenuMention>)> {
    let reply: ModelReply = serde_json::from_str(&strip_code_fences(raw))
        .map_err(|error| ProviderError::Decode(format!("{} reply: {}", SERVICE, error)))?;
    let sentiment = SentimentSummary {
        summary: reply
            .summary
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or_else(|| "Your customers have been sharing their thoughts!".to_string()),
        positive_percent: clamp_percent(reply.positive_percent, 80.0),
        negative_percent: clamp_percent(reply.negative_percent, 20.0),
        top_praises: string_list(reply.top_praises),
        top_complaints: string_list(reply.top_complaints),
    };
    Ok((sentiment, menu_items(reply.menu_items)))
}

async fn analyze_with_backend(
    backend: &dyn SentimentBackend,
    reviews: &[IndividualReview],
) -> ProviderResult<Option<SentimentAnalysis>> {
    let with_text: Vec<&IndividualReview> = reviews
        .iter()
        .filter(|review| review.text.chars().count() > 5)
        .take(MAX_DIGEST_REVIEWS)
        .collect();
    if with_text.is_empty() {
        return Ok(None);
    }
    let prompt = build_prompt(&with_text)?;
    let raw = backend.complete(&prompt).await?;
    let (sentiment, menu_mentions) = parse_model_reply(&raw)?;
    Ok(Some(SentimentAnalysis {
        sentiment,
        menu_mentions,
    }))
}

fn platform_rating(platform: &ReviewPlatform) -> f64 {
    platform
        .rating
        .trim()
        .trim_end_matches("/5")
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0)
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        singular.to_string()
    } else {
        plural.to_string()
    }
}

/// Sentiment estimated from the review-count weighted platform rating.
pub fn sentiment_from_stats(reviews: &[IndividualReview], platforms: &[ReviewPlatform]) -> SentimentSummary {
    let total_reviews: u64 = platforms.iter().map(|platform| platform.review_count).sum();
    let weighted: f64 = platforms
        .iter()
        .map(|platform| platform_rating(platform) * platform.review_count as f64)
        .sum();
    let average = if total_reviews > 0 {
        weighted / total_reviews as f64
    } else {
        0.0
    };

    let positive_percent = (average / 5.0 * 100.0).clamp(0.0, 100.0).round() as u8;
    let negative_percent = 100 - positive_percent;

    let summary = if average >= 4.5 {
        format!(
            "Your customers love you! Across {} reviews on {} {}, you're sitting at {:.1} stars. That's seriously impressive, so keep doing what you're doing.",
            total_reviews,
            platforms.len(),
            plural(platforms.len(), "platform", "platforms"),
            average
        )
    } else if average >= 4.0 {
        format!(
            "Solid reputation with {:.1} stars across {} reviews. Your customers are generally happy, and a few more 5-star experiences could push you even higher.",
            average, total_reviews
        )
    } else if average >= 3.5 {
        format!(
            "You've got {} reviews averaging {:.1} stars, with room to grow! Focusing on the feedback could help turn those 3-star experiences into 5-star ones.",
            total_reviews, average
        )
    } else {
        format!(
            "With {} reviews averaging {:.1} stars, there's real opportunity to improve. Let's focus on addressing customer concerns and building momentum.",
            total_reviews, average
        )
    };

    let top_praises = if reviews.iter().any(|review| review.rating >= 4) {
        vec!["Consistent quality".to_string(), "Friendly experience".to_string()]
    } else {
        vec!["Building a loyal customer base".to_string()]
    };
    let top_complaints = if reviews.iter().any(|review| review.rating <= 2) {
        vec!["Some experiences fell short".to_string()]
    } else {
        Vec::new()
    };

    SentimentSummary {
        summary,
        positive_percent,
        negative_percent,
        top_praises,
        top_complaints,
    }
}

/// Complaints are reviews rated 3 or lower; a reply anywhere counts.
pub fn response_time(reviews: &[IndividualReview]) -> ResponseTimeSummary {
    let complaints: Vec<&IndividualReview> = reviews.iter().filter(|review| review.rating <= 3).collect();
    let total_negative = complaints.len();
    let replied_count = complaints
        .iter()
        .filter(|review| {
            review
                .reply_text
                .as_deref()
                .map(|reply| !reply.trim().is_empty())
                .unwrap_or(false)
        })
        .count();

    let summary = if total_negative == 0 {
        "No critical reviews to respond to. Your customers are happy!".to_string()
    } else if replied_count == 0 {
        format!(
            "{} {} a response. Replying shows you care!",
            total_negative,
            plural(total_negative, "review needs", "reviews need")
        )
    } else {
        let rate = ((replied_count as f64 / total_negative as f64) * 100.0).round() as u32;
        if rate >= RESPONSIVE_PERCENT {
            format!(
                "You've replied to {} of {} critical reviews ({}%). Great responsiveness!",
                replied_count, total_negative, rate
            )
        } else {
            format!(
                "You've replied to {} of {} critical reviews ({}%). Responding to the rest could help turn things around.",
                replied_count, total_negative, rate
            )
        }
    };

    ResponseTimeSummary {
        summary,
        avg_hours: None,
        replied_count,
        total_negative,
    }
}

pub async fn analyze_reviews(
    reviews: &[IndividualReview],
    platforms: &[ReviewPlatform],
    backend: Option<&dyn SentimentBackend>,
) -> GuestHappiness {
    let mut analysis = None;
    if let Some(backend) = backend {
        match analyze_with_backend(backend, reviews).await {
            Ok(result) => analysis = result,
            Err(error) => {
                tracing::warn!(error = %error, "review analysis failed, falling back to rating stats");
            }
        }
    }
    let analysis = analysis.unwrap_or_else(|| SentimentAnalysis {
        sentiment: sentiment_from_stats(reviews, platforms),
        menu_mentions: Vec::new(),
    });

    GuestHappiness {
        sentiment: analysis.sentiment,
        menu_mentions: analysis.menu_mentions,
        response_time: response_time(reviews),
        analyzed_at: Utc::now(),
        reviews_analyzed: reviews.len(),
    }
}

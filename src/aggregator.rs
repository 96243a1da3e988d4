//! Cross-platform review aggregation: platform stats, keyword themes, the
//! weekly vibe line and the capped list of recent reviews.

use crate::models::{BusinessReviewData, IndividualReview, ReviewPlatform, YelpReviewData};
use chrono::{DateTime, NaiveDateTime};

pub const RECENT_REVIEW_LIMIT: usize = 20;
const MAX_THEMES: usize = 5;

const POSITIVE_KEYWORDS: [&str; 20] = [
    "fresh", "delicious", "amazing", "great", "excellent", "friendly", "fast", "clean",
    "beautiful", "love", "best", "recommend", "perfect", "wonderful", "fantastic", "awesome",
    "tasty", "good", "healthy", "quick",
];

const NEGATIVE_KEYWORDS: [&str; 19] = [
    "slow", "wait", "cold", "expensive", "price", "rude", "dirty", "small", "portion", "wrong",
    "mistake", "bad", "terrible", "worst", "disappointing", "overpriced", "mediocre", "bland",
    "stale",
];

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedReviews {
    pub platforms: Vec<ReviewPlatform>,
    pub recent_reviews: Vec<IndividualReview>,
    pub positive_themes: Vec<String>,
    pub negative_themes: Vec<String>,
    pub weekly_vibe: String,
    pub combined_rating: f64,
}

pub fn aggregate_reviews(
    google: Option<&BusinessReviewData>,
    yelp: Option<&YelpReviewData>,
) -> AggregatedReviews {
    aggregate_reviews_with_limit(google, yelp, RECENT_REVIEW_LIMIT)
}

pub fn aggregate_reviews_with_limit(
    google: Option<&BusinessReviewData>,
    yelp: Option<&YelpReviewData>,
    recent_limit: usize,
) -> AggregatedReviews {
    let google_reviews: &[IndividualReview] = google.map(|data| data.reviews.as_slice()).unwrap_or(&[]);
    let yelp_reviews: &[IndividualReview] = yelp.map(|data| data.reviews.as_slice()).unwrap_or(&[]);

    let mut all_reviews: Vec<IndividualReview> =
        google_reviews.iter().chain(yelp_reviews).cloned().collect();
    // Stable: equal timestamps keep Google-then-Yelp order.
    all_reviews.sort_by_key(|review| std::cmp::Reverse(review_timestamp(&review.review_date)));

    let combined_rating = combined_rating(&[
        google.map(|data| (data.average_rating, data.total_reviews)),
        yelp.map(|data| (data.rating, data.review_count)),
    ]);

    let mut platforms = Vec::new();
    if let Some(data) = google {
        if data.total_reviews > 0 || !data.reviews.is_empty() {
            platforms.push(ReviewPlatform {
                platform: "Google".to_string(),
                rating: format!("{:.1}/5", data.average_rating),
                review_count: data.total_reviews,
                response_rate: format!("{}%", response_rate(&data.reviews)),
            });
        }
    }
    if let Some(data) = yelp {
        if data.review_count > 0 || !data.reviews.is_empty() {
            platforms.push(ReviewPlatform {
                platform: "Yelp".to_string(),
                rating: format!("{:.1}/5", data.rating),
                review_count: data.review_count,
                response_rate: "N/A".to_string(),
            });
        }
    }

    let positive_themes = extract_themes(&all_reviews, &POSITIVE_KEYWORDS);
    let negative_themes = extract_themes(&all_reviews, &NEGATIVE_KEYWORDS);
    let weekly_vibe = weekly_vibe(&all_reviews, combined_rating);
    all_reviews.truncate(recent_limit);

    AggregatedReviews {
        platforms,
        recent_reviews: all_reviews,
        positive_themes,
        negative_themes,
        weekly_vibe,
        combined_rating,
    }
}

/// Count-weighted mean over platforms with at least one review; 0 when none.
pub fn combined_rating(platforms: &[Option<(f64, u64)>]) -> f64 {
    let (weighted, count) = platforms
        .iter()
        .flatten()
        .filter(|(_, count)| *count > 0)
        .fold((0.0, 0u64), |(weighted, total), (rating, count)| {
            (weighted + rating * *count as f64, total + count)
        });
    if count == 0 {
        0.0
    } else {
        weighted / count as f64
    }
}

fn response_rate(reviews: &[IndividualReview]) -> u32 {
    if reviews.is_empty() {
        return 0;
    }
    let replied = reviews.iter().filter(|review| review.reply_text.is_some()).count();
    ((replied as f64 / reviews.len() as f64) * 100.0).round() as u32
}

/// Millis since epoch; unparsable dates sort as the epoch.
fn review_timestamp(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.timestamp_millis();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return parsed.and_utc().timestamp_millis();
    }
    0
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn extract_themes(reviews: &[IndividualReview], keywords: &[&'static str]) -> Vec<String> {
    // Insertion-ordered so that ties keep first-seen order after the stable sort.
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for review in reviews {
        let lower = review.text.to_lowercase();
        for keyword in keywords {
            if !lower.contains(keyword) {
                continue;
            }
            match counts.iter_mut().find(|(seen, _)| seen == keyword) {
                Some((_, count)) => *count += 1,
                None => counts.push((keyword, 1)),
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(MAX_THEMES)
        .map(|(keyword, count)| {
            if count > 1 {
                format!("{} ({} mentions)", capitalize(keyword), count)
            } else {
                capitalize(keyword)
            }
        })
        .collect()
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

pub fn weekly_vibe(reviews: &[IndividualReview], average: f64) -> String {
    if reviews.is_empty() {
        return "No new reviews this week. A quiet one!".to_string();
    }

    let total = reviews.len();
    let positive = reviews.iter().filter(|review| review.rating >= 4).count();
    let negative = reviews.iter().filter(|review| review.rating <= 2).count();

    let opening = if negative == 0 && positive == total {
        format!(
            "All {} review{} this week {} positive. Your customers are loving it!",
            total,
            plural(total),
            if total == 1 { "was" } else { "were" }
        )
    } else if positive > negative {
        format!(
            "{} out of {} reviews this week were positive. Great momentum!",
            positive, total
        )
    } else if negative > positive {
        format!(
            "A tougher week with {} critical review{}, but every piece of feedback is a chance to grow.",
            negative,
            plural(negative)
        )
    } else {
        format!(
            "Mixed feedback this week with {} review{}: some wins and some areas to improve.",
            total,
            plural(total)
        )
    };

    let closing = if average >= 4.5 {
        format!("Your overall {:.1}-star average is looking great.", average)
    } else if average >= 4.0 {
        format!(
            "Your {:.1}-star average is solid. A few more 5-star reviews will push you higher.",
            average
        )
    } else if average >= 3.5 {
        format!(
            "Your {:.1}-star average has room to climb. Responding to reviews can help a lot.",
            average
        )
    } else {
        format!(
            "Your {:.1}-star average needs attention. Let's focus on response rate and addressing concerns.",
            average
        )
    };

    format!("{} {}", opening, closing)
}

use crate::models::{
    AnalyticsMetrics, ClientMetric, HealthStatus, RatingSummary, RawMetricsSnapshot,
    SearchConsoleMetrics,
};

const RATING_TARGET: f64 = 4.5;
const NO_METRICS: &str =
    "No live metrics data available yet. Connect your integrations to see the magic!";

/// Renders a number the way en-US locales do: thousands separators and at
/// most three fractional digits.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = (value * 1000.0).round() / 1000.0;
    let negative = rounded < 0.0;
    let absolute = rounded.abs();
    let whole = absolute.trunc() as u64;
    let fraction = format!("{:.3}", absolute - absolute.trunc());
    let fraction = fraction
        .trim_start_matches('0')
        .trim_start_matches('.')
        .trim_end_matches('0');

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let mut rendered = String::new();
    if negative {
        rendered.push('-');
    }
    rendered.push_str(&grouped);
    if !fraction.is_empty() {
        rendered.push('.');
        rendered.push_str(fraction);
    }
    rendered
}

pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{} seconds", seconds.round() as i64);
    }
    let minutes = seconds / 60.0;
    if minutes < 2.0 {
        return "about a minute".to_string();
    }
    format!("about {:.1} minutes", minutes)
}

fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// `current / target`: at least 1.0 is on track, at least 0.7 needs work.
pub fn ratio_status(current: f64, target: f64) -> HealthStatus {
    let ratio = if target == 0.0 { 0.0 } else { current / target };
    if ratio >= 1.0 {
        HealthStatus::OnTrack
    } else if ratio >= 0.7 {
        HealthStatus::NeedsWork
    } else {
        HealthStatus::Critical
    }
}

fn threshold_status(passed: bool) -> HealthStatus {
    if passed {
        HealthStatus::OnTrack
    } else {
        HealthStatus::NeedsWork
    }
}

fn top_page_name(analytics: &AnalyticsMetrics) -> Option<String> {
    analytics.top_pages.first().map(|page| {
        let name = page.page.trim_start_matches('/');
        if name.is_empty() {
            "the homepage".to_string()
        } else {
            name.to_string()
        }
    })
}

pub fn humanize_analytics(analytics: &AnalyticsMetrics) -> Vec<ClientMetric> {
    let top_page = top_page_name(analytics).unwrap_or_else(|| "your site".to_string());
    let bounce_note = if analytics.bounce_rate < 0.4 {
        "people are sticking around, a great sign!"
    } else if analytics.bounce_rate < 0.6 {
        "some visitors are leaving quickly, let's work on that"
    } else {
        "many visitors are bouncing, landing pages may need attention"
    };

    vec![
        ClientMetric {
            label: format!("{} people visited your site", format_number(analytics.sessions as f64)),
            value: format!(
                "Mostly checking out {} for {}",
                top_page,
                format_duration(analytics.avg_session_duration)
            ),
            target: "Growing week over week".to_string(),
            status: threshold_status(analytics.sessions > 100),
        },
        ClientMetric {
            label: "Unique Visitors".to_string(),
            value: format!("{} people found you this week", format_number(analytics.users as f64)),
            target: "More is always better".to_string(),
            status: threshold_status(analytics.users > 50),
        },
        ClientMetric {
            label: "Bounce Rate".to_string(),
            value: format!("{}: {}", format_percent(analytics.bounce_rate), bounce_note),
            target: "Under 40%".to_string(),
            status: ratio_status(1.0 - analytics.bounce_rate, 0.6),
        },
    ]
}

pub fn humanize_search_console(search: &SearchConsoleMetrics) -> Vec<ClientMetric> {
    let click_note = if search.total_clicks > 100.0 {
        "strong click-through from search!"
    } else if search.total_clicks > 30.0 {
        "decent traffic from Google"
    } else {
        "let's boost those search clicks"
    };

    let mut metrics = vec![
        ClientMetric {
            label: "Google Search Visibility".to_string(),
            value: format!(
                "Your site appeared {} times in Google searches",
                format_number(search.total_impressions)
            ),
            target: "More impressions = more visibility".to_string(),
            status: threshold_status(search.total_impressions > 500.0),
        },
        ClientMetric {
            label: "Search Clicks".to_string(),
            value: format!(
                "{} people clicked through from Google, {}",
                format_number(search.total_clicks),
                click_note
            ),
            target: "Growing month over month".to_string(),
            status: threshold_status(search.total_clicks > 50.0),
        },
    ];

    if let Some(top) = search.top_queries.first() {
        metrics.push(ClientMetric {
            label: "Top Search Term".to_string(),
            value: format!(
                "\"{}\" drove {} clicks from {} appearances",
                top.query,
                format_number(top.clicks),
                format_number(top.impressions)
            ),
            target: "Brand name in top 3".to_string(),
            status: HealthStatus::OnTrack,
        });
    }
    metrics
}

/// Platforms without reviews are skipped.
pub fn humanize_reviews(google: Option<RatingSummary>, yelp: Option<RatingSummary>) -> Vec<ClientMetric> {
    let mut metrics = Vec::new();
    if let Some(google) = google.filter(|summary| summary.review_count > 0) {
        let stars = "⭐".repeat(google.rating.round().max(0.0) as usize);
        metrics.push(ClientMetric {
            label: "Google Reviews".to_string(),
            value: format!(
                "{:.1} stars from {} happy customers {}",
                google.rating,
                format_number(google.review_count as f64),
                stars
            ),
            target: "4.5+ stars".to_string(),
            status: ratio_status(google.rating, RATING_TARGET),
        });
    }
    if let Some(yelp) = yelp.filter(|summary| summary.review_count > 0) {
        metrics.push(ClientMetric {
            label: "Yelp Reviews".to_string(),
            value: format!(
                "{:.1} stars from {} Yelp reviewers",
                yelp.rating,
                format_number(yelp.review_count as f64)
            ),
            target: "4.5+ stars".to_string(),
            status: ratio_status(yelp.rating, RATING_TARGET),
        });
    }
    metrics
}

fn rated(summary: Option<RatingSummary>) -> Option<RatingSummary> {
    summary.filter(|summary| summary.rating > 0.0)
}

pub fn build_human_metrics(snapshot: &RawMetricsSnapshot) -> Vec<ClientMetric> {
    let mut metrics = Vec::new();
    if let Some(analytics) = &snapshot.analytics {
        metrics.extend(humanize_analytics(analytics));
    }
    if let Some(search) = &snapshot.search_console {
        metrics.extend(humanize_search_console(search));
    }
    metrics.extend(humanize_reviews(rated(snapshot.business), rated(snapshot.yelp)));
    metrics
}

pub fn generate_metrics_narrative(snapshot: &RawMetricsSnapshot) -> String {
    let mut parts = Vec::new();

    if let Some(analytics) = &snapshot.analytics {
        parts.push(format!(
            "This week, {} people visited your site, mostly checking out {} for {}.",
            format_number(analytics.sessions as f64),
            top_page_name(analytics).unwrap_or_else(|| "the homepage".to_string()),
            format_duration(analytics.avg_session_duration)
        ));
    }
    if let Some(search) = snapshot
        .search_console
        .as_ref()
        .filter(|search| search.total_impressions > 0.0)
    {
        parts.push(format!(
            "Your site appeared {} times in Google and {} people clicked through.",
            format_number(search.total_impressions),
            format_number(search.total_clicks)
        ));
    }
    if let Some(google) = rated(snapshot.business).filter(|summary| summary.review_count > 0) {
        parts.push(format!(
            "You're sitting at {:.1} stars on Google with {} reviews.",
            google.rating,
            format_number(google.review_count as f64)
        ));
    }
    if let Some(yelp) = rated(snapshot.yelp).filter(|summary| summary.review_count > 0) {
        parts.push(format!(
            "On Yelp, you've got {:.1} stars from {} reviews.",
            yelp.rating,
            format_number(yelp.review_count as f64)
        ));
    }

    if parts.is_empty() {
        NO_METRICS.to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TopPage, TopQuery};

    fn analytics(sessions: u64, bounce_rate: f64) -> AnalyticsMetrics {
        AnalyticsMetrics {
            sessions,
            users: 40,
            avg_session_duration: 72.0,
            top_pages: vec![TopPage {
                page: "/menu".to_string(),
                views: 300,
            }],
            bounce_rate,
            period: "Last 7 days".to_string(),
        }
    }

    #[test]
    fn numbers_get_thousands_separators() {
        assert_eq!(format_number(5677.0), "5,677");
        assert_eq!(format_number(1_234_567.0), "1,234,567");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(format_duration(42.4), "42 seconds");
        assert_eq!(format_duration(72.0), "about a minute");
        assert_eq!(format_duration(150.0), "about 2.5 minutes");
    }

    #[test]
    fn rating_ratio_buckets() {
        assert_eq!(ratio_status(4.5, 4.5), HealthStatus::OnTrack);
        assert_eq!(ratio_status(3.2, 4.5), HealthStatus::NeedsWork);
        assert_eq!(ratio_status(3.0, 4.5), HealthStatus::Critical);
    }

    #[test]
    fn analytics_thresholds() {
        let metrics = humanize_analytics(&analytics(5677, 0.35));
        assert_eq!(metrics[0].label, "5,677 people visited your site");
        assert_eq!(metrics[0].value, "Mostly checking out menu for about a minute");
        assert_eq!(metrics[0].status, HealthStatus::OnTrack);
        assert_eq!(metrics[1].status, HealthStatus::NeedsWork);
        assert!(metrics[2].value.starts_with("35.0%: people are sticking around"));
        assert_eq!(metrics[2].status, HealthStatus::OnTrack);

        let quiet = humanize_analytics(&analytics(100, 0.7));
        assert_eq!(quiet[0].status, HealthStatus::NeedsWork);
        assert_eq!(quiet[2].status, HealthStatus::Critical);
    }

    #[test]
    fn search_console_adds_top_term_when_present() {
        let search = SearchConsoleMetrics {
            total_clicks: 120.0,
            total_impressions: 4800.0,
            avg_ctr: 0.025,
            avg_position: 8.4,
            top_queries: vec![TopQuery {
                query: "harbor cafe".to_string(),
                clicks: 40.0,
                impressions: 300.0,
            }],
            period: String::new(),
        };
        let metrics = humanize_search_console(&search);
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[2].value, "\"harbor cafe\" drove 40 clicks from 300 appearances");

        let empty = SearchConsoleMetrics {
            top_queries: vec![],
            total_clicks: 10.0,
            ..search
        };
        let metrics = humanize_search_console(&empty);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].status, HealthStatus::NeedsWork);
    }

    #[test]
    fn absent_inputs_produce_fewer_metrics() {
        assert!(build_human_metrics(&RawMetricsSnapshot::default()).is_empty());
        assert_eq!(
            generate_metrics_narrative(&RawMetricsSnapshot::default()),
            "No live metrics data available yet. Connect your integrations to see the magic!"
        );

        let snapshot = RawMetricsSnapshot {
            analytics: Some(analytics(1204, 0.5)),
            business: Some(RatingSummary {
                rating: 4.6,
                review_count: 212,
            }),
            ..RawMetricsSnapshot::default()
        };
        assert_eq!(build_human_metrics(&snapshot).len(), 4);
        assert_eq!(
            generate_metrics_narrative(&snapshot),
            "This week, 1,204 people visited your site, mostly checking out menu for about a minute. You're sitting at 4.6 stars on Google with 212 reviews."
        );
    }
}

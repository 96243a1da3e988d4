use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Clickup,
    GoogleAnalytics,
    GoogleBusiness,
    GoogleSearchConsole,
    Yelp,
}

impl Provider {
    /// Ordered by provider key, the order syncs run in.
    pub const ALL: [Provider; 5] = [
        Provider::Clickup,
        Provider::GoogleAnalytics,
        Provider::GoogleBusiness,
        Provider::GoogleSearchConsole,
        Provider::Yelp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clickup => "clickup",
            Self::GoogleAnalytics => "google_analytics",
            Self::GoogleBusiness => "google_business",
            Self::GoogleSearchConsole => "google_search_console",
            Self::Yelp => "yelp",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Clickup => "ClickUp",
            Self::GoogleAnalytics => "Google Analytics",
            Self::GoogleBusiness => "Google Business Profile",
            Self::GoogleSearchConsole => "Google Search Console",
            Self::Yelp => "Yelp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|provider| provider.as_str() == raw.trim())
            .ok_or_else(|| {
                format!(
                    "Invalid provider '{}'. Must be one of: {}",
                    raw,
                    Provider::ALL.map(Provider::as_str).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    #[default]
    OnTrack,
    NeedsWork,
    Critical,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnTrack => "on-track",
            Self::NeedsWork => "needs-work",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetric {
    pub label: String,
    pub value: String,
    pub target: String,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestPriority {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub priority: RequestPriority,
    pub deadline: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CampaignStatus {
    Active,
    Planning,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MilestoneStatus {
    Done,
    InProgress,
    Pending,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub task: String,
    pub due: String,
    pub status: MilestoneStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCampaign {
    pub title: String,
    pub emoji: String,
    pub window: String,
    pub status: CampaignStatus,
    pub goal: String,
    pub progress: u8,
    pub url: String,
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAsset {
    pub category: String,
    pub icon: String,
    pub description: String,
    pub canva_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHuddle {
    pub month: String,
    pub date: String,
    pub summary: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SocialStatus {
    Posted,
    Scheduled,
    Missed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub day: String,
    pub platform: String,
    pub content: String,
    pub status: SocialStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPlatform {
    pub platform: String,
    pub rating: String,
    pub review_count: u64,
    pub response_rate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickLink {
    pub label: String,
    pub url: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrandTheme {
    pub primary: String,
    pub primary_light: String,
    pub secondary: String,
    pub accent: String,
    pub accent_light: String,
    pub bg: String,
    pub card_bg: String,
    pub text_dark: String,
    pub muted: String,
}

impl Default for BrandTheme {
    fn default() -> Self {
        Self {
            primary: "#333333".to_string(),
            primary_light: "#F2F2F2".to_string(),
            secondary: "#333333".to_string(),
            accent: "#C9A84C".to_string(),
            accent_light: "#DFC478".to_string(),
            bg: "#FAF7F4".to_string(),
            card_bg: "#FFFFFF".to_string(),
            text_dark: "#333333".to_string(),
            muted: "#8A8A8A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualReview {
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub author_name: String,
    pub rating: u8,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_text: Option<String>,
    pub review_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub portal_token: String,
    pub location: String,
    pub tagline: Option<String>,
    pub logo_url: Option<String>,
    pub brand_color: String,
    pub brand_theme: BrandTheme,
    pub overall_health: HealthStatus,
    pub health_summary: String,
    pub top_issue: String,
    pub action_needed: String,
    pub next_huddle: Option<String>,
    pub metrics: Vec<ClientMetric>,
    pub requests: Vec<ClientRequest>,
    pub campaigns: Vec<ClientCampaign>,
    pub assets: Vec<ClientAsset>,
    pub huddles: Vec<ClientHuddle>,
    pub social_posts: Vec<SocialPost>,
    pub reviews: Vec<ReviewPlatform>,
    pub positive_themes: Vec<String>,
    pub negative_themes: Vec<String>,
    pub quick_links: Vec<QuickLink>,
    pub raw_metrics: serde_json::Value,
    pub metrics_narrative: String,
    pub weekly_vibe: String,
    pub recent_reviews: Vec<IndividualReview>,
    pub guest_happiness: Option<GuestHappiness>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: String,
    pub slug: String,
    pub location: String,
    pub tagline: Option<String>,
    pub logo_url: Option<String>,
    pub brand_color: Option<String>,
    pub brand_theme: Option<BrandTheme>,
    pub overall_health: Option<HealthStatus>,
    pub health_summary: Option<String>,
    pub top_issue: Option<String>,
    pub action_needed: Option<String>,
    pub next_huddle: Option<String>,
}

/// Decrypted integration configuration. Keys are provider specific.
pub type IntegrationConfig = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRecord {
    pub id: i64,
    pub client_id: i64,
    pub provider: Provider,
    pub encrypted_config: String,
    pub enabled: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Integration as returned to callers: config values masked, never ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationView {
    pub id: i64,
    pub provider: Provider,
    pub enabled: bool,
    pub config: IntegrationConfig,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    pub provider: Provider,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncOutcome {
    NothingToSync,
    Succeeded,
    PartiallyFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub client_id: i64,
    pub run_id: String,
    pub success: bool,
    pub providers: Vec<ProviderOutcome>,
    pub duration_ms: u64,
}

impl SyncResult {
    pub fn outcome(&self) -> SyncOutcome {
        if self.providers.is_empty() {
            SyncOutcome::NothingToSync
        } else if self.success {
            SyncOutcome::Succeeded
        } else {
            SyncOutcome::PartiallyFailed
        }
    }

    pub fn provider(&self, provider: Provider) -> Option<&ProviderOutcome> {
        self.providers.iter().find(|outcome| outcome.provider == provider)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RefreshOutcome {
    NoIntegrations,
    Fresh { last_sync_at: DateTime<Utc> },
    Synced(SyncResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSyncFailure {
    pub client_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CronSummary {
    pub synced: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
    pub failures: Vec<ClientSyncFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPage {
    pub page: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsMetrics {
    pub sessions: u64,
    pub users: u64,
    /// Seconds.
    pub avg_session_duration: f64,
    pub top_pages: Vec<TopPage>,
    /// Fraction in 0..=1.
    pub bounce_rate: f64,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopQuery {
    pub query: String,
    pub clicks: f64,
    pub impressions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConsoleMetrics {
    pub total_clicks: f64,
    pub total_impressions: f64,
    pub avg_ctr: f64,
    pub avg_position: f64,
    pub top_queries: Vec<TopQuery>,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessReviewData {
    pub average_rating: f64,
    pub total_reviews: u64,
    pub reviews: Vec<IndividualReview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YelpReviewData {
    pub rating: f64,
    pub review_count: u64,
    pub reviews: Vec<IndividualReview>,
    pub business_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClickUpData {
    pub campaigns: Vec<ClientCampaign>,
    pub requests: Vec<ClientRequest>,
    pub social_posts: Vec<SocialPost>,
    /// One entry per list that failed; the other lists are still populated.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub rating: f64,
    pub review_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawMetricsSnapshot {
    pub analytics: Option<AnalyticsMetrics>,
    pub search_console: Option<SearchConsoleMetrics>,
    pub business: Option<RatingSummary>,
    pub yelp: Option<RatingSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MentionSentiment {
    Positive,
    Mixed,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuMention {
    pub name: String,
    pub mentions: u32,
    pub sentiment: MentionSentiment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentSummary {
    pub summary: String,
    pub positive_percent: u8,
    pub negative_percent: u8,
    pub top_praises: Vec<String>,
    pub top_complaints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimeSummary {
    pub summary: String,
    /// Reviews carry no reply timestamp, so this stays empty for now.
    pub avg_hours: Option<f64>,
    pub replied_count: usize,
    pub total_negative: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestHappiness {
    pub sentiment: SentimentSummary,
    pub menu_mentions: Vec<MenuMention>,
    pub response_time: ResponseTimeSummary,
    pub analyzed_at: DateTime<Utc>,
    pub reviews_analyzed: usize,
}

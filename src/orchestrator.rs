use crate::aggregator::aggregate_reviews_with_limit;
use crate::analyzer::{analyze_reviews, OpenRouterBackend, SentimentBackend};
use crate::config::AppConfig;
use crate::credentials::CredentialCipher;
use crate::db::Database;
use crate::errors::{AppError, AppResult, CryptoError, ProviderError, ProviderResult};
use crate::humanizer::{build_human_metrics, generate_metrics_narrative};
use crate::models::{
    AnalyticsMetrics, BusinessReviewData, ClientSyncFailure, CronSummary, GuestHappiness,
    IntegrationConfig, IntegrationRecord, IntegrationView, Provider, ProviderOutcome,
    RatingSummary, RawMetricsSnapshot, RefreshOutcome, SearchConsoleMetrics, SyncResult,
    SyncStatus, YelpReviewData,
};
use crate::providers::{build_http_client, ProviderOutput, ProviderRegistry};
use crate::redaction::{mask_config, Redactor};
use crate::sections::SectionData;
use chrono::Utc;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Provider outputs held back until every integration of a run has finished.
#[derive(Debug, Default)]
struct SyncBuffers {
    analytics: Option<AnalyticsMetrics>,
    search_console: Option<SearchConsoleMetrics>,
    business: Option<BusinessReviewData>,
    yelp: Option<YelpReviewData>,
}

impl SyncBuffers {
    fn has_reviews(&self) -> bool {
        self.business.is_some() || self.yelp.is_some()
    }

    fn has_metrics(&self) -> bool {
        self.analytics.is_some() || self.search_console.is_some()
    }

    fn snapshot(&self) -> RawMetricsSnapshot {
        RawMetricsSnapshot {
            analytics: self.analytics.clone(),
            search_console: self.search_console.clone(),
            business: self.business.as_ref().map(|data| RatingSummary {
                rating: data.average_rating,
                review_count: data.total_reviews,
            }),
            yelp: self.yelp.as_ref().map(|data| RatingSummary {
                rating: data.rating,
                review_count: data.review_count,
            }),
        }
    }
}

/// Runs a synchronous step, turning a panic into its message.
fn contain_panic<T>(step: impl FnOnce() -> T) -> Result<T, String> {
    std::panic::catch_unwind(AssertUnwindSafe(step)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub fn parse_provider(raw: &str) -> AppResult<Provider> {
    raw.parse::<Provider>().map_err(AppError::Validation)
}

pub struct SyncOrchestrator {
    db: Arc<Database>,
    cipher: Result<CredentialCipher, CryptoError>,
    registry: ProviderRegistry,
    sentiment: Option<Arc<dyn SentimentBackend>>,
    /// Process-wide API keys scrubbed from stored sync errors.
    app_secrets: Vec<String>,
    provider_timeout: Duration,
    stale_after: chrono::Duration,
    recent_review_limit: usize,
    #[cfg(test)]
    persist_fault: Option<&'static str>,
}

impl SyncOrchestrator {
    /// A missing or malformed encryption key is not fatal here; it surfaces on
    /// the first operation that needs the cipher.
    pub fn new(db: Arc<Database>, config: &AppConfig, registry: ProviderRegistry) -> Self {
        Self {
            db,
            cipher: CredentialCipher::from_config(config),
            registry,
            sentiment: None,
            app_secrets: [&config.yelp_api_key, &config.openrouter_api_key]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            provider_timeout: config.provider_timeout(),
            stale_after: config.stale_after(),
            recent_review_limit: config.recent_review_limit,
            #[cfg(test)]
            persist_fault: None,
        }
    }

    /// Production wiring: opens the database and registers every provider client.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let db = Arc::new(Database::new(&config.database_path)?);
        let registry = ProviderRegistry::from_config(config)?;
        let mut orchestrator = Self::new(db, config, registry);
        if let Some(api_key) = config
            .openrouter_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
        {
            let http = build_http_client(config.http_timeout())
                .map_err(|error| AppError::Config(format!("failed to build HTTP client: {}", error)))?;
            orchestrator = orchestrator.with_sentiment_backend(Arc::new(OpenRouterBackend::new(
                http,
                &config.endpoints.openrouter,
                api_key,
            )));
        }
        Ok(orchestrator)
    }

    pub fn with_sentiment_backend(mut self, backend: Arc<dyn SentimentBackend>) -> Self {
        self.sentiment = Some(backend);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    fn cipher(&self) -> Result<&CredentialCipher, CryptoError> {
        self.cipher.as_ref().map_err(Clone::clone)
    }

    // ─── sync runs ──────────────────────────────────────────────────────

    /// Syncs every enabled integration of one client. Provider failures are
    /// reported in the result, never as an `Err`.
    pub async fn sync_client(&self, client_id: i64) -> AppResult<SyncResult> {
        self.db.require_client(client_id)?;
        let integrations = self.db.enabled_integrations(client_id)?;
        if integrations.is_empty() {
            tracing::info!(client_id, "no enabled integrations, nothing to sync");
            return Ok(SyncResult {
                client_id,
                run_id: Uuid::new_v4().to_string(),
                success: true,
                providers: Vec::new(),
                duration_ms: 0,
            });
        }
        Ok(self.run_sync(client_id, integrations).await)
    }

    /// Manual "sync now" for a single provider of a client.
    pub async fn sync_provider(&self, client_id: i64, provider: Provider) -> AppResult<SyncResult> {
        self.db.require_client(client_id)?;
        let integration = self.db.get_integration(client_id, provider)?.ok_or_else(|| {
            AppError::NotFound(format!("{} integration not found for client {}", provider, client_id))
        })?;
        if !integration.enabled {
            return Err(AppError::Validation(format!(
                "{} integration is disabled for client {}",
                provider, client_id
            )));
        }
        Ok(self.run_sync(client_id, vec![integration]).await)
    }

    async fn run_sync(&self, client_id: i64, integrations: Vec<IntegrationRecord>) -> SyncResult {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(
            client_id,
            run_id = %run_id,
            integrations = integrations.len(),
            "sync started"
        );

        if let Err(error) = self.db.set_sync_status(client_id, SyncStatus::Syncing) {
            tracing::warn!(client_id, run_id = %run_id, error = %error, "failed to mark client syncing");
        }

        let mut buffers = SyncBuffers::default();
        let mut providers = Vec::with_capacity(integrations.len());
        for integration in &integrations {
            let outcome = self.sync_integration(client_id, integration, &mut buffers).await;
            providers.push(outcome);
        }

        let persisted = match contain_panic(|| self.persist_buffers(client_id, &run_id, &buffers)) {
            Ok(()) => true,
            Err(panic) => {
                tracing::error!(client_id, run_id = %run_id, panic = %panic, "post-sync persistence panicked");
                false
            }
        };

        let success = persisted && providers.iter().all(|outcome| outcome.success);
        if let Err(error) = self.db.finish_sync(client_id, success) {
            tracing::error!(client_id, run_id = %run_id, error = %error, "failed to record sync completion");
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(client_id, run_id = %run_id, success, duration_ms, "sync finished");
        SyncResult {
            client_id,
            run_id,
            success,
            providers,
            duration_ms,
        }
    }

    async fn sync_integration(
        &self,
        client_id: i64,
        integration: &IntegrationRecord,
        buffers: &mut SyncBuffers,
    ) -> ProviderOutcome {
        let provider = integration.provider;
        let config = self.decrypt_config(integration);
        let redactor = Redactor::for_config(&config).with_additional(self.app_secrets.iter().cloned());

        let result = match self.run_provider(provider, config).await {
            Ok(output) => contain_panic(|| self.apply_output(client_id, output, buffers))
                .unwrap_or_else(|panic| {
                    Err(ProviderError::Internal(format!(
                        "{} output could not be applied: {}",
                        provider.display_name(),
                        panic
                    )))
                }),
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                if let Err(error) = self.db.record_integration_success(client_id, provider) {
                    tracing::warn!(client_id, provider = %provider, error = %error, "failed to clear sync error");
                }
                tracing::info!(client_id, provider = %provider, "provider synced");
                ProviderOutcome {
                    provider,
                    success: true,
                    error: None,
                }
            }
            Err(error) => {
                let message = redactor.redact(&error.to_string()).content;
                tracing::warn!(client_id, provider = %provider, error = %message, "provider sync failed");
                if let Err(db_error) = self.db.record_integration_error(client_id, provider, &message) {
                    tracing::warn!(client_id, provider = %provider, error = %db_error, "failed to store sync error");
                }
                ProviderOutcome {
                    provider,
                    success: false,
                    error: Some(message),
                }
            }
        }
    }

    /// Undecryptable configs degrade to an empty map so the provider reports
    /// its own missing-credential error.
    fn decrypt_config(&self, integration: &IntegrationRecord) -> IntegrationConfig {
        let decrypted = self
            .cipher()
            .and_then(|cipher| cipher.decrypt_config(&integration.encrypted_config));
        match decrypted {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(
                    client_id = integration.client_id,
                    provider = %integration.provider,
                    error = %error,
                    "integration config could not be decrypted"
                );
                IntegrationConfig::new()
            }
        }
    }

    /// Runs one provider in its own task under the per-provider deadline.
    async fn run_provider(
        &self,
        provider: Provider,
        config: IntegrationConfig,
    ) -> ProviderResult<ProviderOutput> {
        let client = self.registry.get(provider).ok_or_else(|| {
            ProviderError::Configuration(format!("No client registered for {}", provider))
        })?;

        let mut task = tokio::spawn(async move { client.sync(&config).await });
        match tokio::time::timeout(self.provider_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ProviderError::Internal(format!(
                "{} sync task failed: {}",
                provider.display_name(),
                join_error
            ))),
            Err(_) => {
                task.abort();
                Err(ProviderError::Timeout(self.provider_timeout.as_secs()))
            }
        }
    }

    fn apply_output(
        &self,
        client_id: i64,
        output: ProviderOutput,
        buffers: &mut SyncBuffers,
    ) -> ProviderResult<()> {
        match output {
            ProviderOutput::ClickUp(data) => {
                let sections = [
                    SectionData::Campaigns(data.campaigns),
                    SectionData::Requests(data.requests),
                    SectionData::SocialPosts(data.social_posts),
                ];
                for section in sections.iter().filter(|section| !section.is_empty()) {
                    self.db
                        .replace_section(client_id, section)
                        .map_err(|error| ProviderError::Internal(error.to_string()))?;
                }
                if !data.errors.is_empty() {
                    return Err(ProviderError::Internal(data.errors.join("; ")));
                }
            }
            ProviderOutput::Analytics(metrics) => buffers.analytics = Some(metrics),
            ProviderOutput::SearchConsole(metrics) => buffers.search_console = Some(metrics),
            ProviderOutput::BusinessReviews(data) => buffers.business = Some(data),
            ProviderOutput::YelpReviews(data) => buffers.yelp = Some(data),
        }
        Ok(())
    }

    /// Aggregation and humanization failures are logged and never fail the run.
    fn persist_buffers(&self, client_id: i64, run_id: &str, buffers: &SyncBuffers) {
        #[cfg(test)]
        if let Some(message) = self.persist_fault {
            panic!("{}", message);
        }
        if buffers.has_reviews() {
            if let Err(error) = self.persist_reviews(client_id, buffers) {
                tracing::warn!(client_id, run_id = %run_id, error = %error, "review aggregation failed");
            }
        }
        if buffers.has_metrics() {
            if let Err(error) = self.persist_metrics(client_id, buffers) {
                tracing::warn!(client_id, run_id = %run_id, error = %error, "metrics humanization failed");
            }
        }
    }

    fn persist_reviews(&self, client_id: i64, buffers: &SyncBuffers) -> AppResult<()> {
        let aggregated = aggregate_reviews_with_limit(
            buffers.business.as_ref(),
            buffers.yelp.as_ref(),
            self.recent_review_limit,
        );
        self.db
            .replace_section(client_id, &SectionData::Reviews(aggregated.platforms))?;
        self.db
            .replace_section(client_id, &SectionData::PositiveThemes(aggregated.positive_themes))?;
        self.db
            .replace_section(client_id, &SectionData::NegativeThemes(aggregated.negative_themes))?;
        self.db
            .replace_section(client_id, &SectionData::RecentReviews(aggregated.recent_reviews))?;
        self.db.set_weekly_vibe(client_id, &aggregated.weekly_vibe)
    }

    fn persist_metrics(&self, client_id: i64, buffers: &SyncBuffers) -> AppResult<()> {
        let snapshot = buffers.snapshot();
        let metrics = build_human_metrics(&snapshot);
        if !metrics.is_empty() {
            self.db.replace_section(client_id, &SectionData::Metrics(metrics))?;
        }
        let narrative = generate_metrics_narrative(&snapshot);
        self.db
            .set_metrics_summary(client_id, &narrative, &serde_json::to_value(&snapshot)?)
    }

    /// Cron pass over every client with an enabled integration, one at a time.
    pub async fn sync_all_clients(&self) -> AppResult<CronSummary> {
        let client_ids = self.db.clients_with_integrations()?;
        let mut summary = CronSummary {
            synced: client_ids.len(),
            ..CronSummary::default()
        };

        for client_id in client_ids {
            match self.sync_client(client_id).await {
                Ok(result) => {
                    if result.success {
                        summary.successful += 1;
                    } else {
                        summary.failed += 1;
                    }
                    summary.results.push(result);
                }
                Err(error) => {
                    tracing::error!(client_id, error = %error, "client sync aborted");
                    summary.failed += 1;
                    summary.failures.push(ClientSyncFailure {
                        client_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            synced = summary.synced,
            successful = summary.successful,
            failed = summary.failed,
            "cron sync pass finished"
        );
        Ok(summary)
    }

    /// Portal freshness check: syncs only when the last successful sync is
    /// older than the stale threshold.
    pub async fn refresh_if_stale(&self, portal_token: &str) -> AppResult<RefreshOutcome> {
        let client = self
            .db
            .get_client_by_token(portal_token)?
            .ok_or_else(|| AppError::NotFound("no client for portal token".to_string()))?;
        if let Err(error) = self.db.touch_last_accessed(client.id) {
            tracing::warn!(client_id = client.id, error = %error, "failed to record portal access");
        }

        if self.db.enabled_integrations(client.id)?.is_empty() {
            return Ok(RefreshOutcome::NoIntegrations);
        }
        if let Some(last_sync_at) = client.last_sync_at {
            if Utc::now().signed_duration_since(last_sync_at) < self.stale_after {
                return Ok(RefreshOutcome::Fresh { last_sync_at });
            }
        }
        Ok(RefreshOutcome::Synced(self.sync_client(client.id).await?))
    }

    // ─── integration management ─────────────────────────────────────────

    pub fn upsert_integration(
        &self,
        client_id: i64,
        provider: &str,
        config: &IntegrationConfig,
        enabled: bool,
    ) -> AppResult<IntegrationView> {
        let provider = parse_provider(provider)?;
        let encrypted = self.cipher()?.encrypt_config(config)?;
        let record = self
            .db
            .upsert_integration(client_id, provider, &encrypted, enabled)?;
        tracing::info!(client_id, provider = %provider, enabled, "integration saved");
        Ok(to_view(record, mask_config(config)))
    }

    /// Config values come back masked; ciphertext is never returned.
    pub fn list_integrations(&self, client_id: i64) -> AppResult<Vec<IntegrationView>> {
        self.db.require_client(client_id)?;
        let records = self.db.list_integrations(client_id)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let config = mask_config(&self.decrypt_config(&record));
                to_view(record, config)
            })
            .collect())
    }

    pub fn set_integration_enabled(
        &self,
        client_id: i64,
        provider: Provider,
        enabled: bool,
    ) -> AppResult<()> {
        if !self.db.set_integration_enabled(client_id, provider, enabled)? {
            return Err(AppError::NotFound(format!(
                "{} integration not found for client {}",
                provider, client_id
            )));
        }
        tracing::info!(client_id, provider = %provider, enabled, "integration toggled");
        Ok(())
    }

    pub fn delete_integration(&self, client_id: i64, provider: Provider) -> AppResult<()> {
        if !self.db.delete_integration(client_id, provider)? {
            return Err(AppError::NotFound(format!(
                "{} integration not found for client {}",
                provider, client_id
            )));
        }
        tracing::info!(client_id, provider = %provider, "integration removed");
        Ok(())
    }

    pub async fn analyze_guest_happiness(&self, client_id: i64) -> AppResult<GuestHappiness> {
        let client = self.db.require_client(client_id)?;
        let happiness = analyze_reviews(
            &client.recent_reviews,
            &client.reviews,
            self.sentiment.as_deref(),
        )
        .await;
        self.db.set_guest_happiness(client_id, &happiness)?;
        tracing::info!(
            client_id,
            reviews = happiness.reviews_analyzed,
            "guest happiness analyzed"
        );
        Ok(happiness)
    }
}

fn to_view(record: IntegrationRecord, config: IntegrationConfig) -> IntegrationView {
    IntegrationView {
        id: record.id,
        provider: record.provider,
        enabled: record.enabled,
        config,
        last_synced_at: record.last_synced_at,
        sync_error: record.sync_error,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

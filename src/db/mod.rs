use crate::errors::{AppError, AppResult};
use crate::models::{
    BrandTheme, ClientRecord, GuestHappiness, HealthStatus, IntegrationRecord, NewClient, Provider,
    SyncStatus,
};
use crate::sections::{validate_section, Section, SectionData};
use base64::Engine;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const CLIENT_COLUMNS: &str = "id, name, slug, portal_token, location, tagline, logo_url, brand_color,
    brand_theme, overall_health, health_summary, top_issue, action_needed, next_huddle, metrics,
    requests, campaigns, assets, huddles, social_posts, reviews, positive_themes, negative_themes,
    quick_links, raw_metrics, metrics_narrative, weekly_vibe, recent_reviews, guest_happiness,
    last_sync_at, sync_status, created_at, updated_at, last_accessed_at";

const INTEGRATION_COLUMNS: &str =
    "id, client_id, provider, config, enabled, last_synced_at, sync_error, created_at, updated_at";

/// 24 random bytes, base64url without padding (32 characters).
pub fn generate_portal_token() -> String {
    let bytes: [u8; 24] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // ─── clients ────────────────────────────────────────────────────────

    pub fn create_client(&self, payload: &NewClient) -> AppResult<ClientRecord> {
        let name = payload.name.trim();
        let slug = payload.slug.trim();
        if name.is_empty() || slug.is_empty() {
            return Err(AppError::Validation("client name and slug are required".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let theme = payload.brand_theme.clone().unwrap_or_default();
        let brand_color = payload
            .brand_color
            .clone()
            .unwrap_or_else(|| theme.primary.clone());
        let token = generate_portal_token();

        let id = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO clients (
                   name, slug, portal_token, location, tagline, logo_url, brand_color, brand_theme,
                   overall_health, health_summary, top_issue, action_needed, next_huddle,
                   created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    name,
                    slug,
                    token,
                    payload.location,
                    payload.tagline,
                    payload.logo_url,
                    brand_color,
                    serde_json::to_string(&theme)?,
                    payload.overall_health.unwrap_or_default().as_str(),
                    payload.health_summary.clone().unwrap_or_default(),
                    payload.top_issue.clone().unwrap_or_default(),
                    payload.action_needed.clone().unwrap_or_default(),
                    payload.next_huddle,
                    now,
                ],
            )
            .map_err(|error| map_constraint(error, &format!("client slug '{}' already exists", slug)))?;
            conn.last_insert_rowid()
        };

        self.get_client(id)?
            .ok_or_else(|| AppError::Internal(format!("client {} vanished after insert", id)))
    }

    pub fn get_client(&self, client_id: i64) -> AppResult<Option<ClientRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS);
        Ok(conn.query_row(&sql, [client_id], parse_client_row).optional()?)
    }

    pub fn require_client(&self, client_id: i64) -> AppResult<ClientRecord> {
        self.get_client(client_id)?
            .ok_or_else(|| AppError::NotFound(format!("client {} not found", client_id)))
    }

    pub fn get_client_by_token(&self, portal_token: &str) -> AppResult<Option<ClientRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM clients WHERE portal_token = ?1", CLIENT_COLUMNS);
        Ok(conn.query_row(&sql, [portal_token], parse_client_row).optional()?)
    }

    pub fn list_clients(&self) -> AppResult<Vec<ClientRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM clients ORDER BY name", CLIENT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], parse_client_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Issues a fresh portal token, invalidating the old link.
    pub fn regenerate_portal_token(&self, client_id: i64) -> AppResult<String> {
        let token = generate_portal_token();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE clients SET portal_token = ?1, updated_at = ?2 WHERE id = ?3",
            params![token, Utc::now().to_rfc3339(), client_id],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("client {} not found", client_id)));
        }
        Ok(token)
    }

    pub fn touch_last_accessed(&self, client_id: i64) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE clients SET last_accessed_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), client_id],
        )?;
        Ok(())
    }

    // ─── sections ───────────────────────────────────────────────────────

    /// Replaces a whole section. The payload is validated before anything is written.
    pub fn replace_section(&self, client_id: i64, data: &SectionData) -> AppResult<()> {
        let value = data.to_json()?;
        self.replace_section_json(client_id, data.section(), &value)
    }

    pub fn replace_section_json(
        &self,
        client_id: i64,
        section: Section,
        value: &serde_json::Value,
    ) -> AppResult<()> {
        validate_section(section, value)?;
        let raw = serde_json::to_string(value)?;

        let conn = self.lock()?;
        let sql = format!(
            "UPDATE clients SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            section.column()
        );
        let updated = conn.execute(&sql, params![raw, Utc::now().to_rfc3339(), client_id])?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("client {} not found", client_id)));
        }
        Ok(())
    }

    pub fn read_section_json(&self, client_id: i64, section: Section) -> AppResult<serde_json::Value> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM clients WHERE id = ?1", section.column());
        let raw: Option<String> = conn
            .query_row(&sql, [client_id], |row| row.get(0))
            .optional()?;
        let raw = raw.ok_or_else(|| AppError::NotFound(format!("client {} not found", client_id)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    // ─── sync fields ────────────────────────────────────────────────────

    pub fn set_sync_status(&self, client_id: i64, status: SyncStatus) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE clients SET sync_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), client_id],
        )?;
        Ok(())
    }

    /// Final transition of a run. `last_sync_at` only moves on success.
    pub fn finish_sync(&self, client_id: i64, success: bool) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        if success {
            conn.execute(
                "UPDATE clients SET sync_status = ?1, last_sync_at = ?2, updated_at = ?2 WHERE id = ?3",
                params![SyncStatus::Success.as_str(), now, client_id],
            )?;
        } else {
            conn.execute(
                "UPDATE clients SET sync_status = ?1, updated_at = ?2 WHERE id = ?3",
                params![SyncStatus::Error.as_str(), now, client_id],
            )?;
        }
        Ok(())
    }

    pub fn set_weekly_vibe(&self, client_id: i64, weekly_vibe: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE clients SET weekly_vibe = ?1, updated_at = ?2 WHERE id = ?3",
            params![weekly_vibe, Utc::now().to_rfc3339(), client_id],
        )?;
        Ok(())
    }

    pub fn set_metrics_summary(
        &self,
        client_id: i64,
        narrative: &str,
        raw_metrics: &serde_json::Value,
    ) -> AppResult<()> {
        let raw = serde_json::to_string(raw_metrics)?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE clients SET metrics_narrative = ?1, raw_metrics = ?2, updated_at = ?3 WHERE id = ?4",
            params![narrative, raw, Utc::now().to_rfc3339(), client_id],
        )?;
        Ok(())
    }

    pub fn set_guest_happiness(&self, client_id: i64, happiness: &GuestHappiness) -> AppResult<()> {
        let raw = serde_json::to_string(happiness)?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE clients SET guest_happiness = ?1, updated_at = ?2 WHERE id = ?3",
            params![raw, Utc::now().to_rfc3339(), client_id],
        )?;
        Ok(())
    }

    // ─── integrations ───────────────────────────────────────────────────

    /// Insert or replace the (client, provider) row. Config must already be encrypted.
    pub fn upsert_integration(
        &self,
        client_id: i64,
        provider: Provider,
        encrypted_config: &str,
        enabled: bool,
    ) -> AppResult<IntegrationRecord> {
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.lock()?;
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM clients WHERE id = ?1", [client_id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("client {} not found", client_id)));
            }
            conn.execute(
                "INSERT INTO client_integrations (client_id, provider, config, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (client_id, provider) DO UPDATE SET
                   config = excluded.config,
                   enabled = excluded.enabled,
                   updated_at = excluded.updated_at",
                params![client_id, provider.as_str(), encrypted_config, enabled, now],
            )?;
        }
        self.get_integration(client_id, provider)?.ok_or_else(|| {
            AppError::Internal(format!("integration {} vanished after upsert", provider))
        })
    }

    pub fn get_integration(
        &self,
        client_id: i64,
        provider: Provider,
    ) -> AppResult<Option<IntegrationRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM client_integrations WHERE client_id = ?1 AND provider = ?2",
            INTEGRATION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![client_id, provider.as_str()], parse_integration_row)
            .optional()?)
    }

    pub fn list_integrations(&self, client_id: i64) -> AppResult<Vec<IntegrationRecord>> {
        self.query_integrations(
            &format!(
                "SELECT {} FROM client_integrations WHERE client_id = ?1 ORDER BY provider",
                INTEGRATION_COLUMNS
            ),
            client_id,
        )
    }

    /// Enabled integrations ordered by provider key.
    pub fn enabled_integrations(&self, client_id: i64) -> AppResult<Vec<IntegrationRecord>> {
        self.query_integrations(
            &format!(
                "SELECT {} FROM client_integrations WHERE client_id = ?1 AND enabled = 1 ORDER BY provider",
                INTEGRATION_COLUMNS
            ),
            client_id,
        )
    }

    fn query_integrations(&self, sql: &str, client_id: i64) -> AppResult<Vec<IntegrationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([client_id], parse_integration_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns false when no such integration exists.
    pub fn set_integration_enabled(
        &self,
        client_id: i64,
        provider: Provider,
        enabled: bool,
    ) -> AppResult<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE client_integrations SET enabled = ?1, updated_at = ?2
             WHERE client_id = ?3 AND provider = ?4",
            params![enabled, Utc::now().to_rfc3339(), client_id, provider.as_str()],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_integration(&self, client_id: i64, provider: Provider) -> AppResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM client_integrations WHERE client_id = ?1 AND provider = ?2",
            params![client_id, provider.as_str()],
        )?;
        Ok(deleted > 0)
    }

    pub fn record_integration_success(&self, client_id: i64, provider: Provider) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE client_integrations SET last_synced_at = ?1, sync_error = NULL, updated_at = ?1
             WHERE client_id = ?2 AND provider = ?3",
            params![now, client_id, provider.as_str()],
        )?;
        Ok(())
    }

    /// Stores the error and leaves `last_synced_at` untouched.
    pub fn record_integration_error(
        &self,
        client_id: i64,
        provider: Provider,
        error: &str,
    ) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE client_integrations SET sync_error = ?1, updated_at = ?2
             WHERE client_id = ?3 AND provider = ?4",
            params![error, Utc::now().to_rfc3339(), client_id, provider.as_str()],
        )?;
        Ok(())
    }

    /// Ids of every client with at least one enabled integration, ascending.
    pub fn clients_with_integrations(&self) -> AppResult<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT client_id FROM client_integrations WHERE enabled = 1 ORDER BY client_id",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<i64>, _>>()?)
    }
}

fn map_constraint(error: rusqlite::Error, message: &str) -> AppError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Validation(message.to_string())
        }
        _ => AppError::from(error),
    }
}

fn parse_client_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientRecord> {
    let brand_theme: String = row.get("brand_theme")?;
    let overall_health: String = row.get("overall_health")?;
    let sync_status: String = row.get("sync_status")?;
    let raw_metrics: String = row.get("raw_metrics")?;
    let guest_happiness: Option<String> = row.get("guest_happiness")?;
    let last_sync_at: Option<String> = row.get("last_sync_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let last_accessed_at: Option<String> = row.get("last_accessed_at")?;

    Ok(ClientRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        portal_token: row.get("portal_token")?,
        location: row.get("location")?,
        tagline: row.get("tagline")?,
        logo_url: row.get("logo_url")?,
        brand_color: row.get("brand_color")?,
        brand_theme: parse_json::<BrandTheme>(&brand_theme)?,
        overall_health: parse_health(&overall_health)?,
        health_summary: row.get("health_summary")?,
        top_issue: row.get("top_issue")?,
        action_needed: row.get("action_needed")?,
        next_huddle: row.get("next_huddle")?,
        metrics: parse_json_column(row, "metrics")?,
        requests: parse_json_column(row, "requests")?,
        campaigns: parse_json_column(row, "campaigns")?,
        assets: parse_json_column(row, "assets")?,
        huddles: parse_json_column(row, "huddles")?,
        social_posts: parse_json_column(row, "social_posts")?,
        reviews: parse_json_column(row, "reviews")?,
        positive_themes: parse_json_column(row, "positive_themes")?,
        negative_themes: parse_json_column(row, "negative_themes")?,
        quick_links: parse_json_column(row, "quick_links")?,
        raw_metrics: parse_json(&raw_metrics)?,
        metrics_narrative: row.get("metrics_narrative")?,
        weekly_vibe: row.get("weekly_vibe")?,
        recent_reviews: parse_json_column(row, "recent_reviews")?,
        guest_happiness: guest_happiness.as_deref().map(parse_json).transpose()?,
        last_sync_at: last_sync_at.as_deref().map(parse_time).transpose()?,
        sync_status: parse_sync_status(&sync_status)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
        last_accessed_at: last_accessed_at.as_deref().map(parse_time).transpose()?,
    })
}

fn parse_integration_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IntegrationRecord> {
    let provider: String = row.get("provider")?;
    let last_synced_at: Option<String> = row.get("last_synced_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(IntegrationRecord {
        id: row.get("id")?,
        client_id: row.get("client_id")?,
        provider: parse_provider(&provider)?,
        encrypted_config: row.get("config")?,
        enabled: row.get("enabled")?,
        last_synced_at: last_synced_at.as_deref().map(parse_time).transpose()?,
        sync_error: row.get("sync_error")?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_json_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw)
        .map_err(|error| conversion_error(format!("column {}: {}", column, error)))
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|error| conversion_error(error.to_string()))
}

fn parse_provider(raw: &str) -> rusqlite::Result<Provider> {
    raw.parse::<Provider>().map_err(conversion_error)
}

fn parse_sync_status(raw: &str) -> rusqlite::Result<SyncStatus> {
    match raw {
        "idle" => Ok(SyncStatus::Idle),
        "syncing" => Ok(SyncStatus::Syncing),
        "success" => Ok(SyncStatus::Success),
        "error" => Ok(SyncStatus::Error),
        other => Err(conversion_error(format!("Unknown sync status '{}'", other))),
    }
}

fn parse_health(raw: &str) -> rusqlite::Result<HealthStatus> {
    match raw {
        "on-track" => Ok(HealthStatus::OnTrack),
        "needs-work" => Ok(HealthStatus::NeedsWork),
        "critical" => Ok(HealthStatus::Critical),
        other => Err(conversion_error(format!("Unknown health status '{}'", other))),
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

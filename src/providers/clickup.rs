use super::{optional, read_json, trim_base, ProviderClient, ProviderOutput};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::{
    CampaignStatus, ClickUpData, ClientCampaign, ClientRequest, IntegrationConfig, Milestone,
    MilestoneStatus, Provider, RequestPriority, SocialPost, SocialStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

const SERVICE: &str = "ClickUp";
const DEFAULT_EMOJI: &str = "📋";
const PLATFORM_NAMES: [&str; 8] = [
    "instagram",
    "facebook",
    "tiktok",
    "twitter",
    "linkedin",
    "google",
    "youtube",
    "pinterest",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ClickUpTask {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub due_date: Option<Value>,
    #[serde(default)]
    pub start_date: Option<Value>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Vec<TaskTag>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskPriority {
    pub id: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskTag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomField {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    tasks: Vec<ClickUpTask>,
    #[serde(default)]
    last_page: Option<bool>,
}

pub struct ClickUpClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClickUpClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self {
            http,
            base_url: trim_base(&base_url),
        }
    }

    /// Every task in a list, following pagination until the last page.
    pub async fn fetch_all_tasks(
        &self,
        token: &str,
        list_id: &str,
        include_subtasks: bool,
    ) -> ProviderResult<Vec<ClickUpTask>> {
        let url = format!("{}/list/{}/task", self.base_url, urlencoding::encode(list_id));
        let mut tasks = Vec::new();
        let mut page = 0u32;

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("include_closed", "true".to_string()),
            ];
            if include_subtasks {
                query.push(("subtasks", "true".to_string()));
            }

            let response = self
                .http
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, token)
                .query(&query)
                .send()
                .await?;
            let batch: TaskPage = read_json(SERVICE, response).await?;
            let done = batch.tasks.is_empty() || batch.last_page != Some(false);
            tasks.extend(batch.tasks);
            if done {
                break;
            }
            page += 1;
        }

        tracing::debug!(list_id = %list_id, pages = page + 1, tasks = tasks.len(), "fetched ClickUp list");
        Ok(tasks)
    }
}

#[async_trait]
impl ProviderClient for ClickUpClient {
    fn provider(&self) -> Provider {
        Provider::Clickup
    }

    async fn sync(&self, config: &IntegrationConfig) -> ProviderResult<ProviderOutput> {
        let token = optional(config, "api_token").ok_or_else(|| {
            ProviderError::Configuration("No ClickUp API token configured".to_string())
        })?;
        let now = Utc::now();
        let mut data = ClickUpData::default();

        if let Some(list_id) = optional(config, "campaigns_list_id") {
            match self.fetch_all_tasks(token, list_id, true).await {
                Ok(tasks) => data.campaigns = transform_campaigns(&tasks),
                Err(error) => data.errors.push(format!("Campaigns sync failed: {}", error)),
            }
        }
        if let Some(list_id) = optional(config, "requests_list_id") {
            match self.fetch_all_tasks(token, list_id, false).await {
                Ok(tasks) => data.requests = transform_requests(&tasks),
                Err(error) => data.errors.push(format!("Requests sync failed: {}", error)),
            }
        }
        if let Some(list_id) = optional(config, "social_list_id") {
            match self.fetch_all_tasks(token, list_id, false).await {
                Ok(tasks) => data.social_posts = transform_social_posts(&tasks, now),
                Err(error) => data.errors.push(format!("Social sync failed: {}", error)),
            }
        }

        Ok(ProviderOutput::ClickUp(data))
    }
}

fn status_is_done(status: &str) -> bool {
    let lower = status.to_lowercase();
    ["complete", "closed", "done"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn status_is_active(status: &str) -> bool {
    let lower = status.to_lowercase();
    ["in progress", "active", "in review"]
        .iter()
        .any(|marker| lower.contains(marker))
}

pub fn map_campaign_status(status: &str) -> CampaignStatus {
    if status_is_done(status) {
        CampaignStatus::Completed
    } else if status_is_active(status) {
        CampaignStatus::Active
    } else {
        CampaignStatus::Planning
    }
}

pub fn map_milestone_status(status: &str) -> MilestoneStatus {
    let lower = status.to_lowercase();
    if status_is_done(status) {
        MilestoneStatus::Done
    } else if status_is_active(status) {
        MilestoneStatus::InProgress
    } else if lower.contains("scheduled") || lower.contains("ready") {
        MilestoneStatus::Scheduled
    } else {
        MilestoneStatus::Pending
    }
}

pub fn map_priority(priority: Option<&TaskPriority>) -> RequestPriority {
    let Some(id) = priority.and_then(|priority| value_as_i64(&priority.id)) else {
        return RequestPriority::Normal;
    };
    match id {
        i64::MIN..=2 => RequestPriority::High,
        3 => RequestPriority::Normal,
        _ => RequestPriority::Low,
    }
}

fn map_social_status(task: &ClickUpTask, now: DateTime<Utc>) -> SocialStatus {
    let lower = task.status.status.to_lowercase();
    if ["complete", "done", "posted", "closed"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        return SocialStatus::Posted;
    }
    match parse_millis(task.due_date.as_ref()) {
        Some(due) if due < now => SocialStatus::Missed,
        _ => SocialStatus::Scheduled,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// ClickUp dates are unix milliseconds, sent as strings or numbers.
fn parse_millis(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let millis = value_as_i64(value?)?;
    Utc.timestamp_millis_opt(millis).single()
}

fn format_long(date: DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn format_short(date: DateTime<Utc>) -> String {
    date.format("%b %-d").to_string()
}

pub fn format_window(start: Option<&Value>, due: Option<&Value>) -> String {
    match (parse_millis(start), parse_millis(due)) {
        (Some(start), Some(due)) => format!("{} – {}", format_long(start), format_long(due)),
        (_, Some(due)) => format!("Due {}", format_long(due)),
        _ => "TBD".to_string(),
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32, 0x1F300..=0x1F9FF | 0x2600..=0x26FF | 0x2700..=0x27BF)
}

pub fn emoji_from_tags(tags: &[TaskTag]) -> String {
    tags.iter()
        .flat_map(|tag| tag.name.chars())
        .find(|c| is_emoji(*c))
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_EMOJI.to_string())
}

/// Text of a populated custom field; null, empty, zero and false count as unset.
fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn find_field<'a, F>(fields: &'a [CustomField], matches: F) -> Option<&'a CustomField>
where
    F: Fn(&str) -> bool,
{
    fields.iter().find(|field| matches(&field.name.to_lowercase()))
}

fn campaign_goal(task: &ClickUpTask) -> String {
    find_field(&task.custom_fields, |name| {
        name.contains("goal") || name.contains("objective")
    })
    .and_then(|field| field_text(field.value.as_ref()))
    .unwrap_or_else(|| task.name.clone())
}

fn request_type(task: &ClickUpTask) -> String {
    find_field(&task.custom_fields, |name| {
        name == "type" || name.contains("request type")
    })
    .and_then(|field| field_text(field.value.as_ref()))
    .or_else(|| task.tags.first().map(|tag| tag.name.clone()))
    .unwrap_or_else(|| "Request".to_string())
}

fn social_platform(task: &ClickUpTask) -> String {
    if let Some(platform) = find_field(&task.custom_fields, |name| {
        name == "platform" || name.contains("channel")
    })
    .and_then(|field| field_text(field.value.as_ref()))
    {
        return platform;
    }

    for tag in &task.tags {
        let lower = tag.name.to_lowercase();
        if let Some(name) = PLATFORM_NAMES.iter().find(|name| lower.contains(*name)) {
            let mut chars = name.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
        }
    }
    "Social".to_string()
}

/// Top-level tasks become campaigns; their direct subtasks become milestones.
pub fn transform_campaigns(tasks: &[ClickUpTask]) -> Vec<ClientCampaign> {
    tasks
        .iter()
        .filter(|task| task.parent.is_none())
        .map(|task| {
            let subtasks: Vec<&ClickUpTask> = tasks
                .iter()
                .filter(|candidate| candidate.parent.as_deref() == Some(task.id.as_str()))
                .collect();
            let milestones: Vec<Milestone> = subtasks
                .iter()
                .map(|sub| Milestone {
                    task: sub.name.clone(),
                    due: parse_millis(sub.due_date.as_ref())
                        .map(format_short)
                        .unwrap_or_default(),
                    status: map_milestone_status(&sub.status.status),
                })
                .collect();
            let done = milestones
                .iter()
                .filter(|milestone| milestone.status == MilestoneStatus::Done)
                .count();
            let progress = if milestones.is_empty() {
                0
            } else {
                ((done as f64 / milestones.len() as f64) * 100.0).round() as u8
            };

            ClientCampaign {
                title: task.name.clone(),
                emoji: emoji_from_tags(&task.tags),
                window: format_window(task.start_date.as_ref(), task.due_date.as_ref()),
                status: map_campaign_status(&task.status.status),
                goal: campaign_goal(task),
                progress,
                url: task.url.clone(),
                milestones,
            }
        })
        .collect()
}

/// Open tasks only.
pub fn transform_requests(tasks: &[ClickUpTask]) -> Vec<ClientRequest> {
    tasks
        .iter()
        .filter(|task| !status_is_done(&task.status.status))
        .map(|task| ClientRequest {
            title: task.name.clone(),
            request_type: request_type(task),
            priority: map_priority(task.priority.as_ref()),
            deadline: parse_millis(task.due_date.as_ref())
                .map(format_short)
                .unwrap_or_else(|| "No deadline".to_string()),
            url: task.url.clone(),
        })
        .collect()
}

pub fn transform_social_posts(tasks: &[ClickUpTask], now: DateTime<Utc>) -> Vec<SocialPost> {
    tasks
        .iter()
        .map(|task| SocialPost {
            day: parse_millis(task.due_date.as_ref())
                .map(|due| due.format("%a").to_string())
                .unwrap_or_else(|| "TBD".to_string()),
            platform: social_platform(task),
            content: task.name.clone(),
            status: map_social_status(task, now),
        })
        .collect()
}

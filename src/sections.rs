use crate::errors::{AppError, AppResult};
use crate::models::{
    ClientAsset, ClientCampaign, ClientHuddle, ClientMetric, ClientRequest, IndividualReview,
    QuickLink, ReviewPlatform, SocialPost,
};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// A named JSON-document section of a client. Sections are always replaced
/// wholesale, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Metrics,
    Requests,
    Campaigns,
    Assets,
    Huddles,
    SocialPosts,
    Reviews,
    PositiveThemes,
    NegativeThemes,
    QuickLinks,
    RecentReviews,
}

impl Section {
    pub const ALL: [Section; 11] = [
        Section::Metrics,
        Section::Requests,
        Section::Campaigns,
        Section::Assets,
        Section::Huddles,
        Section::SocialPosts,
        Section::Reviews,
        Section::PositiveThemes,
        Section::NegativeThemes,
        Section::QuickLinks,
        Section::RecentReviews,
    ];

    /// Column name in the `clients` table.
    pub fn column(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Requests => "requests",
            Self::Campaigns => "campaigns",
            Self::Assets => "assets",
            Self::Huddles => "huddles",
            Self::SocialPosts => "social_posts",
            Self::Reviews => "reviews",
            Self::PositiveThemes => "positive_themes",
            Self::NegativeThemes => "negative_themes",
            Self::QuickLinks => "quick_links",
            Self::RecentReviews => "recent_reviews",
        }
    }

    pub fn schema(self) -> Value {
        let string = json!({ "type": "string" });
        let item = match self {
            Self::Metrics => object_schema(&[
                ("label", string.clone()),
                ("value", string.clone()),
                ("target", string.clone()),
                ("status", enum_schema(&["on-track", "needs-work", "critical"])),
            ]),
            Self::Requests => object_schema(&[
                ("title", string.clone()),
                ("type", string.clone()),
                ("priority", enum_schema(&["high", "normal", "low"])),
                ("deadline", string.clone()),
                ("url", string.clone()),
            ]),
            Self::Campaigns => object_schema(&[
                ("title", string.clone()),
                ("emoji", string.clone()),
                ("window", string.clone()),
                ("status", enum_schema(&["active", "planning", "completed"])),
                ("goal", string.clone()),
                ("progress", json!({ "type": "integer", "minimum": 0, "maximum": 100 })),
                ("url", string.clone()),
                (
                    "milestones",
                    json!({
                        "type": "array",
                        "items": object_schema(&[
                            ("task", string.clone()),
                            ("due", string.clone()),
                            ("status", enum_schema(&["done", "in-progress", "pending", "scheduled"])),
                        ]),
                    }),
                ),
            ]),
            Self::Assets => object_schema(&[
                ("category", string.clone()),
                ("icon", string.clone()),
                ("description", string.clone()),
                ("canvaUrl", string.clone()),
            ]),
            Self::Huddles => object_schema(&[
                ("month", string.clone()),
                ("date", string.clone()),
                ("summary", string.clone()),
                ("url", string.clone()),
            ]),
            Self::SocialPosts => object_schema(&[
                ("day", string.clone()),
                ("platform", string.clone()),
                ("content", string.clone()),
                ("status", enum_schema(&["posted", "scheduled", "missed"])),
            ]),
            Self::Reviews => object_schema(&[
                ("platform", string.clone()),
                ("rating", string.clone()),
                ("reviewCount", json!({ "type": "integer", "minimum": 0 })),
                ("responseRate", string.clone()),
            ]),
            Self::PositiveThemes | Self::NegativeThemes => string,
            Self::QuickLinks => object_schema(&[
                ("label", string.clone()),
                ("url", string.clone()),
                ("icon", string.clone()),
            ]),
            Self::RecentReviews => object_schema(&[
                ("platform", string.clone()),
                ("authorName", string.clone()),
                ("rating", json!({ "type": "integer", "minimum": 1, "maximum": 5 })),
                ("text", string.clone()),
                ("reviewDate", string),
            ]),
        };
        json!({ "type": "array", "items": item })
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Section {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().replace('-', "_");
        let normalized = match normalized.as_str() {
            "socialPosts" => "social_posts",
            "positiveThemes" => "positive_themes",
            "negativeThemes" => "negative_themes",
            "quickLinks" => "quick_links",
            "recentReviews" => "recent_reviews",
            other => other,
        };
        Section::ALL
            .into_iter()
            .find(|section| section.column() == normalized)
            .ok_or_else(|| AppError::Validation(format!("unknown section '{}'", raw)))
    }
}

fn object_schema(fields: &[(&str, Value)]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(name, schema)| (name.to_string(), schema.clone()))
        .collect();
    let required: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn enum_schema(values: &[&str]) -> Value {
    json!({ "type": "string", "enum": values })
}

/// Checks a raw section payload against the section's schema.
pub fn validate_section(section: Section, value: &Value) -> AppResult<()> {
    let schema = section.schema();
    let compiled = jsonschema::JSONSchema::compile(&schema).map_err(|error| {
        AppError::Internal(format!("invalid schema for section {}: {}", section, error))
    })?;

    let errors: Vec<String> = match compiled.validate(value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect(),
    };

    if errors.is_empty() {
        return Ok(());
    }
    Err(AppError::Validation(format!(
        "section {} rejected: {}",
        section,
        errors.join("; ")
    )))
}

/// Typed payload for a whole-section replace.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    Metrics(Vec<ClientMetric>),
    Requests(Vec<ClientRequest>),
    Campaigns(Vec<ClientCampaign>),
    Assets(Vec<ClientAsset>),
    Huddles(Vec<ClientHuddle>),
    SocialPosts(Vec<SocialPost>),
    Reviews(Vec<ReviewPlatform>),
    PositiveThemes(Vec<String>),
    NegativeThemes(Vec<String>),
    QuickLinks(Vec<QuickLink>),
    RecentReviews(Vec<IndividualReview>),
}

impl SectionData {
    pub fn section(&self) -> Section {
        match self {
            Self::Metrics(_) => Section::Metrics,
            Self::Requests(_) => Section::Requests,
            Self::Campaigns(_) => Section::Campaigns,
            Self::Assets(_) => Section::Assets,
            Self::Huddles(_) => Section::Huddles,
            Self::SocialPosts(_) => Section::SocialPosts,
            Self::Reviews(_) => Section::Reviews,
            Self::PositiveThemes(_) => Section::PositiveThemes,
            Self::NegativeThemes(_) => Section::NegativeThemes,
            Self::QuickLinks(_) => Section::QuickLinks,
            Self::RecentReviews(_) => Section::RecentReviews,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Metrics(items) => items.is_empty(),
            Self::Requests(items) => items.is_empty(),
            Self::Campaigns(items) => items.is_empty(),
            Self::Assets(items) => items.is_empty(),
            Self::Huddles(items) => items.is_empty(),
            Self::SocialPosts(items) => items.is_empty(),
            Self::Reviews(items) => items.is_empty(),
            Self::PositiveThemes(items) | Self::NegativeThemes(items) => items.is_empty(),
            Self::QuickLinks(items) => items.is_empty(),
            Self::RecentReviews(items) => items.is_empty(),
        }
    }

    pub fn to_json(&self) -> AppResult<Value> {
        let value = match self {
            Self::Metrics(items) => serde_json::to_value(items)?,
            Self::Requests(items) => serde_json::to_value(items)?,
            Self::Campaigns(items) => serde_json::to_value(items)?,
            Self::Assets(items) => serde_json::to_value(items)?,
            Self::Huddles(items) => serde_json::to_value(items)?,
            Self::SocialPosts(items) => serde_json::to_value(items)?,
            Self::Reviews(items) => serde_json::to_value(items)?,
            Self::PositiveThemes(items) | Self::NegativeThemes(items) => serde_json::to_value(items)?,
            Self::QuickLinks(items) => serde_json::to_value(items)?,
            Self::RecentReviews(items) => serde_json::to_value(items)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_section, Section, SectionData};
    use crate::models::{CampaignStatus, ClientCampaign, Milestone, MilestoneStatus};
    use serde_json::json;

    #[test]
    fn typed_campaigns_pass_their_schema() {
        let data = SectionData::Campaigns(vec![ClientCampaign {
            title: "Spring Menu".to_string(),
            emoji: "🌸".to_string(),
            window: "TBD".to_string(),
            status: CampaignStatus::Active,
            goal: "Spring Menu".to_string(),
            progress: 50,
            url: "https://app.clickup.com/t/1".to_string(),
            milestones: vec![Milestone {
                task: "Shoot photos".to_string(),
                due: "Feb 14".to_string(),
                status: MilestoneStatus::InProgress,
            }],
        }]);
        let value = data.to_json().expect("json");
        validate_section(data.section(), &value).expect("valid");
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let error = validate_section(Section::Metrics, &json!({ "label": "x" }))
            .expect_err("object should be rejected");
        assert!(error.to_string().starts_with("VALIDATION_FAILED"));
    }

    #[test]
    fn wrong_enum_value_names_the_path() {
        let error = validate_section(
            Section::SocialPosts,
            &json!([{ "day": "Mon", "platform": "Instagram", "content": "x", "status": "late" }]),
        )
        .expect_err("bad status");
        assert!(error.to_string().contains("/0/status"));
    }

    #[test]
    fn themes_are_string_arrays() {
        validate_section(Section::PositiveThemes, &json!(["Fresh (3 mentions)"])).expect("valid");
        assert!(validate_section(Section::NegativeThemes, &json!([1])).is_err());
    }

    #[test]
    fn section_names_parse_in_both_spellings() {
        assert_eq!("social_posts".parse::<Section>().expect("parse"), Section::SocialPosts);
        assert_eq!("quickLinks".parse::<Section>().expect("parse"), Section::QuickLinks);
        assert!("widgets".parse::<Section>().is_err());
    }
}

use crate::models::IntegrationConfig;
use once_cell::sync::Lazy;
use regex::Regex;

const MASK_FULL: &str = "••••••••";
const MASK_MIDDLE: &str = "••••";
const SENSITIVE_KEY_MARKERS: [&str; 4] = ["token", "secret", "key", "password"];

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----")
                .expect("valid regex"),
            "[REDACTED_PRIVATE_KEY]",
        ),
        (
            Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9_\-\.=]{8,}").expect("valid regex"),
            "Bearer [REDACTED]",
        ),
        (
            Regex::new(r"\bya29\.[A-Za-z0-9_\-\.]{10,}").expect("valid regex"),
            "[REDACTED_ACCESS_TOKEN]",
        ),
        (
            Regex::new(r"\bpk_[A-Za-z0-9_]{10,}").expect("valid regex"),
            "[REDACTED_API_TOKEN]",
        ),
        (
            Regex::new(r#"(?i)\b(api[_-]?key|access_token|assertion|token|secret|password)(["']?\s*[:=]\s*["']?)[A-Za-z0-9_\-\.]{6,}"#)
                .expect("valid regex"),
            "${1}${2}[REDACTED]",
        ),
    ]
});

/// Masks a secret for display: first and last four characters kept when the
/// value is longer than eight characters, fully masked otherwise.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return MASK_FULL.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, MASK_MIDDLE, tail)
}

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Copy of the config with every sensitive value masked.
pub fn mask_config(config: &IntegrationConfig) -> IntegrationConfig {
    config
        .iter()
        .map(|(key, value)| {
            let shown = if is_sensitive_key(key) {
                mask_secret(value)
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

/// Scrubs credentials out of free text such as upstream error bodies before
/// they are stored as an integration's sync error.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    known_secrets: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also replaces these literal values wherever they appear.
    pub fn with_known_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let known_secrets = secrets
            .into_iter()
            .map(Into::into)
            .filter(|secret: &String| secret.len() >= 6)
            .collect();
        Self { known_secrets }
    }

    /// Known secrets are every sensitive value of an integration config.
    pub fn for_config(config: &IntegrationConfig) -> Self {
        Self::with_known_secrets(
            config
                .iter()
                .filter(|(key, _)| is_sensitive_key(key))
                .map(|(_, value)| value.clone()),
        )
    }

    /// Adds process-wide secrets such as API keys held in `AppConfig`.
    pub fn with_additional<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_secrets.extend(Self::with_known_secrets(secrets).known_secrets);
        self
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        if input.is_empty() {
            return RedactionResult {
                content: String::new(),
                redaction_count: 0,
            };
        }

        let mut result = input.to_string();
        let mut redaction_count = 0usize;

        for secret in &self.known_secrets {
            let matches = result.matches(secret.as_str()).count();
            if matches > 0 {
                redaction_count += matches;
                result = result.replace(secret.as_str(), "[REDACTED]");
            }
        }

        for (pattern, replacement) in SECRET_PATTERNS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }
            redaction_count += matches;
            result = pattern.replace_all(&result, *replacement).to_string();
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }
}

//! Notification channel and event types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pipewright_config::{ConfigChange, Environment};
use serde::{Deserialize, Serialize};

/// Supported channel kinds
///
/// A closed set; adding a provider means adding a variant and its payload
/// builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Generic JSON webhook
    Webhook,
    /// Slack-style incoming webhook
    Slack,
    /// Microsoft Teams-style connector card
    Teams,
}

/// Per-channel delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Absolute destination URL
    pub url: String,
    /// Extra headers sent with every delivery
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first failed attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Base backoff delay, doubled per retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl ChannelSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// What a filter matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Regular expression over the configuration key
    KeyPattern,
    /// Exact environment name
    Environment,
}

/// One channel filter
///
/// `include` decides whether a match is required to pass or causes
/// exclusion; a channel receives a notification only when all of its
/// filters pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFilter {
    pub filter_type: FilterType,
    pub pattern: String,
    pub include: bool,
}

/// A registered notification destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    /// Unique channel id
    pub id: String,
    pub channel_type: ChannelType,
    pub settings: ChannelSettings,
    #[serde(default)]
    pub filters: Vec<ChannelFilter>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Partial channel update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub settings: Option<ChannelSettings>,
    pub filters: Option<Vec<ChannelFilter>>,
    pub enabled: Option<bool>,
}

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

/// A change-independent notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigNotification {
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    pub timestamp: DateTime<Utc>,
}

impl ConfigNotification {
    /// Build the standard notification for a configuration change
    pub fn from_change(change: &ConfigChange) -> Self {
        let action = match (&change.old_value, &change.new_value) {
            (None, Some(_)) => "created",
            (Some(_), None) => "deleted",
            _ => "updated",
        };
        Self {
            title: format!("Configuration {action}: {}", change.key),
            message: format!(
                "'{}' was {action} in {} (source: {})",
                change.key,
                change
                    .environment
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "global scope".to_string()),
                change.source
            ),
            severity: NotificationSeverity::Info,
            key: Some(change.key.clone()),
            environment: change.environment,
            timestamp: change.timestamp,
        }
    }
}

/// Lifecycle and delivery events observable by subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    ChannelAdded { id: String },
    ChannelRemoved { id: String },
    NotificationSent { channel_id: String },
    NotificationFailed { channel_id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_serde_defaults() {
        let channel: NotificationChannel = serde_json::from_value(json!({
            "id": "ops",
            "channel_type": "webhook",
            "settings": { "url": "https://example.com/hook" }
        }))
        .unwrap();
        assert!(channel.enabled);
        assert_eq!(channel.settings.retry_count, 3);
        assert!(channel.filters.is_empty());
    }

    #[test]
    fn test_unsupported_channel_type_rejected_at_parse() {
        let result: Result<NotificationChannel, _> = serde_json::from_value(json!({
            "id": "ops",
            "channel_type": "pager",
            "settings": { "url": "https://example.com/hook" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_notification_from_change_describes_action() {
        let change = ConfigChange {
            key: "db.host".to_string(),
            old_value: None,
            new_value: Some(json!("x")),
            environment: Some(Environment::Production),
            timestamp: Utc::now(),
            source: "config-manager".to_string(),
        };
        let notification = ConfigNotification::from_change(&change);
        assert!(notification.title.contains("created"));
        assert_eq!(notification.environment, Some(Environment::Production));
    }
}

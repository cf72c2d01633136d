//! Configuration change notifier
//!
//! Holds the registered channels, evaluates their filters against each
//! change, and drives delivery with retry. Lifecycle and delivery
//! outcomes are emitted as events rather than logged-and-lost.

use std::collections::HashMap;

use chrono::Utc;
use pipewright_config::{ChangeSink, ConfigChange, Environment};
use regex::Regex;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::{
    delivery,
    error::{NotifyError, Result},
    events::EventBus,
    types::{
        ChannelFilter, ChannelUpdate, ConfigNotification, FilterType, NotificationChannel,
        NotificationSeverity, NotifierEvent,
    },
};

/// Channel registry and delivery coordinator
pub struct ConfigNotifier {
    channels: RwLock<HashMap<String, NotificationChannel>>,
    client: reqwest::Client,
    events: EventBus,
}

impl ConfigNotifier {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
            events: EventBus::new(),
        }
    }

    /// Subscribe to lifecycle and delivery events
    pub fn subscribe(&self) -> broadcast::Receiver<NotifierEvent> {
        self.events.subscribe()
    }

    /// Register a channel after validating its settings
    pub async fn add_channel(&self, channel: NotificationChannel) -> Result<()> {
        validate_channel(&channel)?;
        let mut channels = self.channels.write().await;
        if channels.contains_key(&channel.id) {
            return Err(NotifyError::DuplicateChannel {
                id: channel.id.clone(),
            });
        }
        let id = channel.id.clone();
        channels.insert(id.clone(), channel);
        drop(channels);
        debug!(channel = %id, "notification channel added");
        self.events.emit(NotifierEvent::ChannelAdded { id });
        Ok(())
    }

    /// Remove a channel by id
    pub async fn remove_channel(&self, id: &str) -> Result<()> {
        let mut channels = self.channels.write().await;
        if channels.remove(id).is_none() {
            return Err(NotifyError::ChannelNotFound { id: id.to_string() });
        }
        drop(channels);
        self.events.emit(NotifierEvent::ChannelRemoved {
            id: id.to_string(),
        });
        Ok(())
    }

    /// Apply a partial update to a channel
    pub async fn update_channel(&self, id: &str, update: ChannelUpdate) -> Result<()> {
        let mut channels = self.channels.write().await;
        let channel = channels
            .get_mut(id)
            .ok_or_else(|| NotifyError::ChannelNotFound { id: id.to_string() })?;

        let mut updated = channel.clone();
        if let Some(settings) = update.settings {
            updated.settings = settings;
        }
        if let Some(filters) = update.filters {
            updated.filters = filters;
        }
        if let Some(enabled) = update.enabled {
            updated.enabled = enabled;
        }
        validate_channel(&updated)?;
        *channel = updated;
        Ok(())
    }

    pub async fn get_channel(&self, id: &str) -> Result<NotificationChannel> {
        let channels = self.channels.read().await;
        channels
            .get(id)
            .cloned()
            .ok_or_else(|| NotifyError::ChannelNotFound { id: id.to_string() })
    }

    pub async fn get_channels(&self) -> Vec<NotificationChannel> {
        let channels = self.channels.read().await;
        let mut list: Vec<NotificationChannel> = channels.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Deliver a configuration change to every channel whose filters pass
    pub async fn notify_change(&self, change: &ConfigChange) {
        let notification = ConfigNotification::from_change(change);
        self.fan_out(&notification).await;
    }

    /// Deliver a direct notification (e.g. a validation alert)
    pub async fn notify(&self, notification: &ConfigNotification) {
        self.fan_out(notification).await;
    }

    /// Send a synthetic test notification through the normal path
    pub async fn test_channel(&self, id: &str) -> Result<()> {
        let channel = self.get_channel(id).await?;
        let notification = ConfigNotification {
            title: "Pipewright test notification".to_string(),
            message: format!("Channel '{id}' is reachable"),
            severity: NotificationSeverity::Info,
            key: None,
            environment: None,
            timestamp: Utc::now(),
        };
        match delivery::deliver(&self.client, &channel, &notification).await {
            Ok(()) => {
                self.events.emit(NotifierEvent::NotificationSent {
                    channel_id: id.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                self.events.emit(NotifierEvent::NotificationFailed {
                    channel_id: id.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn fan_out(&self, notification: &ConfigNotification) {
        let eligible: Vec<NotificationChannel> = {
            let channels = self.channels.read().await;
            channels
                .values()
                .filter(|c| c.enabled && filters_pass(&c.filters, notification))
                .cloned()
                .collect()
        };

        for channel in eligible {
            match delivery::deliver(&self.client, &channel, notification).await {
                Ok(()) => {
                    self.events.emit(NotifierEvent::NotificationSent {
                        channel_id: channel.id.clone(),
                    });
                }
                Err(e) => {
                    warn!(channel = %channel.id, error = %e, "notification delivery failed");
                    self.events.emit(NotifierEvent::NotificationFailed {
                        channel_id: channel.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl Default for ConfigNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// The notifier plugs into the configuration manager as its change sink
#[async_trait::async_trait]
impl ChangeSink for ConfigNotifier {
    async fn deliver(&self, change: ConfigChange) {
        self.notify_change(&change).await;
    }
}

fn validate_channel(channel: &NotificationChannel) -> Result<()> {
    if channel.id.trim().is_empty() {
        return Err(NotifyError::Channel {
            message: "channel id must not be empty".to_string(),
        });
    }
    let url = Url::parse(&channel.settings.url)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(NotifyError::Channel {
            message: format!(
                "channel '{}' has unsupported URL scheme '{}'",
                channel.id,
                url.scheme()
            ),
        });
    }
    for filter in &channel.filters {
        if filter.filter_type == FilterType::KeyPattern {
            Regex::new(&filter.pattern).map_err(|e| NotifyError::InvalidFilter {
                pattern: filter.pattern.clone(),
                message: e.to_string(),
            })?;
        }
    }
    Ok(())
}

fn filters_pass(filters: &[ChannelFilter], notification: &ConfigNotification) -> bool {
    filters.iter().all(|filter| {
        let matched = match filter.filter_type {
            FilterType::KeyPattern => notification
                .key
                .as_deref()
                .map(|key| {
                    Regex::new(&filter.pattern)
                        .map(|re| re.is_match(key))
                        .unwrap_or(false)
                })
                .unwrap_or(false),
            FilterType::Environment => notification
                .environment
                .map(|env: Environment| env.as_str() == filter.pattern)
                .unwrap_or(false),
        };
        if filter.include {
            matched
        } else {
            !matched
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelSettings, ChannelType};

    fn channel(id: &str, url: &str) -> NotificationChannel {
        NotificationChannel {
            id: id.to_string(),
            channel_type: ChannelType::Webhook,
            settings: ChannelSettings::new(url),
            filters: vec![],
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_add_remove_and_duplicate_channels() {
        let notifier = ConfigNotifier::new();
        notifier
            .add_channel(channel("ops", "https://example.com/hook"))
            .await
            .unwrap();
        assert!(matches!(
            notifier
                .add_channel(channel("ops", "https://example.com/hook"))
                .await,
            Err(NotifyError::DuplicateChannel { .. })
        ));

        notifier.remove_channel("ops").await.unwrap();
        assert!(matches!(
            notifier.remove_channel("ops").await,
            Err(NotifyError::ChannelNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_urls_rejected() {
        let notifier = ConfigNotifier::new();
        assert!(notifier
            .add_channel(channel("bad", "not a url"))
            .await
            .is_err());
        assert!(notifier
            .add_channel(channel("bad", "ftp://example.com/x"))
            .await
            .is_err());
        assert!(notifier.get_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_filter_regex_rejected() {
        let notifier = ConfigNotifier::new();
        let mut bad = channel("ops", "https://example.com/hook");
        bad.filters.push(ChannelFilter {
            filter_type: FilterType::KeyPattern,
            pattern: "[unclosed".to_string(),
            include: true,
        });
        assert!(matches!(
            notifier.add_channel(bad).await,
            Err(NotifyError::InvalidFilter { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_channel_partially() {
        let notifier = ConfigNotifier::new();
        notifier
            .add_channel(channel("ops", "https://example.com/hook"))
            .await
            .unwrap();
        notifier
            .update_channel(
                "ops",
                ChannelUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!notifier.get_channel("ops").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_test_channel_unknown_id_fails() {
        let notifier = ConfigNotifier::new();
        assert!(matches!(
            notifier.test_channel("ghost").await,
            Err(NotifyError::ChannelNotFound { .. })
        ));
    }

    #[test]
    fn test_filter_semantics() {
        let notification = ConfigNotification {
            title: String::new(),
            message: String::new(),
            severity: NotificationSeverity::Info,
            key: Some("db.host".to_string()),
            environment: Some(Environment::Production),
            timestamp: Utc::now(),
        };

        let include_prod = vec![ChannelFilter {
            filter_type: FilterType::Environment,
            pattern: "production".to_string(),
            include: true,
        }];
        assert!(filters_pass(&include_prod, &notification));

        let exclude_prod = vec![ChannelFilter {
            filter_type: FilterType::Environment,
            pattern: "production".to_string(),
            include: false,
        }];
        assert!(!filters_pass(&exclude_prod, &notification));

        let key_filter = vec![ChannelFilter {
            filter_type: FilterType::KeyPattern,
            pattern: "^db\\.".to_string(),
            include: true,
        }];
        assert!(filters_pass(&key_filter, &notification));

        // All filters must pass together.
        let both = vec![
            ChannelFilter {
                filter_type: FilterType::KeyPattern,
                pattern: "^db\\.".to_string(),
                include: true,
            },
            ChannelFilter {
                filter_type: FilterType::Environment,
                pattern: "staging".to_string(),
                include: true,
            },
        ];
        assert!(!filters_pass(&both, &notification));
    }
}

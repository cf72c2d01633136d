//! Per-channel-type payload shapes and retrying delivery

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    error::{NotifyError, Result},
    types::{ChannelType, ConfigNotification, NotificationChannel, NotificationSeverity},
};

/// Build the provider-specific payload for a notification
pub fn build_payload(channel_type: ChannelType, notification: &ConfigNotification) -> Result<Value> {
    Ok(match channel_type {
        ChannelType::Webhook => serde_json::to_value(notification)?,
        ChannelType::Slack => json!({
            "text": notification.title,
            "attachments": [{
                "color": severity_color(notification.severity),
                "text": notification.message,
                "fields": [
                    {
                        "title": "Key",
                        "value": notification.key.clone().unwrap_or_else(|| "-".to_string()),
                        "short": true
                    },
                    {
                        "title": "Environment",
                        "value": notification
                            .environment
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "global".to_string()),
                        "short": true
                    }
                ],
                "ts": notification.timestamp.timestamp()
            }]
        }),
        ChannelType::Teams => json!({
            "@type": "MessageCard",
            "@context": "https://schema.org/extensions",
            "themeColor": severity_color(notification.severity).trim_start_matches('#'),
            "summary": notification.title,
            "title": notification.title,
            "text": notification.message,
            "sections": [{
                "facts": [
                    {
                        "name": "Key",
                        "value": notification.key.clone().unwrap_or_else(|| "-".to_string())
                    },
                    {
                        "name": "Environment",
                        "value": notification
                            .environment
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "global".to_string())
                    }
                ]
            }]
        }),
    })
}

fn severity_color(severity: NotificationSeverity) -> &'static str {
    match severity {
        NotificationSeverity::Info => "#36a64f",
        NotificationSeverity::Warning => "#ffae42",
        NotificationSeverity::Error => "#d00000",
    }
}

/// POST a notification to a channel, retrying with doubling backoff
///
/// Attempts `1 + retry_count` deliveries; each attempt is bounded by the
/// channel's timeout.
pub async fn deliver(
    client: &reqwest::Client,
    channel: &NotificationChannel,
    notification: &ConfigNotification,
) -> Result<()> {
    let payload = build_payload(channel.channel_type, notification)?;
    let timeout = Duration::from_secs(channel.settings.timeout_secs);

    let mut last_error = String::new();
    for attempt in 0..=channel.settings.retry_count {
        if attempt > 0 {
            let backoff = backoff_ms(channel.settings.retry_delay_ms, attempt);
            debug!(
                channel = %channel.id,
                attempt,
                backoff_ms = backoff,
                "retrying notification delivery"
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }

        let mut request = client
            .post(&channel.settings.url)
            .timeout(timeout)
            .json(&payload);
        for (name, value) in &channel.settings.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(channel = %channel.id, attempt, "notification delivered");
                return Ok(());
            }
            Ok(response) => {
                last_error = format!("HTTP {}", response.status());
            }
            Err(e) => {
                last_error = e.to_string();
            }
        }
        warn!(channel = %channel.id, attempt, error = %last_error, "delivery attempt failed");
    }

    Err(NotifyError::Delivery {
        channel_id: channel.id.clone(),
        message: last_error,
    })
}

/// Doubling backoff before retry `attempt`, saturating instead of
/// overflowing for large retry counts.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

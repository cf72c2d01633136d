//! End-to-end notifier tests against a mock HTTP endpoint

use chrono::Utc;
use pipewright_config::{ConfigChange, Environment};
use pipewright_notify::{
    ChannelFilter, ChannelSettings, ChannelType, ConfigNotifier, FilterType, NotificationChannel,
    NotifierEvent,
};
use serde_json::json;

fn webhook_channel(id: &str, url: &str) -> NotificationChannel {
    NotificationChannel {
        id: id.to_string(),
        channel_type: ChannelType::Webhook,
        settings: ChannelSettings::new(url),
        filters: vec![],
        enabled: true,
    }
}

fn change(key: &str, environment: Option<Environment>) -> ConfigChange {
    ConfigChange {
        key: key.to_string(),
        old_value: None,
        new_value: Some(json!("v1")),
        environment,
        timestamp: Utc::now(),
        source: "test".to_string(),
    }
}

#[tokio::test]
async fn test_change_delivered_to_webhook() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .match_header("content-type", "application/json")
        .with_status(200)
        .create_async()
        .await;

    let notifier = ConfigNotifier::new();
    let mut events = notifier.subscribe();
    notifier
        .add_channel(webhook_channel("ops", &format!("{}/hook", server.url())))
        .await
        .unwrap();
    // Consume the ChannelAdded event.
    assert!(matches!(
        events.recv().await.unwrap(),
        NotifierEvent::ChannelAdded { .. }
    ));

    notifier
        .notify_change(&change("db.host", Some(Environment::Production)))
        .await;

    mock.assert_async().await;
    assert_eq!(
        events.recv().await.unwrap(),
        NotifierEvent::NotificationSent {
            channel_id: "ops".to_string()
        }
    );
}

#[tokio::test]
async fn test_environment_filter_gates_delivery() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/prod-only")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let notifier = ConfigNotifier::new();
    let mut channel = webhook_channel("prod-ops", &format!("{}/prod-only", server.url()));
    channel.filters.push(ChannelFilter {
        filter_type: FilterType::Environment,
        pattern: "production".to_string(),
        include: true,
    });
    notifier.add_channel(channel).await.unwrap();

    // Staging change is filtered out, production change is delivered.
    notifier
        .notify_change(&change("db.host", Some(Environment::Staging)))
        .await;
    notifier
        .notify_change(&change("db.host", Some(Environment::Production)))
        .await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_disabled_channel_skipped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let notifier = ConfigNotifier::new();
    let mut channel = webhook_channel("ops", &format!("{}/hook", server.url()));
    channel.enabled = false;
    notifier.add_channel(channel).await.unwrap();

    notifier
        .notify_change(&change("db.host", Some(Environment::Development)))
        .await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_delivery_emits_event() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/hook")
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;

    let notifier = ConfigNotifier::new();
    let mut events = notifier.subscribe();
    let mut channel = webhook_channel("ops", &format!("{}/hook", server.url()));
    channel.settings.retry_count = 1;
    channel.settings.retry_delay_ms = 10;
    notifier.add_channel(channel).await.unwrap();
    events.recv().await.unwrap();

    notifier
        .notify_change(&change("db.host", Some(Environment::Development)))
        .await;

    assert!(matches!(
        events.recv().await.unwrap(),
        NotifierEvent::NotificationFailed { .. }
    ));
}

#[tokio::test]
async fn test_test_channel_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(200)
        .create_async()
        .await;

    let notifier = ConfigNotifier::new();
    notifier
        .add_channel(webhook_channel("ops", &format!("{}/hook", server.url())))
        .await
        .unwrap();
    notifier.test_channel("ops").await.unwrap();

    mock.assert_async().await;
}

//! Configuration change notifications for pipewright
//!
//! Fans configuration changes out to webhook, Slack, and Microsoft Teams
//! channels. Each channel carries its own delivery settings and filters,
//! and the notifier retries failed deliveries with a doubling backoff.

pub mod delivery;
pub mod error;
pub mod events;
pub mod notifier;
pub mod types;

pub use error::{NotifyError, Result};
pub use events::EventBus;
pub use notifier::ConfigNotifier;
pub use types::{
    ChannelFilter, ChannelSettings, ChannelType, ChannelUpdate, ConfigNotification, FilterType,
    NotificationChannel, NotificationSeverity, NotifierEvent,
};

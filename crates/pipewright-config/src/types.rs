//! Core configuration types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Deployment environment scope
///
/// Configuration values may differ per environment; `None` in an
/// `Option<Environment>` scope means the global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// All known environments
    pub fn all() -> &'static [Environment] {
        &[
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ]
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: {other}")),
        }
    }
}

/// A single observed configuration change
///
/// Immutable once created; this is the unit delivered to watchers and
/// notification channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChange {
    /// Dot-delimited configuration key
    pub key: String,
    /// Value before the write, if any
    pub old_value: Option<Value>,
    /// Value after the write; `None` for deletions
    pub new_value: Option<Value>,
    /// Environment scope of the change
    pub environment: Option<Environment>,
    /// When the change was applied
    pub timestamp: DateTime<Utc>,
    /// Logical originator of the change
    pub source: String,
}

/// One entry in a key's version history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigVersion {
    /// Unique version identifier
    pub version_id: Uuid,
    /// Configuration key this version belongs to
    pub key: String,
    /// Value recorded at this version
    pub value: Value,
    /// When the version was recorded
    pub timestamp: DateTime<Utc>,
}

/// Ordered version history for a key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigHistory {
    /// Versions oldest first
    pub versions: Vec<ConfigVersion>,
    /// Identifier of the most recent version, if any
    pub current_version: Option<Uuid>,
}

/// Result of validating a configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Receiver of configuration changes, decoupled from any concrete notifier
///
/// The manager dispatches changes to a sink on a background task; delivery
/// failures are the sink's to report.
#[async_trait::async_trait]
pub trait ChangeSink: Send + Sync {
    async fn deliver(&self, change: ConfigChange);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_environment_round_trip() {
        for env in Environment::all() {
            assert_eq!(Environment::from_str(env.as_str()).unwrap(), *env);
        }
    }

    #[test]
    fn test_environment_aliases() {
        assert_eq!(
            Environment::from_str("prod").unwrap(),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str("dev").unwrap(),
            Environment::Development
        );
        assert!(Environment::from_str("qa").is_err());
    }

    #[test]
    fn test_environment_serde_lowercase() {
        let json = serde_json::to_string(&Environment::Production).unwrap();
        assert_eq!(json, "\"production\"");
    }

    #[test]
    fn test_validation_report_with_errors() {
        let report = ValidationReport::with_errors(vec!["bad".to_string()]);
        assert!(!report.valid);
        assert!(ValidationReport::with_errors(vec![]).valid);
    }
}

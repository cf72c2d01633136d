//! Access audit log for secret operations

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    clock::Clock,
    types::{AccessLogEntry, AccessOperation},
};

const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Bounded in-memory access log
///
/// Every store/retrieve/rotate/delete is recorded; failed accesses count
/// as violations in the compliance report.
pub struct AccessLog {
    entries: RwLock<Vec<AccessLogEntry>>,
    max_entries: usize,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn record(
        &self,
        clock: &dyn Clock,
        key: &str,
        operation: AccessOperation,
        success: bool,
    ) {
        let entry = AccessLogEntry {
            id: Uuid::new_v4(),
            key: key.to_string(),
            operation,
            timestamp: clock.now(),
            success,
        };
        let mut entries = self.entries.write().await;
        entries.push(entry);
        let excess = entries.len().saturating_sub(self.max_entries);
        if excess > 0 {
            entries.drain(..excess);
        }
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: usize) -> Vec<AccessLogEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Number of failed accesses on record
    pub async fn violation_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.iter().filter(|e| !e.success).count()
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let log = AccessLog::new();
        let clock = SystemClock;
        log.record(&clock, "a", AccessOperation::Store, true).await;
        log.record(&clock, "b", AccessOperation::Retrieve, true).await;

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].key, "b");
    }

    #[tokio::test]
    async fn test_violations_counted() {
        let log = AccessLog::new();
        let clock = SystemClock;
        log.record(&clock, "a", AccessOperation::Retrieve, false).await;
        log.record(&clock, "a", AccessOperation::Retrieve, true).await;
        assert_eq!(log.violation_count().await, 1);
    }

    #[tokio::test]
    async fn test_retention_drops_oldest() {
        let log = AccessLog::with_max_entries(2);
        let clock = SystemClock;
        for key in ["a", "b", "c"] {
            log.record(&clock, key, AccessOperation::Store, true).await;
        }
        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].key, "c");
        assert_eq!(recent[1].key, "b");
    }
}

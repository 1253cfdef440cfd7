use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use super::{JsonStore, LOGS_DIR, read_for_append, read_json, write_json_atomic};
use crate::core::ActivityEntry;
use crate::error::Result;

impl JsonStore {
    fn activity_log_path(&self, day: NaiveDate) -> std::path::PathBuf {
        self.root
            .join(LOGS_DIR)
            .join(format!("activity_log_{}.json", day.format("%Y%m%d")))
    }

    /// Appends to the day's activity log. Failures are logged, never returned.
    pub fn log_activity(
        &self,
        user_id: &str,
        activity_type: &str,
        details: Value,
        now: DateTime<Utc>,
    ) {
        let entry = ActivityEntry {
            timestamp: now,
            user_id: user_id.to_string(),
            activity_type: activity_type.to_string(),
            details,
        };
        if let Err(e) = self.append_activity(entry) {
            warn!(user_id, activity_type, error = %e, "failed to record activity");
        }
    }

    fn append_activity(&self, entry: ActivityEntry) -> Result<()> {
        let path = self.activity_log_path(entry.timestamp.date_naive());
        let mut entries: Vec<ActivityEntry> = read_for_append(&path)?;
        entries.push(entry);
        write_json_atomic(&path, &entries)
    }

    pub fn activity_for_day(&self, day: NaiveDate) -> Result<Vec<ActivityEntry>> {
        Ok(read_json(&self.activity_log_path(day))?.unwrap_or_default())
    }
}

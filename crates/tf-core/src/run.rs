//! Run identity threaded through every lineage column.

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// Unique identifier of one pipeline run.
    pub struct RunId;
}

/// Identity and clock of a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: RunId,
    pub run_timestamp: DateTime<Utc>,
}

impl RunContext {
    /// Start a run at the current time with a generated id
    pub fn start() -> Self {
        Self::at(Utc::now())
    }

    /// Start a run at a given time with a generated id
    pub fn at(run_timestamp: DateTime<Utc>) -> Self {
        // Stored timestamps carry microseconds at most.
        let run_timestamp = run_timestamp.trunc_subsecs(6);
        let suffix = Uuid::new_v4().simple().to_string();
        let run_id = RunId::new(format!(
            "run_{}_{}",
            run_timestamp.format("%Y%m%dT%H%M%S%z"),
            &suffix[..8]
        ));
        Self {
            run_id,
            run_timestamp,
        }
    }

    /// Run with caller-supplied identity
    pub fn with_id(run_id: RunId, run_timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id,
            run_timestamp: run_timestamp.trunc_subsecs(6),
        }
    }

    /// Partition value for layer outputs, e.g. `2024-03-15`
    pub fn ingest_date(&self) -> String {
        self.run_timestamp.format("%Y-%m-%d").to_string()
    }

    /// Date path for landing and archive copies, e.g. `2024/03/15`
    pub fn date_path(&self) -> String {
        self.run_timestamp.format("%Y/%m/%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generated_run_id_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let run = RunContext::at(ts);
        assert!(run.run_id.starts_with("run_20240315T103000+0000_"));
        assert_eq!(run.run_id.len(), "run_20240315T103000+0000_".len() + 8);
    }

    #[test]
    fn test_generated_run_ids_are_unique() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        assert_ne!(RunContext::at(ts).run_id, RunContext::at(ts).run_id);
    }

    #[test]
    fn test_partition_paths() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 23, 59, 0).unwrap();
        let run = RunContext::with_id(RunId::new("run_a"), ts);
        assert_eq!(run.ingest_date(), "2024-03-05");
        assert_eq!(run.date_path(), "2024/03/05");
    }

    #[test]
    fn test_run_id_rejects_empty() {
        assert!(RunId::try_new("").is_none());
    }
}

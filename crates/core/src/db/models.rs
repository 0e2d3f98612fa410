use serde::{Deserialize, Serialize};

use crate::recovery::{RecoveryMode, RunResult, RunStatus};

/// Allowed status values for persisted recovery runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunRecordStatus {
    Succeeded,
    Canceled,
    Failed,
}

impl RunRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunRecordStatus::Succeeded => "succeeded",
            RunRecordStatus::Canceled => "canceled",
            RunRecordStatus::Failed => "failed",
        }
    }

    /// Status to record for a run that returned a result.
    pub fn for_result(result: &RunResult) -> Self {
        match result.status {
            RunStatus::Completed => RunRecordStatus::Succeeded,
            RunStatus::Cancelled => RunRecordStatus::Canceled,
        }
    }
}

impl std::str::FromStr for RunRecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" => Ok(RunRecordStatus::Succeeded),
            "canceled" | "cancelled" => Ok(RunRecordStatus::Canceled),
            "failed" => Ok(RunRecordStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Bookkeeping row for one recovery run over one binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryRunRecord {
    /// Row id; `None` until the record has been stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub binary: String,
    pub mode: RecoveryMode,
    pub binary_hash: Option<String>,
    pub status: RunRecordStatus,
    pub accepted: u64,
    pub rejected: u64,
    /// Failure message for runs that aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

impl RecoveryRunRecord {
    /// Record summarizing a finished run.
    pub fn from_result(
        binary: impl Into<String>,
        binary_hash: Option<String>,
        result: &RunResult,
        started_at: impl Into<String>,
        finished_at: impl Into<String>,
    ) -> Self {
        let accepted = match result.mode {
            RecoveryMode::ReadOnlyData => result.slices.len(),
            RecoveryMode::Code => result.resized.len(),
        };
        Self {
            id: None,
            binary: binary.into(),
            mode: result.mode,
            binary_hash,
            status: RunRecordStatus::for_result(result),
            accepted: accepted as u64,
            rejected: result.rejections.len() as u64,
            error: None,
            started_at: started_at.into(),
            finished_at: finished_at.into(),
        }
    }
}

/// A rejection as read back from the database.
///
/// Only the label and rendered message are stored, not the structured reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRejection {
    pub address: u64,
    pub reason: String,
    pub detail: String,
}

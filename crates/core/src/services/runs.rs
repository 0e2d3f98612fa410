use chrono::Utc;
use log::{info, warn};

use crate::db::{ProjectContext, RecoveryRunRecord, RunRecordStatus};
use crate::host::AnalysisHost;
use crate::recovery::{
    recover_from_code, recover_from_readonly_data, CancellationToken, RecoveryConfig,
    RecoveryContext, RecoveryError, RecoveryMode, RunResult,
};

/// What to run and how to label it in the run history.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub binary_name: String,
    pub binary_hash: Option<String>,
    pub mode: RecoveryMode,
    pub config: RecoveryConfig,
    pub cancel: CancellationToken,
}

impl RunRequest {
    pub fn new(binary_name: impl Into<String>, mode: RecoveryMode, config: RecoveryConfig) -> Self {
        Self {
            binary_name: binary_name.into(),
            binary_hash: None,
            mode,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_binary_hash(mut self, hash: Option<String>) -> Self {
        self.binary_hash = hash;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// A finished run together with its row id, when it could be recorded.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Option<i64>,
    pub result: RunResult,
}

/// Coordinator that ties project context + analysis host to persist run results.
pub struct RecoveryRunner<'a> {
    pub ctx: &'a ProjectContext,
}

impl<'a> RecoveryRunner<'a> {
    pub fn new(ctx: &'a ProjectContext) -> Self {
        Self { ctx }
    }

    /// Run one entry point against `host` and record it.
    ///
    /// Failed runs are recorded with status `failed` before the error is
    /// returned. Recording problems are logged only.
    pub fn run<H: AnalysisHost + ?Sized>(
        &self,
        host: &mut H,
        request: &RunRequest,
    ) -> Result<RunOutcome, RecoveryError> {
        let started_at = Utc::now().to_rfc3339();
        let outcome = {
            let mut run_ctx = RecoveryContext::new(host, request.config.clone())
                .with_cancellation(request.cancel.clone());
            match request.mode {
                RecoveryMode::ReadOnlyData => recover_from_readonly_data(&mut run_ctx),
                RecoveryMode::Code => recover_from_code(&mut run_ctx),
            }
        };
        let finished_at = Utc::now().to_rfc3339();

        match outcome {
            Ok(result) => {
                let record = RecoveryRunRecord::from_result(
                    request.binary_name.clone(),
                    request.binary_hash.clone(),
                    &result,
                    started_at,
                    finished_at,
                );
                let run_id = self.record(&record, Some(&result));
                Ok(RunOutcome { run_id, result })
            }
            Err(err) => {
                let record = RecoveryRunRecord {
                    id: None,
                    binary: request.binary_name.clone(),
                    mode: request.mode,
                    binary_hash: request.binary_hash.clone(),
                    status: RunRecordStatus::Failed,
                    accepted: 0,
                    rejected: 0,
                    error: Some(err.to_string()),
                    started_at,
                    finished_at,
                };
                self.record(&record, None);
                Err(err)
            }
        }
    }

    fn record(&self, record: &RecoveryRunRecord, result: Option<&RunResult>) -> Option<i64> {
        let run_id = match self.ctx.db.insert_recovery_run(record) {
            Ok(id) => id,
            Err(err) => {
                warn!("Failed to record recovery run for {}: {err}", record.binary);
                return None;
            }
        };
        if let Some(result) = result {
            if let Err(err) = self.ctx.db.insert_run_result(run_id, result) {
                warn!("Failed to record details of run {run_id}: {err}");
            }
        }
        info!("Recorded {} run {run_id} for {}", record.mode.as_str(), record.binary);
        Some(run_id)
    }
}

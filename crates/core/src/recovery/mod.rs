//! String-slice recovery pipeline.
//!
//! Two entry points share the read-only region classifier:
//! - [`recover_from_readonly_data`]: typed pointers into read-only memory whose
//!   following word is a plausible length, validated as UTF-8 and annotated
//!   with a (pointer, length) slice type.
//! - [`recover_from_code`]: byte arrays whose length is guessed from a constant
//!   loaded next to their address in the same basic block.
//!
//! Each run is single-threaded, checks its [`CancellationToken`] before every
//! candidate, and wraps all of its edits in one host edit batch.

pub mod annotate;
pub mod code_path;
pub mod config;
pub mod length;
pub mod regions;
pub mod scanner;
pub mod validate;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::{AnalysisHost, HostError};
use crate::model::{ArrayResize, DataKind, DataType, StringSliceRecord};

pub use annotate::{annotate_slice, ensure_slice_type, slice_type_definition};
pub use code_path::{byte_array_candidates, length_from_reference};
pub use config::{RecoveryConfig, DEFAULT_MAX_LENGTH, DEFAULT_SLICE_TYPE_NAME};
pub use length::resolve_length;
pub use regions::ReadOnlyRegions;
pub use scanner::scan_pointer_candidates;
pub use validate::validate_slice;

/// Fatal run errors. Configuration and region errors occur before any edit.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("could not determine the architecture of the binary")]
    Configuration,

    #[error("no read-only segments or sections found in the binary")]
    NoCandidateRegions,

    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Why a single candidate was excluded. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("length is zero")]
    ZeroLength,

    #[error("length 0x{length:X} is not below the limit 0x{limit:X}")]
    TooLong { length: u64, limit: u64 },

    #[error("could not read 0x{length:X} bytes at 0x{address:X}")]
    ReadFailure { address: u64, length: u64 },

    #[error("bytes are not valid UTF-8 (valid up to {valid_up_to})")]
    DecodeFailure { valid_up_to: usize },

    #[error("length field at 0x{address:X} is already typed as {kind:?}")]
    ConflictingType { address: u64, kind: DataKind },
}

impl RejectReason {
    /// Stable short label, used for persistence and reports.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::ZeroLength => "zero_length",
            RejectReason::TooLong { .. } => "too_long",
            RejectReason::ReadFailure { .. } => "read_failure",
            RejectReason::DecodeFailure { .. } => "decode_failure",
            RejectReason::ConflictingType { .. } => "conflicting_type",
        }
    }
}

/// A candidate excluded from the results, keyed by its pointer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub address: u64,
    #[serde(flatten)]
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    #[serde(rename = "readonly_data")]
    ReadOnlyData,
    Code,
}

impl RecoveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryMode::ReadOnlyData => "readonly_data",
            RecoveryMode::Code => "code",
        }
    }
}

impl std::str::FromStr for RecoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly_data" => Ok(RecoveryMode::ReadOnlyData),
            "code" => Ok(RecoveryMode::Code),
            other => Err(format!("unknown recovery mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Outcome of one recovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub mode: RecoveryMode,
    pub status: RunStatus,
    /// Candidates examined (pointers for the data path, arrays for the code path).
    pub candidates: usize,
    pub slices: Vec<StringSliceRecord>,
    pub resized: Vec<ArrayResize>,
    pub rejections: Vec<Rejection>,
    pub slice_type_created: bool,
}

impl RunResult {
    fn new(mode: RecoveryMode) -> Self {
        Self {
            mode,
            status: RunStatus::Completed,
            candidates: 0,
            slices: Vec::new(),
            resized: Vec::new(),
            rejections: Vec::new(),
            slice_type_created: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

/// Shared flag a caller flips to stop a running recovery at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ClassifyingRegions,
    ScanningPointers,
    ResolvingSlices,
    ScanningArrays,
    FollowingReferences,
    Finishing,
}

/// Progress report delivered at each checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    pub completed: usize,
    pub total: usize,
}

/// Explicit handle for one run: the host, tunables, cancellation and progress.
pub struct RecoveryContext<'a, H: AnalysisHost + ?Sized> {
    pub host: &'a mut H,
    pub config: RecoveryConfig,
    cancel: CancellationToken,
    progress: Option<Box<dyn FnMut(&Progress) + 'a>>,
}

impl<'a, H: AnalysisHost + ?Sized> RecoveryContext<'a, H> {
    pub fn new(host: &'a mut H, config: RecoveryConfig) -> Self {
        Self { host, config, cancel: CancellationToken::new(), progress: None }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: impl FnMut(&Progress) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Report progress and return true when the run should stop.
    fn checkpoint(&mut self, phase: Phase, completed: usize, total: usize) -> bool {
        if let Some(callback) = self.progress.as_mut() {
            callback(&Progress { phase, completed, total });
        }
        self.cancel.is_cancelled()
    }

    fn finish_batch(&mut self) -> Result<(), RecoveryError> {
        self.host.commit_edit()?;
        if self.config.request_reanalysis {
            self.host.update_analysis();
        }
        Ok(())
    }

    /// Roll back the open batch and surface the host failure.
    fn abort_batch(&mut self, err: HostError) -> RecoveryError {
        error!("Host failure while annotating, reverting batch: {err}");
        if let Err(revert_err) = self.host.revert_edit() {
            error!("Failed to revert edit batch: {revert_err}");
        }
        RecoveryError::Host(err)
    }
}

/// Recover string slices from typed pointers into read-only data.
///
/// Fails before touching the type database when the architecture is unknown or
/// there are no read-only regions. Everything else is a per-candidate rejection.
pub fn recover_from_readonly_data<H: AnalysisHost + ?Sized>(
    ctx: &mut RecoveryContext<'_, H>,
) -> Result<RunResult, RecoveryError> {
    let mut result = RunResult::new(RecoveryMode::ReadOnlyData);

    let Some(arch) = ctx.host.arch() else {
        error!("Could not get architecture of current binary, exiting");
        return Err(RecoveryError::Configuration);
    };
    if ctx.checkpoint(Phase::ClassifyingRegions, 0, 1) {
        result.status = RunStatus::Cancelled;
        return Ok(result);
    }
    let regions = ReadOnlyRegions::classify(&*ctx.host)?.require_non_empty().map_err(|err| {
        error!("Could not find any read-only segments or sections in binary, exiting");
        err
    })?;

    if ctx.checkpoint(Phase::ScanningPointers, 0, 1) {
        result.status = RunStatus::Cancelled;
        return Ok(result);
    }
    let candidates = scan_pointer_candidates(&*ctx.host, &regions, arch.pointer_width as u64);
    info!("Found {} pointer(s) into read-only data", candidates.len());

    ctx.host.begin_edit()?;
    let total = candidates.len();
    for (done, candidate) in candidates.iter().enumerate() {
        if ctx.checkpoint(Phase::ResolvingSlices, done, total) {
            warn!("Recovery cancelled after {done} of {total} candidate(s)");
            result.status = RunStatus::Cancelled;
            break;
        }
        result.candidates += 1;

        let record = resolve_length(&*ctx.host, candidate, &arch)
            .and_then(|length| validate_slice(&*ctx.host, candidate, &length, ctx.config.max_length));
        let record = match record {
            Ok(record) => record,
            Err(reason) => {
                result.rejections.push(Rejection { address: candidate.source, reason });
                continue;
            }
        };

        if result.slices.is_empty() {
            match ensure_slice_type(&mut *ctx.host, &ctx.config, &arch) {
                Ok(created) => result.slice_type_created = created,
                Err(err) => return Err(ctx.abort_batch(err)),
            }
        }
        if let Err(err) = annotate_slice(&mut *ctx.host, &record, &ctx.config) {
            return Err(ctx.abort_batch(err));
        }
        result.slices.push(record);
    }

    ctx.checkpoint(Phase::Finishing, total, total);
    ctx.finish_batch()?;
    info!(
        "Recovered {} string slice(s), rejected {} candidate(s)",
        result.slices.len(),
        result.rejections.len()
    );
    Ok(result)
}

/// Resize read-only byte arrays to lengths inferred from referencing code.
///
/// An empty read-only working set yields an empty result rather than an error.
pub fn recover_from_code<H: AnalysisHost + ?Sized>(
    ctx: &mut RecoveryContext<'_, H>,
) -> Result<RunResult, RecoveryError> {
    let mut result = RunResult::new(RecoveryMode::Code);

    if ctx.checkpoint(Phase::ClassifyingRegions, 0, 1) {
        result.status = RunStatus::Cancelled;
        return Ok(result);
    }
    let regions = ReadOnlyRegions::classify(&*ctx.host).map_err(|err| {
        error!("Could not get architecture of current binary, exiting");
        err
    })?;
    if regions.is_empty() {
        warn!("No read-only segments or sections found; nothing to scan");
    }

    if ctx.checkpoint(Phase::ScanningArrays, 0, 1) {
        result.status = RunStatus::Cancelled;
        return Ok(result);
    }
    let arrays = byte_array_candidates(&*ctx.host, &regions);
    info!("Found {} byte array(s) in read-only data", arrays.len());

    ctx.host.begin_edit()?;
    let total = arrays.len();
    'arrays: for (done, array) in arrays.iter().enumerate() {
        if ctx.checkpoint(Phase::FollowingReferences, done, total) {
            warn!("Recovery cancelled after {done} of {total} array(s)");
            result.status = RunStatus::Cancelled;
            break;
        }
        result.candidates += 1;
        for xref in ctx.host.code_refs(array.address) {
            if ctx.checkpoint(Phase::FollowingReferences, done, total) {
                warn!("Recovery cancelled while following references of 0x{:X}", array.address);
                result.status = RunStatus::Cancelled;
                break 'arrays;
            }
            let Some(length) = length_from_reference(&*ctx.host, &xref) else {
                continue;
            };

            let ty = DataType::char_array(length);
            if let Err(err) = ctx.host.define_data_var(array.address, ty, array.name.clone()) {
                return Err(ctx.abort_batch(err));
            }
            info!("Resized array at 0x{:X} to 0x{:X} byte(s)", array.address, length);
            result.resized.push(ArrayResize {
                address: array.address,
                code_address: xref.code_address,
                previous_length: code_path::array_length(&array.ty),
                length,
            });
            continue 'arrays;
        }
    }

    ctx.checkpoint(Phase::Finishing, total, total);
    ctx.finish_batch()?;
    info!("Resized {} array(s)", result.resized.len());
    Ok(result)
}

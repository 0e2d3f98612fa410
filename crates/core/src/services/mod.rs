//! Services that tie the recovery pipeline to a project.

pub mod runs;

pub use runs::{RecoveryRunner, RunOutcome, RunRequest};

//! slicer-core
//!
//! Recovery of string slices (a data pointer immediately followed by a byte
//! length) from binaries loaded into an analysis host.
//!
//! The host is reached only through the collaborator traits in [`host`]; the
//! detection, validation and annotation logic lives in [`recovery`]. A
//! JSON-backed reference host, an object-file loader, and a small project
//! database for run history round out the crate so that the CLI stays thin.

pub mod model;
pub mod host;
pub mod recovery;
pub mod db;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Project database integration and project layout definitions.
//!
//! A project is a directory holding `.slicer/project.json` (configuration,
//! including recovery defaults) and a SQLite database recording every recovery
//! run: accepted slices, resized arrays and rejected candidates.
//!
//! The recovery pipeline itself is stateless; only frontends that want a run
//! history go through this module.

pub mod config;
pub mod context;
pub mod layout;
pub mod models;
pub mod project_db;
pub mod util;

pub use config::{DbConfig, ProjectConfig};
pub use context::ProjectContext;
pub use layout::ProjectLayout;
pub use models::{RecoveryRunRecord, RunRecordStatus, StoredRejection};
pub use project_db::{DbError, DbResult, ProjectDb, CURRENT_SCHEMA_VERSION};
pub use util::{init_project, load_project_config, open_project_db};

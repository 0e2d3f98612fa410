use std::path::{Path, PathBuf};

/// Where a recovery project keeps its files, relative to a root directory.
///
/// Pure path arithmetic; see [`crate::db::init_project`] for the code that
/// creates the directories.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    /// `.slicer/`
    pub meta_dir: PathBuf,
    /// `.slicer/project.json`
    pub project_config_path: PathBuf,
    /// `.slicer/project.db`, the run history.
    pub db_path: PathBuf,
    /// `reports/`, exported annotations.
    pub reports_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".slicer");
        Self {
            project_config_path: meta_dir.join("project.json"),
            db_path: meta_dir.join("project.db"),
            reports_dir: root.join("reports"),
            meta_dir,
            root,
        }
    }

    /// Database path as stored in the project config: relative to the root
    /// when it lives under it, absolute otherwise.
    pub fn db_path_relative_string(&self) -> String {
        self.db_path
            .strip_prefix(&self.root)
            .unwrap_or(self.db_path.as_path())
            .to_string_lossy()
            .into_owned()
    }

    /// Default export path for the annotations of a run over `binary_name`.
    pub fn annotations_path(&self, binary_name: &str) -> PathBuf {
        self.reports_dir.join(format!("{binary_name}.annotations.json"))
    }
}

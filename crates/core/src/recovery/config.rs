use serde::{Deserialize, Serialize};

/// Default upper bound (exclusive) for an accepted slice length.
pub const DEFAULT_MAX_LENGTH: u64 = 0x1000;

/// Default name of the composite (pointer, length) type.
pub const DEFAULT_SLICE_TYPE_NAME: &str = "RustStringSlice";

/// Tunables for a recovery run.
///
/// Every field has a default so partial configs (project JSON, YAML profiles)
/// deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Lengths at or above this value are rejected.
    #[serde(default = "default_max_length")]
    pub max_length: u64,
    /// Name of the nominal string-slice type defined in the type database.
    #[serde(default = "default_slice_type_name")]
    pub slice_type_name: String,
    /// Prefix for the display name of each slice instance.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Request a host re-analysis pass once the edit batch is committed.
    #[serde(default = "default_true")]
    pub request_reanalysis: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            slice_type_name: default_slice_type_name(),
            name_prefix: default_name_prefix(),
            request_reanalysis: true,
        }
    }
}

impl RecoveryConfig {
    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Display name for a slice instance, e.g. `str_"hello"`.
    pub fn display_name(&self, text: &str) -> String {
        format!("{}\"{}\"", self.name_prefix, text)
    }
}

fn default_max_length() -> u64 {
    DEFAULT_MAX_LENGTH
}

fn default_slice_type_name() -> String {
    DEFAULT_SLICE_TYPE_NAME.to_string()
}

fn default_name_prefix() -> String {
    "str_".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: RecoveryConfig = serde_json::from_str(r#"{"max_length": 256}"#).unwrap();
        assert_eq!(config.max_length, 256);
        assert_eq!(config.slice_type_name, "RustStringSlice");
        assert!(config.request_reanalysis);
    }

    #[test]
    fn display_name_quotes_text() {
        assert_eq!(RecoveryConfig::default().display_name("hello"), "str_\"hello\"");
    }
}

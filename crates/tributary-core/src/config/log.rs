use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the file-backed change log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory holding one sub-directory per topic and the group offsets
    pub base_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/change-log"),
        }
    }
}

impl LogConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

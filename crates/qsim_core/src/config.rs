use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::CaseMode;
use crate::cluster::{ClusterOptions, MergeStrategy};
use crate::error::{QsimError, Result};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_EXTENSION: &str = "docx";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Minimum cosine similarity for two questions to count as the same.
    pub threshold: f32,
    pub merge: MergeStrategy,
    pub case_mode: CaseMode,
    /// File extensions accepted as documents, without the dot.
    pub extensions: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            merge: MergeStrategy::default(),
            case_mode: CaseMode::default(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON config file. Absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| QsimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| QsimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cluster_options().validate()?;
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(QsimError::InvalidConfig(
                "at least one document extension is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            threshold: self.threshold,
            merge: self.merge,
        }
    }

    /// Case-insensitive match of `path`'s extension against the accepted list.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.'))
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

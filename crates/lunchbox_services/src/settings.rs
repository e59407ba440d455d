//! Settings management

use lunchbox_core::memory::{DeviceSink, MemoryError, MemoryManager, DEFAULT_QUICK_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings from {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batch: BatchSettings,
}

/// Sizing of one vertex batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Maximum records (vertices) held by the batch.
    pub capacity: usize,
    /// Elements (floats) per record.
    pub stride: usize,
    /// Records moved per incremental defrag step.
    pub quick_defrag_limit: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            capacity: 65_536,
            stride: 8,
            quick_defrag_limit: DEFAULT_QUICK_LIMIT,
        }
    }
}

impl BatchSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let zero = |field| SettingsError::Invalid {
            field,
            reason: "must be greater than zero",
        };
        if self.capacity == 0 {
            return Err(zero("batch.capacity"));
        }
        if self.stride == 0 {
            return Err(zero("batch.stride"));
        }
        if self.quick_defrag_limit == 0 {
            return Err(zero("batch.quick_defrag_limit"));
        }
        if self.capacity.checked_mul(self.stride).is_none() {
            return Err(SettingsError::Invalid {
                field: "batch.capacity",
                reason: "capacity * stride overflows",
            });
        }
        Ok(())
    }

    /// Build a manager sized by these settings on top of `sink`.
    pub fn manager<T, S>(&self, sink: S) -> Result<MemoryManager<T, S>, MemoryError>
    where
        T: bytemuck::Pod,
        S: DeviceSink,
    {
        Ok(MemoryManager::new(self.capacity, self.stride, sink)?
            .with_quick_limit(self.quick_defrag_limit))
    }
}

impl Settings {
    pub fn from_json(path: &Path, text: &str) -> Result<Self, SettingsError> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.batch.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lunchbox_core::RecordingSink;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let settings =
            Settings::from_json(Path::new("inline"), r#"{ "batch": { "capacity": 128 } }"#)
                .unwrap();
        assert_eq!(settings.batch.capacity, 128);
        assert_eq!(settings.batch.stride, 8);
        assert_eq!(settings.batch.quick_defrag_limit, DEFAULT_QUICK_LIMIT);
    }

    #[test]
    fn test_rejects_zero_stride() {
        let err = Settings::from_json(Path::new("inline"), r#"{ "batch": { "stride": 0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "batch.stride",
                ..
            }
        ));
    }

    #[test]
    fn test_reports_parse_errors_and_missing_files() {
        assert!(matches!(
            Settings::from_json(Path::new("inline"), "{ not json"),
            Err(SettingsError::Parse { .. })
        ));
        assert!(matches!(
            Settings::load(Path::new("/definitely/not/here.json")),
            Err(SettingsError::Io { .. })
        ));
    }

    #[test]
    fn test_builds_sized_manager() {
        let settings = BatchSettings {
            capacity: 16,
            stride: 4,
            quick_defrag_limit: 2,
        };
        let manager = settings.manager::<f32, _>(RecordingSink::new()).unwrap();
        assert_eq!(manager.element_capacity(), 64);
        assert_eq!(manager.quick_limit(), 2);
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::*;

/// Number of physical sites on the largest supported headstage.
pub const DEFAULT_MAX_CHANS: usize = 32;

/// Gaps longer than this many sample intervals start a new epoch.
pub const DEFAULT_GAP_FACTOR: f64 = 1.5;

/// How epochs from independently chunked channels are grouped into recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// The i-th epoch of every channel goes into recording i.
    ///
    /// With `strict` unset, channels that stop early leave later recordings
    /// incomplete. With `strict` set, any difference in epoch count is an error.
    Positional {
        #[serde(default)]
        strict: bool,
    },
    /// Epochs are grouped by matching start and end times.
    Temporal { tolerance_seconds: f64 },
}

impl Default for AlignmentPolicy {
    fn default() -> Self {
        AlignmentPolicy::Positional { strict: false }
    }
}

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Size of the site table handed to the probe mapper
    pub max_chans: usize,
    /// Continuity threshold as a multiple of the channel's sample interval
    pub gap_factor: f64,
    /// Absolute continuity threshold (seconds), overrides `gap_factor`
    pub max_gap_seconds: Option<f64>,
    pub alignment: AlignmentPolicy,
    /// Probe identifier, e.g. `A1x16-5mm-50-177`
    pub probe: Option<String>,
    /// Directory containing `params.template`
    pub template_dir: PathBuf,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_chans: DEFAULT_MAX_CHANS,
            gap_factor: DEFAULT_GAP_FACTOR,
            max_gap_seconds: None,
            alignment: AlignmentPolicy::default(),
            probe: None,
            template_dir: PathBuf::from("templates"),
        }
    }
}

impl ConversionConfig {
    /// Reads a JSON config file. Missing keys fall back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        log::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Continuity threshold (seconds) for a stream with the given interval.
    pub fn gap_threshold(&self, interval: f64) -> f64 {
        self.max_gap_seconds
            .unwrap_or(self.gap_factor * interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ConversionConfig = serde_json::from_str(r#"{"max_chans": 16}"#).unwrap();
        assert_eq!(config.max_chans, 16);
        assert_eq!(config.gap_factor, DEFAULT_GAP_FACTOR);
        assert_eq!(config.alignment, AlignmentPolicy::Positional { strict: false });
    }

    #[test]
    fn test_temporal_policy_from_json() {
        let config: ConversionConfig = serde_json::from_str(
            r#"{"alignment": {"mode": "temporal", "tolerance_seconds": 0.01}}"#,
        )
        .unwrap();
        assert_eq!(
            config.alignment,
            AlignmentPolicy::Temporal {
                tolerance_seconds: 0.01
            }
        );
    }

    #[test]
    fn test_gap_threshold() {
        let mut config = ConversionConfig::default();
        assert!((config.gap_threshold(0.001) - 0.0015).abs() < 1e-12);
        config.max_gap_seconds = Some(0.5);
        assert_eq!(config.gap_threshold(0.001), 0.5);
    }
}

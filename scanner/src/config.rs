//! Scanner configuration

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the scanning session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Minimum time between two accepted scans (seconds)
    pub scan_interval_secs: f64,

    /// How long the popup stays up before auto-dismiss (seconds)
    pub popup_duration_secs: u32,

    /// Countdown tick period (milliseconds)
    pub tick_interval_ms: u64,

    /// Side of the centered square fed to the classifier (pixels)
    pub crop_size: u32,

    /// Labels meaning "no object in view", compared case-insensitively
    pub background_labels: Vec<String>,

    /// Top results below this confidence never open a popup (0-1)
    pub min_confidence: f32,

    /// Classifier artifact, opaque to the scanner and handed to whichever
    /// loader builds the classifier (the scripted classifier reads JSON)
    pub model_path: String,

    /// Pending frames kept by the classify executor before older ones are dropped
    pub executor_queue_depth: usize,

    /// Capacity of the UI event channel
    pub event_buffer: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 2.0,
            popup_duration_secs: 5,
            tick_interval_ms: 1000,
            crop_size: 480,
            background_labels: vec!["background".to_string()],
            min_confidence: 0.0,
            model_path: "models/trash_classifier.json".to_string(),
            executor_queue_depth: 2,
            event_buffer: 64,
        }
    }
}

impl ScannerConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded scanner config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ScannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs <= 0.0
            || Duration::try_from_secs_f64(self.scan_interval_secs).is_err()
        {
            return Err(ScanError::config(format!(
                "scan_interval_secs must be a positive, representable duration, got {}",
                self.scan_interval_secs
            )));
        }
        if self.popup_duration_secs == 0 {
            return Err(ScanError::config("popup_duration_secs must be at least 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ScanError::config("tick_interval_ms must be at least 1"));
        }
        if self.crop_size == 0 {
            return Err(ScanError::config("crop_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ScanError::config(format!(
                "min_confidence must be within 0-1, got {}",
                self.min_confidence
            )));
        }
        if self.executor_queue_depth == 0 {
            return Err(ScanError::config("executor_queue_depth must be at least 1"));
        }
        Ok(())
    }

    /// Scan interval; zero for values `validate` would reject
    pub fn scan_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.scan_interval_secs).unwrap_or_default()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_interval(), Duration::from_secs(2));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ScannerConfig::from_json_str(r#"{ "scan_interval_secs": 5.0 }"#).unwrap();
        assert_eq!(config.scan_interval(), Duration::from_secs(5));
        assert_eq!(config.popup_duration_secs, 5);
        assert_eq!(config.crop_size, 480);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ScannerConfig::from_json_str(r#"{ "scan_interval_secs": 0.0 }"#),
            Err(ScanError::ConfigError(_))
        ));
        assert!(matches!(
            ScannerConfig::from_json_str(r#"{ "min_confidence": 1.5 }"#),
            Err(ScanError::ConfigError(_))
        ));
        assert!(matches!(
            ScannerConfig::from_json_str("not json"),
            Err(ScanError::SerializationError(_))
        ));
    }

    #[test]
    fn test_unrepresentable_interval_rejected() {
        for json in [
            r#"{ "scan_interval_secs": 1e20 }"#,
            r#"{ "scan_interval_secs": -1.0 }"#,
        ] {
            assert!(matches!(
                ScannerConfig::from_json_str(json),
                Err(ScanError::ConfigError(_))
            ));
        }

        let config = ScannerConfig {
            scan_interval_secs: f64::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.scan_interval(), Duration::ZERO);
    }

    #[test]
    fn test_from_file() {
        let path =
            std::env::temp_dir().join(format!("scanner_config_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "crop_size": 224, "background_labels": ["None", "Background"] }"#,
        )
        .unwrap();

        let config = ScannerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.crop_size, 224);
        assert_eq!(config.background_labels, vec!["None", "Background"]);
        assert_eq!(config.scan_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            ScannerConfig::from_file("/nonexistent/scanner.json"),
            Err(ScanError::IoError(_))
        ));
    }
}

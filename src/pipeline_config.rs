//! Tunable thresholds for every pipeline stage.
//!
//! Loaded from a JSON file in the data directory; any field left out keeps
//! its default, so an empty `{}` file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::confidence::thresholds;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters per area unit (one 612x792 pt page) below which a page is OCRed.
    pub density_threshold: f32,
    pub ocr_timeout_secs: u64,
    /// Fraction of unreadable pages above which the paper fails.
    pub max_failed_page_fraction: f32,
    /// OCR pages below this confidence mark the extraction degraded.
    pub low_confidence_threshold: f32,
    /// HTTP OCR service. Without one, scanned pages count as failed.
    pub ocr_endpoint: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            density_threshold: 20.0,
            ocr_timeout_secs: 30,
            max_failed_page_fraction: 0.30,
            low_confidence_threshold: thresholds::LOW,
            ocr_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Points right of the body margin a question number may still start at.
    pub margin_tolerance_pt: f32,
    /// Prompts at least this long are LONG, shorter ones SHORT.
    pub long_prompt_chars: usize,
    /// Blocks longer than this are never treated as MCQ options.
    pub option_max_chars: usize,
    pub easy_max_marks: u32,
    pub hard_min_marks: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            margin_tolerance_pt: 12.0,
            long_prompt_chars: 200,
            option_max_chars: 160,
            easy_max_marks: 1,
            hard_min_marks: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintConfig {
    pub min_section_years: usize,
    pub laplace_alpha: f64,
    pub recompute_debounce_ms: u64,
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self {
            min_section_years: 2,
            laplace_alpha: 1.0,
            recompute_debounce_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    /// Chapters with accuracy below this are reported as weak.
    pub weak_chapter_threshold: f64,
    pub max_duration_secs: i64,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            weak_chapter_threshold: 0.5,
            max_duration_secs: 6 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub segmentation: SegmentationConfig,
    pub blueprint: BlueprintConfig,
    pub practice: PracticeConfig,
    pub server: ServerConfig,
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Read the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No pipeline config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Pipeline config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.extraction.max_failed_page_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::Invalid(format!(
                "max_failed_page_fraction must be within [0, 1], got {fraction}"
            )));
        }
        if self.blueprint.laplace_alpha < 0.0 {
            return Err(ConfigError::Invalid("laplace_alpha must be non-negative".into()));
        }
        if self.segmentation.easy_max_marks >= self.segmentation.hard_min_marks {
            return Err(ConfigError::Invalid(
                "easy_max_marks must be below hard_min_marks".into(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = PipelineConfig::default();
        assert_eq!(config.extraction.density_threshold, 20.0);
        assert_eq!(config.extraction.ocr_timeout_secs, 30);
        assert!((config.extraction.max_failed_page_fraction - 0.30).abs() < f32::EPSILON);
        assert_eq!(config.segmentation.long_prompt_chars, 200);
        assert_eq!(config.blueprint.min_section_years, 2);
        assert_eq!(config.blueprint.laplace_alpha, 1.0);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"blueprint": {"laplace_alpha": 0.5}}"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.blueprint.laplace_alpha, 0.5);
        assert_eq!(config.blueprint.min_section_years, 2);
        assert_eq!(config.extraction, ExtractionConfig::default());
    }

    #[test]
    fn invalid_fraction_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"extraction": {"max_failed_page_fraction": 1.5}}"#).unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}

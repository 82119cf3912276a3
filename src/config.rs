use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "safewatch.db";
const DEFAULT_SNAPSHOT_DIR: &str = "alert_frames";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8797";
const DEFAULT_SOURCE_URL: &str = "stub://camera0";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 5;
const DEFAULT_NIGHT_START_HOUR: u32 = 20;
const DEFAULT_NIGHT_END_HOUR: u32 = 6;
const DEFAULT_THUMB_PALM_THRESHOLD: f32 = 0.1;
const DEFAULT_WAVE_THRESHOLD: f32 = 0.25;
const DEFAULT_THUMB_FOLDED_THRESHOLD: f32 = 0.1;

/// Geometric thresholds per gesture rule, in normalized image units.
///
/// Plain `Copy` value: every detector gets its own copy at construction, so
/// thresholds are never shared by reference across instances.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureThresholds {
    pub thumb_palm: f32,
    pub wave: f32,
    pub thumb_folded: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            thumb_palm: DEFAULT_THUMB_PALM_THRESHOLD,
            wave: DEFAULT_WAVE_THRESHOLD,
            thumb_folded: DEFAULT_THUMB_FOLDED_THRESHOLD,
        }
    }
}

/// Detection and alert-decision configuration.
///
/// Immutable after construction; shared read-only by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionConfig {
    /// Minimum classifier confidence for a detection to count.
    pub confidence_threshold: f32,
    /// When false, the hand/gesture pass is skipped entirely.
    pub gesture_enabled: bool,
    /// Minimum elapsed time between any two fired alerts, all categories.
    pub alert_cooldown: Duration,
    /// Start of the night window, hour 0-23. The window wraps midnight when
    /// start > end (e.g. 20 -> 6).
    pub night_start_hour: u32,
    /// End of the night window, hour 0-23 (exclusive).
    pub night_end_hour: u32,
    pub gesture_thresholds: GestureThresholds,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            gesture_enabled: true,
            alert_cooldown: Duration::from_secs(DEFAULT_ALERT_COOLDOWN_SECS),
            night_start_hour: DEFAULT_NIGHT_START_HOUR,
            night_end_hour: DEFAULT_NIGHT_END_HOUR,
            gesture_thresholds: GestureThresholds::default(),
        }
    }
}

impl DetectionConfig {
    /// Reject configurations that would produce undefined runtime behavior.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.alert_cooldown.is_zero() {
            return Err(anyhow!("alert_cooldown must be greater than zero"));
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(anyhow!(
                "night window hours must be in 0..=23, got start={} end={}",
                self.night_start_hour,
                self.night_end_hour
            ));
        }
        if self.night_start_hour == self.night_end_hour {
            return Err(anyhow!(
                "night window start and end hours must differ (got {})",
                self.night_start_hour
            ));
        }
        let t = &self.gesture_thresholds;
        for (name, value) in [
            ("thumb_palm", t.thumb_palm),
            ("wave", t.wave),
            ("thumb_folded", t.thumb_folded),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(anyhow!(
                    "gesture threshold '{}' must be a positive finite value, got {}",
                    name,
                    value
                ));
            }
        }
        Ok(())
    }
}

// -------------------- Daemon configuration --------------------

#[derive(Debug, Deserialize, Default)]
struct SafewatchConfigFile {
    db_path: Option<String>,
    snapshot_dir: Option<String>,
    api: Option<ApiConfigFile>,
    source: Option<SourceConfigFile>,
    detection: Option<DetectionConfigFile>,
    models: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    gesture_enabled: Option<bool>,
    alert_cooldown_secs: Option<u64>,
    night_start_hour: Option<u32>,
    night_end_hour: Option<u32>,
    gesture_thresholds: Option<GestureThresholdsFile>,
}

#[derive(Debug, Deserialize, Default)]
struct GestureThresholdsFile {
    thumb_palm: Option<f32>,
    wave: Option<f32>,
    thumb_folded: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    face_model_path: Option<String>,
    gender_model_path: Option<String>,
    hand_model_path: Option<String>,
}

/// Full daemon configuration: detection settings plus paths and endpoints.
#[derive(Debug, Clone)]
pub struct SafewatchConfig {
    pub db_path: String,
    pub snapshot_dir: String,
    pub api_addr: String,
    pub source: SourceSettings,
    pub detection: DetectionConfig,
    pub models: ModelSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

/// Paths to pretrained model artifacts. Only consulted by model-backed
/// detection backends; `None` means the stub backend is used.
#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    pub face_model_path: Option<String>,
    pub gender_model_path: Option<String>,
    pub hand_model_path: Option<String>,
}

impl SafewatchConfig {
    /// Load from the file named by `SAFEWATCH_CONFIG` (when set), then apply
    /// environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SAFEWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.detection.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SafewatchConfigFile) -> Self {
        let detection_file = file.detection.unwrap_or_default();
        let thresholds_file = detection_file.gesture_thresholds.unwrap_or_default();
        let defaults = DetectionConfig::default();
        let detection = DetectionConfig {
            confidence_threshold: detection_file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            gesture_enabled: detection_file
                .gesture_enabled
                .unwrap_or(defaults.gesture_enabled),
            alert_cooldown: detection_file
                .alert_cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.alert_cooldown),
            night_start_hour: detection_file
                .night_start_hour
                .unwrap_or(defaults.night_start_hour),
            night_end_hour: detection_file
                .night_end_hour
                .unwrap_or(defaults.night_end_hour),
            gesture_thresholds: GestureThresholds {
                thumb_palm: thresholds_file
                    .thumb_palm
                    .unwrap_or(DEFAULT_THUMB_PALM_THRESHOLD),
                wave: thresholds_file.wave.unwrap_or(DEFAULT_WAVE_THRESHOLD),
                thumb_folded: thresholds_file
                    .thumb_folded
                    .unwrap_or(DEFAULT_THUMB_FOLDED_THRESHOLD),
            },
        };
        let models_file = file.models.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string()),
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            source: SourceSettings {
                url: file
                    .source
                    .as_ref()
                    .and_then(|source| source.url.clone())
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: file
                    .source
                    .as_ref()
                    .and_then(|source| source.target_fps)
                    .unwrap_or(DEFAULT_TARGET_FPS),
                width: file
                    .source
                    .as_ref()
                    .and_then(|source| source.width)
                    .unwrap_or(DEFAULT_FRAME_WIDTH),
                height: file
                    .source
                    .and_then(|source| source.height)
                    .unwrap_or(DEFAULT_FRAME_HEIGHT),
            },
            detection,
            models: ModelSettings {
                face_model_path: models_file.face_model_path,
                gender_model_path: models_file.gender_model_path,
                hand_model_path: models_file.hand_model_path,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SAFEWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(url) = std::env::var("SAFEWATCH_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(dir) = std::env::var("SAFEWATCH_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = dir;
            }
        }
        if let Ok(cooldown) = std::env::var("SAFEWATCH_ALERT_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("SAFEWATCH_ALERT_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.detection.alert_cooldown = Duration::from_secs(seconds);
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SafewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_defaults_match_documented_values() {
        let cfg = DetectionConfig::default();
        assert_eq!(cfg.confidence_threshold, 0.5);
        assert!(cfg.gesture_enabled);
        assert_eq!(cfg.alert_cooldown, Duration::from_secs(5));
        assert_eq!(cfg.night_start_hour, 20);
        assert_eq!(cfg.night_end_hour, 6);
        assert_eq!(cfg.gesture_thresholds.thumb_palm, 0.1);
        assert_eq!(cfg.gesture_thresholds.wave, 0.25);
        assert_eq!(cfg.gesture_thresholds.thumb_folded, 0.1);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_degenerate_night_window() {
        let cfg = DetectionConfig {
            night_start_hour: 8,
            night_end_hour: 8,
            ..DetectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_hours() {
        let cfg = DetectionConfig {
            night_start_hour: 24,
            ..DetectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_cooldown() {
        let cfg = DetectionConfig {
            alert_cooldown: Duration::ZERO,
            ..DetectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let mut cfg = DetectionConfig::default();
        cfg.gesture_thresholds.wave = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let file: SafewatchConfigFile = serde_json::from_str(
            r#"{
                "db_path": "custom.db",
                "detection": {
                    "alert_cooldown_secs": 10,
                    "gesture_thresholds": { "thumb_palm": 0.08, "wave": 0.3 }
                }
            }"#,
        )
        .unwrap();
        let cfg = SafewatchConfig::from_file(file);
        assert_eq!(cfg.db_path, "custom.db");
        assert_eq!(cfg.detection.alert_cooldown, Duration::from_secs(10));
        assert_eq!(cfg.detection.gesture_thresholds.thumb_palm, 0.08);
        assert_eq!(cfg.detection.gesture_thresholds.wave, 0.3);
        // Unspecified threshold keeps its default.
        assert_eq!(cfg.detection.gesture_thresholds.thumb_folded, 0.1);
    }
}

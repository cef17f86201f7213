use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SignspellConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    pub stability: StabilityConfig,
    pub overlay: OverlayConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Frame loop rate (display refresh rate)
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// JSON-lines pose recording played back by the replay detector
    #[serde(default = "default_recording_path")]
    pub recording_path: String,

    /// Restart the recording when it runs out
    #[serde(default = "default_loop_playback")]
    pub loop_playback: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Classification service endpoint
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,

    /// Minimum interval between two outbound requests
    #[serde(default = "default_classifier_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StabilityConfig {
    /// Consecutive identical labels required before a commit
    #[serde(default = "default_stability_threshold")]
    pub threshold: u32,

    /// Minimum interval between two commits
    #[serde(default = "default_append_cooldown_ms")]
    pub append_cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverlayConfig {
    #[serde(default = "default_overlay_enabled")]
    pub enabled: bool,

    #[serde(default = "default_line_thickness")]
    pub line_thickness: u32,

    #[serde(default = "default_point_radius")]
    pub point_radius: u32,

    /// PNG written with the last composited frame at shutdown
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Log every published event
    #[serde(default = "default_event_debug_logging")]
    pub event_debug_logging: bool,
}

/// Highest accepted frame rate; the tick interval is whole milliseconds apart
pub const MAX_FPS: u32 = 1000;

impl SignspellConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("signspell.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.fps", default_camera_fps())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("detector.recording_path", default_recording_path())?
            .set_default("detector.loop_playback", default_loop_playback())?
            .set_default("classifier.endpoint", default_classifier_endpoint())?
            .set_default(
                "classifier.cooldown_ms",
                default_classifier_cooldown_ms() as i64,
            )?
            .set_default(
                "classifier.timeout_ms",
                default_classifier_timeout_ms() as i64,
            )?
            .set_default("stability.threshold", default_stability_threshold())?
            .set_default(
                "stability.append_cooldown_ms",
                default_append_cooldown_ms() as i64,
            )?
            .set_default("overlay.enabled", default_overlay_enabled())?
            .set_default("overlay.line_thickness", default_line_thickness())?
            .set_default("overlay.point_radius", default_point_radius())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.event_debug_logging",
                default_event_debug_logging(),
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // SIGNSPELL_CLASSIFIER__COOLDOWN_MS=250
            .add_source(
                Environment::with_prefix("SIGNSPELL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: SignspellConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps > MAX_FPS {
            return Err(ConfigError::Message(format!(
                "Camera fps must be at most {}",
                MAX_FPS
            )));
        }

        if self.detector.recording_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Detector recording_path must not be empty".to_string(),
            ));
        }

        if self.classifier.endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "Classifier endpoint must not be empty".to_string(),
            ));
        }

        if self.classifier.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Classifier timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.stability.threshold == 0 {
            return Err(ConfigError::Message(
                "Stability threshold must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as a TOML document
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for SignspellConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                fps: default_camera_fps(),
                resolution: default_camera_resolution(),
            },
            detector: DetectorConfig {
                recording_path: default_recording_path(),
                loop_playback: default_loop_playback(),
            },
            classifier: ClassifierConfig {
                endpoint: default_classifier_endpoint(),
                cooldown_ms: default_classifier_cooldown_ms(),
                timeout_ms: default_classifier_timeout_ms(),
            },
            stability: StabilityConfig {
                threshold: default_stability_threshold(),
                append_cooldown_ms: default_append_cooldown_ms(),
            },
            overlay: OverlayConfig {
                enabled: default_overlay_enabled(),
                line_thickness: default_line_thickness(),
                point_radius: default_point_radius(),
                snapshot_path: None,
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                event_debug_logging: default_event_debug_logging(),
            },
        }
    }
}

// Default value functions
fn default_camera_fps() -> u32 {
    60
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}

fn default_recording_path() -> String {
    "poses.jsonl".to_string()
}
fn default_loop_playback() -> bool {
    true
}

fn default_classifier_endpoint() -> String {
    "https://brianmabunda00-alphabet-classifier.hf.space/predict".to_string()
}
fn default_classifier_cooldown_ms() -> u64 {
    200
}
fn default_classifier_timeout_ms() -> u64 {
    5000
}

fn default_stability_threshold() -> u32 {
    5
}
fn default_append_cooldown_ms() -> u64 {
    1500
}

fn default_overlay_enabled() -> bool {
    true
}
fn default_line_thickness() -> u32 {
    3
}
fn default_point_radius() -> u32 {
    4
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_event_debug_logging() -> bool {
    false
}

use crate::camera::{ControllerSettings, FacingMode, VideoResolution};
use crate::ui_state::{ClassifierSettings, StabilizerOptions};
use crate::ux::UxSettings;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DocscanConfig {
    pub camera: CameraConfig,
    pub stabilizer: StabilizerConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Preferred camera facing (back, front)
    #[serde(default)]
    pub facing: FacingMode,

    /// Highest resolution requested; lower ones are tried when refused
    #[serde(default)]
    pub resolution: VideoResolution,

    /// Start playback as soon as a stream opens
    #[serde(default = "default_true")]
    pub auto_start_playback: bool,

    /// Mirror the preview of front cameras
    #[serde(default = "default_true")]
    pub mirror_front_camera: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StabilizerConfig {
    /// Events older than this no longer count towards a state
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,

    /// Decay applied to every queued event per submission
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScanConfig {
    /// Stop scanning after this long without a UI state change
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause after a side or the whole document is captured
    #[serde(default = "default_transition_delay_ms")]
    pub transition_delay_ms: u64,

    #[serde(default = "default_true")]
    pub skip_images_with_blur: bool,

    #[serde(default = "default_true")]
    pub skip_images_with_glare: bool,

    #[serde(default = "default_true")]
    pub skip_images_with_inadequate_lighting: bool,

    #[serde(default = "default_true")]
    pub skip_images_occluded_by_hand: bool,
}

impl DocscanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("docscan.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// Nested keys come from `DOCSCAN_` variables with `__` between levels,
    /// e.g. `DOCSCAN_SCAN__TIMEOUT_MS=5000`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.facing", FacingMode::default().to_string())?
            .set_default("camera.resolution", VideoResolution::default().to_string())?
            .set_default("camera.auto_start_playback", true)?
            .set_default("camera.mirror_front_camera", true)?
            .set_default("stabilizer.time_window_ms", default_time_window_ms())?
            .set_default("stabilizer.decay_rate", default_decay_rate())?
            .set_default("scan.timeout_ms", default_timeout_ms())?
            .set_default("scan.transition_delay_ms", default_transition_delay_ms())?
            .set_default("scan.skip_images_with_blur", true)?
            .set_default("scan.skip_images_with_glare", true)?
            .set_default("scan.skip_images_with_inadequate_lighting", true)?
            .set_default("scan.skip_images_occluded_by_hand", true)?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("DOCSCAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DocscanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stabilizer.time_window_ms == 0 {
            return Err(ConfigError::Message(
                "Stabilizer time_window_ms must be greater than 0".to_string(),
            ));
        }

        let decay = self.stabilizer.decay_rate;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(ConfigError::Message(format!(
                "Stabilizer decay_rate must be in (0, 1], got {}",
                decay
            )));
        }

        if self.scan.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Scan timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            resolution: self.camera.resolution,
            facing: self.camera.facing,
            auto_start_playback: self.camera.auto_start_playback,
            mirror_front_camera: self.camera.mirror_front_camera,
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            skip_images_with_blur: self.scan.skip_images_with_blur,
            skip_images_with_glare: self.scan.skip_images_with_glare,
            skip_images_with_inadequate_lighting: self.scan.skip_images_with_inadequate_lighting,
            skip_images_occluded_by_hand: self.scan.skip_images_occluded_by_hand,
        }
    }

    pub fn stabilizer_options(&self) -> StabilizerOptions {
        StabilizerOptions {
            time_window_ms: self.stabilizer.time_window_ms as f64,
            decay_rate: self.stabilizer.decay_rate,
        }
    }

    pub fn ux_settings(&self) -> UxSettings {
        UxSettings {
            timeout: Duration::from_millis(self.scan.timeout_ms),
            transition_delay: Duration::from_millis(self.scan.transition_delay_ms),
            classifier: self.classifier_settings(),
            stabilizer: self.stabilizer_options(),
        }
    }
}

impl Default for DocscanConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                facing: FacingMode::default(),
                resolution: VideoResolution::default(),
                auto_start_playback: true,
                mirror_front_camera: true,
            },
            stabilizer: StabilizerConfig {
                time_window_ms: default_time_window_ms(),
                decay_rate: default_decay_rate(),
            },
            scan: ScanConfig {
                timeout_ms: default_timeout_ms(),
                transition_delay_ms: default_transition_delay_ms(),
                skip_images_with_blur: true,
                skip_images_with_glare: true,
                skip_images_with_inadequate_lighting: true,
                skip_images_occluded_by_hand: true,
            },
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_time_window_ms() -> u64 {
    3000
}
fn default_decay_rate() -> f64 {
    0.95
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_transition_delay_ms() -> u64 {
    1000
}

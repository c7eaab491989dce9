use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::fsm::MachineProfile;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PhysiotrackConfig {
    pub session: SessionConfig,
    pub tracking: TrackingConfig,
    pub video: VideoConfig,
    #[serde(default)]
    pub thresholds: ThresholdOverrides,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Exercise to track (see `available_exercises`)
    #[serde(default = "default_exercise")]
    pub exercise: String,

    /// Wider tolerances for imperfect form or low frame rates
    #[serde(default = "default_lenient_mode")]
    pub lenient_mode: bool,

    /// Frame rate hint for the incoming landmark stream
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Stop after this many reps (None = continuous)
    pub target_reps: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackingConfig {
    /// Landmarks below this detector confidence are treated as unavailable
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,

    /// Consecutive signal-less frames tolerated before smoothing history is
    /// discarded
    #[serde(default = "default_grace_frames")]
    pub grace_frames: u32,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Frame channel capacity for the pipeline task
    #[serde(default = "default_frame_channel_capacity")]
    pub frame_channel_capacity: usize,
}

/// Flags passed through to the external capture/render collaborators. The
/// core never opens a camera, writes video, or draws overlays itself.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VideoConfig {
    /// Include per-frame smoothed signals in the annotation payload
    #[serde(default = "default_debug")]
    pub debug: bool,

    /// Where the external recorder should save session video, if anywhere
    pub save_video: Option<String>,

    /// Ask the external renderer to draw the full skeleton
    #[serde(default = "default_render_all")]
    pub render_all: bool,
}

/// Optional per-session overrides of the exercise's built-in thresholds;
/// unset fields keep the exercise defaults.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ThresholdOverrides {
    pub enter: Option<f64>,
    pub exit: Option<f64>,
    pub ideal_peak: Option<f64>,
    pub min_hold_frames: Option<u32>,
    pub max_phase_duration_seconds: Option<f64>,
}

impl ThresholdOverrides {
    /// Apply the overrides on top of an exercise profile.
    pub fn apply(&self, mut profile: MachineProfile) -> MachineProfile {
        if let Some(enter) = self.enter {
            profile.thresholds.enter = enter;
        }
        if let Some(exit) = self.exit {
            profile.thresholds.exit = exit;
        }
        if let Some(ideal_peak) = self.ideal_peak {
            profile.thresholds.ideal_peak = ideal_peak;
        }
        if let Some(min_hold_frames) = self.min_hold_frames {
            profile.min_hold_frames = min_hold_frames;
        }
        if let Some(max_phase) = self.max_phase_duration_seconds {
            profile.max_phase_duration_seconds = max_phase;
        }
        profile
    }
}

impl PhysiotrackConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("physiotrack.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("session.exercise", default_exercise())?
            .set_default("session.lenient_mode", default_lenient_mode())?
            .set_default("session.fps", default_fps())?
            .set_default(
                "tracking.visibility_threshold",
                default_visibility_threshold(),
            )?
            .set_default("tracking.grace_frames", default_grace_frames())?
            .set_default(
                "tracking.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "tracking.frame_channel_capacity",
                default_frame_channel_capacity() as i64,
            )?
            .set_default("video.debug", default_debug())?
            .set_default("video.render_all", default_render_all())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with PHYSIOTRACK_ prefix; sections
            // use a double-underscore separator so keys that themselves
            // contain underscores (lenient_mode, grace_frames, ...) stay
            // addressable, e.g. PHYSIOTRACK_SESSION__LENIENT_MODE
            .add_source(
                Environment::with_prefix("PHYSIOTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PhysiotrackConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.exercise.is_empty() {
            return Err(ConfigError::Message(
                "Session exercise must not be empty".to_string(),
            ));
        }

        if self.session.fps == 0 {
            return Err(ConfigError::Message(
                "Session fps must be greater than 0".to_string(),
            ));
        }

        if let Some(reps) = self.session.target_reps {
            if reps == 0 {
                return Err(ConfigError::Message(
                    "Target reps must be greater than 0 when set".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.tracking.visibility_threshold) {
            return Err(ConfigError::Message(
                "Visibility threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.tracking.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.tracking.frame_channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Frame channel capacity must be greater than 0".to_string(),
            ));
        }

        if let Some(max_phase) = self.thresholds.max_phase_duration_seconds {
            if max_phase <= 0.0 {
                return Err(ConfigError::Message(
                    "Max phase duration must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for PhysiotrackConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                exercise: default_exercise(),
                lenient_mode: default_lenient_mode(),
                fps: default_fps(),
                target_reps: None,
            },
            tracking: TrackingConfig {
                visibility_threshold: default_visibility_threshold(),
                grace_frames: default_grace_frames(),
                event_bus_capacity: default_event_bus_capacity(),
                frame_channel_capacity: default_frame_channel_capacity(),
            },
            video: VideoConfig {
                debug: default_debug(),
                save_video: None,
                render_all: default_render_all(),
            },
            thresholds: ThresholdOverrides::default(),
        }
    }
}

// Default value functions
fn default_exercise() -> String {
    "straight_leg_raise".to_string()
}
fn default_lenient_mode() -> bool {
    true
}
fn default_fps() -> u32 {
    30
}

fn default_visibility_threshold() -> f64 {
    0.5
}
fn default_grace_frames() -> u32 {
    5
}
fn default_event_bus_capacity() -> usize {
    100
}
fn default_frame_channel_capacity() -> usize {
    64
}

fn default_debug() -> bool {
    false
}
fn default_render_all() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::{Direction, Thresholds};
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = PhysiotrackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.fps, 30);
        assert!(config.session.lenient_mode);
        assert!(config.session.target_reps.is_none());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = PhysiotrackConfig::default();
        config.session.fps = 0;
        assert!(config.validate().is_err());

        let mut config = PhysiotrackConfig::default();
        config.tracking.visibility_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PhysiotrackConfig::default();
        config.session.target_reps = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[session]
exercise = "bridging"
lenient_mode = false
fps = 24

[thresholds]
min_hold_frames = 4
"#
        )
        .unwrap();

        let config = PhysiotrackConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.session.exercise, "bridging");
        assert!(!config.session.lenient_mode);
        assert_eq!(config.session.fps, 24);
        assert_eq!(config.thresholds.min_hold_frames, Some(4));
        // Untouched sections keep defaults.
        assert_eq!(config.tracking.grace_frames, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_reach_underscored_keys() {
        std::env::set_var("PHYSIOTRACK_SESSION__LENIENT_MODE", "false");
        std::env::set_var("PHYSIOTRACK_TRACKING__VISIBILITY_THRESHOLD", "0.25");
        let config = PhysiotrackConfig::load_from_file("does-not-exist.toml");
        std::env::remove_var("PHYSIOTRACK_SESSION__LENIENT_MODE");
        std::env::remove_var("PHYSIOTRACK_TRACKING__VISIBILITY_THRESHOLD");

        let config = config.unwrap();
        assert!(!config.session.lenient_mode);
        assert_eq!(config.tracking.visibility_threshold, 0.25);
    }

    #[test]
    fn test_threshold_overrides_apply() {
        let base = MachineProfile {
            thresholds: Thresholds {
                enter: 55.0,
                exit: 20.0,
                direction: Direction::Above,
                ideal_peak: 60.0,
            },
            min_hold_frames: 5,
            max_phase_duration_seconds: 10.0,
        };

        let overrides = ThresholdOverrides {
            enter: Some(50.0),
            min_hold_frames: Some(3),
            ..Default::default()
        };

        let resolved = overrides.apply(base);
        assert_eq!(resolved.thresholds.enter, 50.0);
        assert_eq!(resolved.thresholds.exit, 20.0);
        assert_eq!(resolved.min_hold_frames, 3);
    }
}

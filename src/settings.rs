use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::{error, info};

use tower_motion::manipulator::ManipulatorConfig;
use tower_motion::sim::SimConfig;
use tower_motion::{EstimatorConfig, MotionError, MotionTuning};

use crate::routine::RoutineConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Everything the simulator binary is configured with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub sim: SimConfig,
    pub estimator: EstimatorConfig,
    pub motion: MotionTuning,
    pub manipulator: ManipulatorConfig,
    pub routine: RoutineConfig,
}

impl RobotConfig {
    pub fn validate(&self) -> Result<(), MotionError> {
        self.sim.kinematics()?;
        self.estimator.validate()?;
        self.motion.validate()?;
        self.manipulator.validate()?;
        self.routine.validate()?;
        Ok(())
    }
}

/// Loads `config/default.toml` if present, then `TOWER__*` environment
/// overrides (e.g. `TOWER__MOTION__ROTATION__MAX_OUTPUT=0.6`).
pub fn load_config() -> anyhow::Result<RobotConfig> {
    info!("Attempting to load configuration from {}", DEFAULT_CONFIG_PATH);

    let builder = Config::builder()
        .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("TOWER")
                .separator("__")
                .try_parsing(true),
        );

    match deserialize(builder.build()) {
        Ok(config) => {
            config.validate()?;
            info!("Successfully loaded configuration.");
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

fn deserialize(settings: Result<Config, ConfigError>) -> Result<RobotConfig, ConfigError> {
    settings?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> Result<RobotConfig, ConfigError> {
        deserialize(
            Config::builder()
                .add_source(File::from_str(text, FileFormat::Toml))
                .build(),
        )
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.motion, MotionTuning::default());
        assert_eq!(config.manipulator, ManipulatorConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_tables_keep_other_defaults() {
        let config = from_toml(
            r#"
            [motion.rotation]
            max_output = 0.6

            [motion.rotation.exit]
            timeout_ms = 1500

            [manipulator.tray]
            watermark = 5800.0
            "#,
        )
        .unwrap();
        assert_eq!(config.motion.rotation.max_output, 0.6);
        assert_eq!(config.motion.rotation.exit.timeout_ms, Some(1500));
        assert_eq!(config.motion.rotation.exit.settle_ticks, 5);
        assert_eq!(config.motion.translation, MotionTuning::default().translation);
        assert_eq!(config.manipulator.tray.watermark, 5800.0);
        assert_eq!(config.manipulator.tray.deploy.position, 6300.0);
    }

    #[test]
    fn test_waypoints_parse() {
        let config = from_toml(
            r#"
            [routine]
            start = { x = 0.0, y = 0.0, heading = 90.0 }
            waypoints = [
                { x = 0.0, y = 50.0 },
                { x = 0.0, y = 10.0, backwards = true, max_output = 0.5 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(config.routine.start.heading, 90.0);
        assert_eq!(config.routine.waypoints.len(), 2);
        assert!(!config.routine.waypoints[0].backwards);
        assert!(config.routine.waypoints[1].backwards);
        assert_eq!(config.routine.waypoints[1].max_output, Some(0.5));
    }

    #[test]
    fn test_validation_rejects_bad_waypoint_cap() {
        let config = from_toml(
            r#"
            [routine]
            waypoints = [{ x = 10.0, y = 0.0, max_output = 1.5 }]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(MotionError::InvalidOutputCap(_))));
    }

    #[test]
    fn test_start_heading_is_normalized() {
        let config = from_toml(
            r#"
            [routine]
            start = { x = 0.0, y = 0.0, heading = 270.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.routine.start.heading, -90.0);
    }

    #[test]
    fn test_validation_rejects_bad_cap() {
        let config = from_toml(
            r#"
            [motion.translation]
            max_output = 1.5
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(MotionError::InvalidOutputCap(_))));
    }
}

//! Gameplay tuning
//!
//! Plain data consumed by the core. Loading from disk is a convenience for
//! the harness; the game proper receives a ready-made value.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tolerance for the spawn probabilities summing to one
const PROBABILITY_SUM_TOLERANCE: f32 = 0.01;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value outside its allowed range
    #[error("Invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Spawn, physics and booster tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayConfig {
    // === Cube spawn ===
    /// Probability that a new cube holds 2 (otherwise 4)
    pub spawn_probability_2: f32,
    /// Probability of 4; informational, only checked against `spawn_probability_2`
    pub spawn_probability_4: f32,
    /// Seconds between a launch and the next cube appearing
    pub spawn_delay: f32,
    /// Cubes pre-created when gameplay starts
    pub initial_pool_size: usize,
    /// Seed for the spawn RNG
    pub seed: u64,

    // === Physics ===
    /// Contacts with a smaller relative speed never merge
    pub min_collision_impulse: f32,
    /// Forward speed given to a launched cube
    pub cube_launch_force: f32,
    /// Seconds after which the processed-contact set is forgotten
    pub collision_reset_interval: f32,
    /// Lateral drag limit either side of the lane centre
    pub max_lateral_offset: f32,

    // === Auto-merge booster ===
    /// Total animation time across all three phases
    pub auto_merge_duration: f32,
    /// How far both cubes rise before swinging together
    pub auto_merge_rise_height: f32,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            spawn_probability_2: 0.75,
            spawn_probability_4: 0.25,
            spawn_delay: 0.5,
            initial_pool_size: 10,
            seed: 0x2048,

            min_collision_impulse: 1.0,
            cube_launch_force: 10.0,
            collision_reset_interval: 0.5,
            max_lateral_offset: 2.0,

            auto_merge_duration: 0.8,
            auto_merge_rise_height: 2.0,
        }
    }
}

impl GameplayConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        log::info!("Loaded gameplay config from {}", path.display());
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges. The probability sum is only warned about.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("spawn_probability_2", self.spawn_probability_2)?;
        check_unit("spawn_probability_4", self.spawn_probability_4)?;
        check(
            "min_collision_impulse",
            self.min_collision_impulse >= 0.0,
            || format!("must be >= 0, got {}", self.min_collision_impulse),
        )?;
        check(
            "collision_reset_interval",
            self.collision_reset_interval > 0.0,
            || format!("must be > 0, got {}", self.collision_reset_interval),
        )?;
        check(
            "auto_merge_duration",
            self.auto_merge_duration > 0.0,
            || format!("must be > 0, got {}", self.auto_merge_duration),
        )?;
        check(
            "auto_merge_rise_height",
            self.auto_merge_rise_height.is_finite(),
            || "must be finite".to_string(),
        )?;
        check("spawn_delay", self.spawn_delay >= 0.0, || {
            format!("must be >= 0, got {}", self.spawn_delay)
        })?;
        check(
            "max_lateral_offset",
            self.max_lateral_offset >= 0.0,
            || format!("must be >= 0, got {}", self.max_lateral_offset),
        )?;

        let total = self.spawn_probability_2 + self.spawn_probability_4;
        if (total - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            log::warn!("Sum of spawn probabilities is {}, should be 1.0", total);
        }
        Ok(())
    }
}

fn check(field: &'static str, ok: bool, reason: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: reason(),
        })
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    check(field, (0.0..=1.0).contains(&value), || {
        format!("must be within [0, 1], got {}", value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GameplayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            GameplayConfig::from_json_str(r#"{ "spawn_probability_2": 1.0, "seed": 7 }"#).unwrap();
        assert_eq!(config.spawn_probability_2, 1.0);
        assert_eq!(config.seed, 7);
        assert_eq!(config.initial_pool_size, 10);
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        let err = GameplayConfig::from_json_str(r#"{ "spawn_probability_2": 1.5 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "spawn_probability_2",
                ..
            }
        ));
    }

    #[test]
    fn test_non_positive_reset_interval_is_rejected() {
        let config = GameplayConfig {
            collision_reset_interval: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unbalanced_probabilities_only_warn() {
        let config = GameplayConfig {
            spawn_probability_2: 0.9,
            spawn_probability_4: 0.9,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = GameplayConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_json_round_trip_preserves_values() {
        let config = GameplayConfig {
            seed: 99,
            auto_merge_rise_height: 3.5,
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(GameplayConfig::from_json_str(&json).unwrap(), config);
    }
}

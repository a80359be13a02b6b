//! Cube Merge - a physics-driven 2048-style merging game core
//!
//! Core modules:
//! - `bus`: Typed publish/subscribe relay tying the components together
//! - `sim`: Cube pool, cube entities, lifecycle, collision merges, auto-merge
//! - `score`: Score model fed by merge events
//! - `input`: Drag/launch controller for the active cube
//! - `session`: Composition root that wires everything to one bus
//! - `config`: Data-driven gameplay tuning
//! - `palette`: Value to color mapping for cube faces

pub mod bus;
pub mod config;
pub mod input;
pub mod palette;
pub mod score;
pub mod session;
pub mod sim;

pub use bus::{EventBus, EventKind, GameEvent, HandlerError};
pub use config::{ConfigError, GameplayConfig};
pub use palette::CubePalette;
pub use score::{ScoreModel, ScoreSnapshot};
pub use session::{Session, SessionPhase, TickReport};

use glam::Vec3;

/// Game configuration constants
pub mod consts {
    use glam::Vec3;

    /// Fixed simulation timestep used by the harness (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;

    /// Lift applied to a surviving cube after a physical merge so it clears
    /// the volume its partner just vacated
    pub const MERGE_OFFSET: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    /// Distance each cube swings toward its partner in the second
    /// auto-merge phase
    pub const AUTO_MERGE_SWING: f32 = 0.5;

    /// Auto-merge phase split (fractions of the total duration)
    pub const AUTO_MERGE_RISE_SHARE: f32 = 0.3;
    pub const AUTO_MERGE_SWING_SHARE: f32 = 0.2;
    pub const AUTO_MERGE_CONVERGE_SHARE: f32 = 0.5;

    /// Direction a launched cube travels down the lane
    pub const LAUNCH_DIRECTION: Vec3 = Vec3::Z;
}

/// Hermite ease-in/ease-out on [0, 1] (input is clamped)
#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Eased interpolation between two points
#[inline]
pub fn ease_vec3(from: Vec3, to: Vec3, progress: f32) -> Vec3 {
    from.lerp(to, smoothstep(progress))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothstep_endpoints_and_clamp() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(smoothstep(-3.0), 0.0);
        assert_eq!(smoothstep(7.0), 1.0);
        assert!((smoothstep(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ease_vec3_is_symmetric_at_midpoint() {
        let mid = ease_vec3(Vec3::ZERO, Vec3::new(2.0, 4.0, 0.0), 0.5);
        assert!((mid - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }
}

//! Physical body handle owned by a cube
//!
//! The physics engine itself is an external collaborator; this is the state
//! the core reads and writes on its side of that boundary.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Kinematic bodies ignore forces and are moved by the game directly
    pub kinematic: bool,
    /// Whether the body currently takes part in the simulation
    pub enabled: bool,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            kinematic: true,
            enabled: false,
        }
    }
}

impl Body {
    /// Zero both velocities
    pub fn stop(&mut self) {
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
    }

    /// Lock in place (kinematic, not moving)
    pub fn freeze(&mut self) {
        self.stop();
        self.kinematic = true;
    }

    /// Hand control back to the physics engine
    pub fn release(&mut self) {
        self.stop();
        self.kinematic = false;
    }

    /// Instant velocity change (unit mass); ignored while kinematic
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        if self.kinematic {
            return;
        }
        self.linear_velocity += impulse;
    }

    /// Snap to a pose
    pub fn place(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
    }
}

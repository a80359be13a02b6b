//! Cube entity
//!
//! A cube is created once per pool slot and recycled: `initialize` brings a
//! pooled instance back with a fresh id and value, `reset` clears it when it
//! returns to the pool.

use std::fmt;
use std::rc::Rc;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::body::Body;
use super::pool::Poolable;
use crate::config::GameplayConfig;
use crate::consts::LAUNCH_DIRECTION;
use crate::palette::{CubePalette, FALLBACK_COLOR};

/// Gameplay identity of a cube, unique among active cubes
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CubeId(pub u32);

impl fmt::Display for CubeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cube {
    id: CubeId,
    value: u32,
    alive: bool,
    launch_force: f32,
    pub body: Body,
    palette: Option<Rc<CubePalette>>,
    color: Vec3,
    label: String,
}

impl Cube {
    pub fn new() -> Self {
        Self {
            color: FALLBACK_COLOR,
            ..Default::default()
        }
    }

    pub fn id(&self) -> CubeId {
        self.id
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn position(&self) -> Vec3 {
        self.body.position
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Text shown on the cube faces
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bind a palette. The first binding sticks for the instance's lifetime.
    pub fn set_palette(&mut self, palette: Rc<CubePalette>) {
        if self.palette.is_none() {
            self.palette = Some(palette);
            self.refresh_visuals();
        }
    }

    /// Reactivate with a fresh id and a random starting value (2 or 4)
    pub fn initialize<R: Rng>(&mut self, config: &GameplayConfig, id: CubeId, rng: &mut R) {
        self.id = id;
        self.alive = true;
        self.launch_force = config.cube_launch_force;
        self.value = if rng.random::<f32>() < config.spawn_probability_2 {
            2
        } else {
            4
        };
        self.refresh_visuals();
        self.body.freeze();
    }

    /// Send the cube down the lane
    pub fn launch(&mut self) {
        self.body.release();
        self.body.apply_impulse(LAUNCH_DIRECTION * self.launch_force);
    }

    /// Take on a merged value, keeping id and body
    pub fn merge_with(&mut self, new_value: u32) {
        self.value = new_value;
        self.alive = true;
        self.refresh_visuals();
    }

    /// Unlock and move to where the merged cube should appear
    pub fn apply_post_merge_physics(&mut self, position: Vec3) {
        self.body.release();
        self.body.position = position;
    }

    /// Clear gameplay state; the instance stays reusable
    pub fn reset(&mut self) {
        self.value = 0;
        self.alive = false;
        self.refresh_visuals();
        self.body.freeze();
    }

    fn refresh_visuals(&mut self) {
        self.label = if self.value == 0 {
            String::new()
        } else {
            self.value.to_string()
        };
        self.color = self
            .palette
            .as_ref()
            .map(|p| p.color_for(self.value))
            .unwrap_or(FALLBACK_COLOR);
    }
}

impl Poolable for Cube {
    fn activate(&mut self) {
        self.body.enabled = true;
    }

    fn deactivate(&mut self) {
        self.reset();
        self.body.enabled = false;
    }

    fn is_active(&self) -> bool {
        self.body.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn config_with_p2(p2: f32) -> GameplayConfig {
        GameplayConfig {
            spawn_probability_2: p2,
            spawn_probability_4: 1.0 - p2,
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_respects_probability_extremes() {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut cube = Cube::new();

        for i in 0..100 {
            cube.initialize(&config_with_p2(1.0), CubeId(i), &mut rng);
            assert_eq!(cube.value(), 2);
            cube.initialize(&config_with_p2(0.0), CubeId(i), &mut rng);
            assert_eq!(cube.value(), 4);
        }
        assert!(cube.is_alive());
        assert!(cube.body.kinematic);
    }

    #[test]
    fn test_merge_keeps_identity() {
        let mut rng = Pcg32::seed_from_u64(2);
        let mut cube = Cube::new();
        cube.initialize(&config_with_p2(1.0), CubeId(5), &mut rng);

        cube.merge_with(4);
        assert_eq!(cube.id(), CubeId(5));
        assert_eq!(cube.value(), 4);
        assert_eq!(cube.label(), "4");
    }

    #[test]
    fn test_post_merge_physics_unlocks_and_moves() {
        let mut cube = Cube::new();
        cube.body.linear_velocity = Vec3::X;
        cube.apply_post_merge_physics(Vec3::new(1.0, 2.0, 3.0));
        assert!(!cube.body.kinematic);
        assert_eq!(cube.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cube.body.linear_velocity, Vec3::ZERO);
    }

    #[test]
    fn test_launch_moves_forward() {
        let mut rng = Pcg32::seed_from_u64(3);
        let mut cube = Cube::new();
        cube.initialize(&GameplayConfig::default(), CubeId(0), &mut rng);
        cube.launch();
        assert!(!cube.body.kinematic);
        assert_eq!(cube.body.linear_velocity, Vec3::Z * 10.0);
    }

    #[test]
    fn test_reset_clears_value_and_liveness() {
        let mut rng = Pcg32::seed_from_u64(4);
        let mut cube = Cube::new();
        cube.initialize(&GameplayConfig::default(), CubeId(1), &mut rng);
        cube.launch();
        cube.reset();
        assert_eq!(cube.value(), 0);
        assert!(!cube.is_alive());
        assert!(cube.body.kinematic);
        assert_eq!(cube.body.linear_velocity, Vec3::ZERO);
        assert_eq!(cube.label(), "");
    }

    #[test]
    fn test_first_palette_binding_wins() {
        let mut cube = Cube::new();
        cube.merge_with(8);
        assert_eq!(cube.color(), FALLBACK_COLOR);

        cube.set_palette(Rc::new(CubePalette::default()));
        assert_eq!(cube.color(), Vec3::new(1.0, 0.8, 0.6));

        let other = CubePalette::from(vec![crate::palette::PaletteEntry {
            value: 8,
            color: Vec3::ZERO,
        }]);
        cube.set_palette(Rc::new(other));
        assert_eq!(cube.color(), Vec3::new(1.0, 0.8, 0.6));
    }
}

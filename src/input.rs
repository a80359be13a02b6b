//! Drag and launch handling for the held cube
//!
//! Touch coordinates arrive already projected onto the lane's X axis.

use std::rc::Rc;

use crate::bus::{EventBus, GameEvent};
use crate::config::GameplayConfig;
use crate::sim::{CubeId, CubeLifecycle};

/// Force reported with every player launch
pub const PLAYER_LAUNCH_FORCE: f32 = 1.0;

pub struct DragController {
    bus: Rc<EventBus>,
    max_lateral_offset: f32,
    /// Cube grabbed by the current touch
    dragging: Option<CubeId>,
}

impl DragController {
    pub fn new(bus: Rc<EventBus>, config: &GameplayConfig) -> Self {
        Self {
            bus,
            max_lateral_offset: config.max_lateral_offset,
            dragging: None,
        }
    }

    pub fn dragging(&self) -> Option<CubeId> {
        self.dragging
    }

    pub fn clamp_lateral(&self, x: f32) -> f32 {
        x.clamp(-self.max_lateral_offset, self.max_lateral_offset)
    }

    /// Grab the held cube and lock it kinematic. False if nothing is held.
    pub fn on_touch_started(&mut self, cubes: &mut CubeLifecycle, _x: f32) -> bool {
        let Some(id) = cubes.active_cube_id() else {
            return false;
        };
        let Some(cube) = cubes.cube_mut(id) else {
            return false;
        };
        cube.body.freeze();
        self.dragging = Some(id);
        true
    }

    /// Slide the grabbed cube sideways, within the lane
    pub fn on_touch_moved(&mut self, cubes: &mut CubeLifecycle, x: f32) {
        let x = self.clamp_lateral(x);
        let Some(id) = self.dragging else {
            return;
        };
        if let Some(cube) = cubes.cube_mut(id) {
            cube.body.position.x = x;
        }
    }

    /// Let go: launch the grabbed cube and announce it
    pub fn on_touch_ended(&mut self, cubes: &mut CubeLifecycle, x: f32) -> Option<CubeId> {
        let id = self.dragging.take()?;
        let x = self.clamp_lateral(x);
        let cube = cubes.cube_mut(id)?;
        cube.body.position.x = x;
        cube.launch();

        log::debug!("Cube {} launched from x={:.2}", id, x);
        self.bus.publish(GameEvent::CubeLaunched {
            force: PLAYER_LAUNCH_FORCE,
        });
        Some(id)
    }

    /// Drop any grab in progress
    pub fn on_reset(&mut self) {
        self.dragging = None;
    }
}

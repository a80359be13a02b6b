//! Cube lifecycle manager
//!
//! Owns the cube pool and the table of active cubes. Every spawn, removal
//! and reset goes through here; collision and auto-merge logic retire cubes
//! by calling [`CubeLifecycle::remove_cube`].
//!
//! Ids come from a per-session counter and are never reused until
//! [`CubeLifecycle::reset_cubes`] rewinds it.

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::{Quat, Vec3};
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::cube::{Cube, CubeId};
use super::pool::{ObjectPool, SlotIndex};
use crate::bus::{EventBus, GameEvent};
use crate::config::GameplayConfig;
use crate::palette::CubePalette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No gameplay scene yet; cube operations are ignored
    Uninitialized,
    Ready,
}

pub struct CubeLifecycle {
    bus: Rc<EventBus>,
    config: GameplayConfig,
    palette: Rc<CubePalette>,
    rng: Pcg32,
    state: LifecycleState,
    pool: Option<ObjectPool<Cube>>,
    /// Active cubes by id (ordered, so snapshots iterate by ascending id)
    active: BTreeMap<CubeId, SlotIndex>,
    /// Held cube: spawned at the anchor and not launched yet
    active_cube: Option<CubeId>,
    next_id: u32,
    spawn_anchor: Vec3,
    /// Seconds left before the post-launch respawn fires
    pending_spawn: Option<f32>,
}

impl CubeLifecycle {
    pub fn new(bus: Rc<EventBus>, config: GameplayConfig, palette: Rc<CubePalette>) -> Self {
        let rng = Pcg32::seed_from_u64(config.seed);
        Self {
            bus,
            config,
            palette,
            rng,
            state: LifecycleState::Uninitialized,
            pool: None,
            active: BTreeMap::new(),
            active_cube: None,
            next_id: 0,
            spawn_anchor: Vec3::ZERO,
            pending_spawn: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn config(&self) -> &GameplayConfig {
        &self.config
    }

    pub fn spawn_anchor(&self) -> Vec3 {
        self.spawn_anchor
    }

    /// Build the pool and spawn the first cube. No-op when already ready.
    pub fn initialize_gameplay(&mut self, spawn_anchor: Vec3) {
        if self.is_ready() {
            log::warn!("[CubeLifecycle] Already initialized");
            return;
        }

        let mut prototype = Cube::new();
        prototype.set_palette(Rc::clone(&self.palette));
        self.pool = Some(ObjectPool::new(
            prototype,
            self.config.initial_pool_size,
            Some("cubes"),
        ));
        self.spawn_anchor = spawn_anchor;
        self.state = LifecycleState::Ready;

        self.spawn_new_cube();
        log::info!("[CubeLifecycle] Gameplay ready at {}", spawn_anchor);
    }

    /// Take a cube from the pool, place it at the anchor and make it the
    /// active cube
    pub fn spawn_new_cube(&mut self) -> Option<CubeId> {
        if !self.is_ready() {
            log::debug!("[CubeLifecycle] Spawn ignored: not initialized");
            return None;
        }
        let pool = self.pool.as_mut()?;

        let slot = pool.get();
        let id = CubeId(self.next_id);
        let cube = pool.get_mut(slot)?;
        cube.body.place(self.spawn_anchor, Quat::IDENTITY);
        cube.initialize(&self.config, id, &mut self.rng);
        let value = cube.value();

        self.next_id += 1;
        self.active.insert(id, slot);
        self.active_cube = Some(id);

        self.bus.publish(GameEvent::ActiveCubeChanged { cube_id: id });
        self.bus.publish(GameEvent::CubeSpawned { cube_id: id });
        log::info!("[CubeLifecycle] Cube {} spawned with value {}", id, value);
        Some(id)
    }

    /// The held cube has left the anchor: release it from the active slot
    /// and schedule the next spawn, replacing any spawn already pending
    pub fn on_cube_launched(&mut self) {
        if !self.is_ready() {
            return;
        }
        self.active_cube = None;
        if self.pending_spawn.is_some() {
            log::debug!("[CubeLifecycle] Pending spawn rescheduled");
        }
        self.pending_spawn = Some(self.config.spawn_delay);
    }

    pub fn has_pending_spawn(&self) -> bool {
        self.pending_spawn.is_some()
    }

    /// Advance the respawn timer; returns the id spawned this tick, if any
    pub fn tick(&mut self, dt: f32) -> Option<CubeId> {
        let remaining = self.pending_spawn? - dt;
        if remaining > 0.0 {
            self.pending_spawn = Some(remaining);
            return None;
        }
        self.pending_spawn = None;
        self.spawn_new_cube()
    }

    /// Return a cube to the pool. False if it was not active.
    pub fn remove_cube(&mut self, id: CubeId) -> bool {
        let Some(pool) = self.pool.as_mut() else {
            return false;
        };
        let Some(slot) = self.active.remove(&id) else {
            log::debug!("[CubeLifecycle] Cube {} already removed", id);
            return false;
        };

        if let Some(cube) = pool.get_mut(slot) {
            cube.body.rotation = Quat::IDENTITY;
        }
        pool.release(slot);
        if self.active_cube == Some(id) {
            self.active_cube = None;
        }
        true
    }

    /// Clear the field: every active cube back to the pool, idle instances
    /// discarded, id counter rewound. Publishes `GameplayReset`.
    pub fn reset_cubes(&mut self) {
        let Some(pool) = self.pool.as_mut() else {
            log::debug!("[CubeLifecycle] Reset ignored: not initialized");
            return;
        };

        self.pending_spawn = None;
        let returned = self.active.len();
        for (_, slot) in std::mem::take(&mut self.active) {
            pool.release(slot);
        }
        pool.reset_all();
        self.next_id = 0;
        self.active_cube = None;

        log::info!("[CubeLifecycle] Reset, {} cubes returned", returned);
        self.bus.publish(GameEvent::GameplayReset);
    }

    /// The cube waiting at the spawn anchor, if it is still active
    pub fn active_cube(&self) -> Option<&Cube> {
        self.active_cube.and_then(|id| self.cube(id))
    }

    pub fn active_cube_id(&self) -> Option<CubeId> {
        self.active_cube
    }

    pub fn cube(&self, id: CubeId) -> Option<&Cube> {
        let slot = *self.active.get(&id)?;
        self.pool.as_ref()?.get_ref(slot)
    }

    pub fn cube_mut(&mut self, id: CubeId) -> Option<&mut Cube> {
        let slot = *self.active.get(&id)?;
        self.pool.as_mut()?.get_mut(slot)
    }

    pub fn contains(&self, id: CubeId) -> bool {
        self.active.contains_key(&id)
    }

    /// Ids of all active cubes, ascending
    pub fn active_ids(&self) -> Vec<CubeId> {
        self.active.keys().copied().collect()
    }

    /// Snapshot of the active table, ascending by id
    pub fn active_cubes(&self) -> Vec<&Cube> {
        let Some(pool) = self.pool.as_ref() else {
            return Vec::new();
        };
        self.active
            .values()
            .filter_map(|slot| pool.get_ref(*slot))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pool(&self) -> Option<&ObjectPool<Cube>> {
        self.pool.as_ref()
    }
}

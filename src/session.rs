//! Gameplay session
//!
//! Composition root: owns one bus and every gameplay component, and routes
//! bus events to them. Components never hold each other; handlers reach
//! them through a weak handle to the shared component set and borrow only
//! what the event needs.

use std::cell::{Cell, RefCell, RefMut};
use std::rc::{Rc, Weak};

use glam::Vec3;
use serde::Serialize;

use crate::bus::{EventBus, EventKind, GameEvent, Handler, HandlerError, handler};
use crate::config::{ConfigError, GameplayConfig};
use crate::input::DragController;
use crate::palette::CubePalette;
use crate::score::{ScoreModel, ScoreSnapshot};
use crate::sim::{
    AutoMergeOrchestrator, AutoMergeOutcome, AutoMergeRejected, AutoMergeState, CollisionRequest,
    CollisionResolver, CollisionVerdict, CubeId, CubeLifecycle,
};

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Waiting for the gameplay scene (no spawn anchor yet)
    Loading,
    /// Active gameplay
    Playing,
    /// A cube reached the game over zone
    GameOver,
}

/// What one `Session::tick` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Cube spawned by the respawn timer
    pub spawned: Option<CubeId>,
    /// Set when an auto-merge run ended this tick
    pub auto_merge: Option<AutoMergeOutcome>,
}

struct Components {
    cubes: RefCell<CubeLifecycle>,
    collisions: RefCell<CollisionResolver>,
    auto_merge: RefCell<AutoMergeOrchestrator>,
    drag: RefCell<DragController>,
    score: Rc<RefCell<ScoreModel>>,
    phase: Cell<SessionPhase>,
}

fn acquire<'a, T>(cell: &'a RefCell<T>, name: &'static str) -> Result<RefMut<'a, T>, HandlerError> {
    cell.try_borrow_mut().map_err(|_| HandlerError::Busy(name))
}

impl Components {
    fn is_playing(&self) -> bool {
        self.phase.get() == SessionPhase::Playing
    }

    fn on_scene_loaded(&self, spawn_anchor: Vec3) -> Result<(), HandlerError> {
        let mut cubes = acquire(&self.cubes, "cube lifecycle")?;
        cubes.initialize_gameplay(spawn_anchor);
        if cubes.is_ready() && self.phase.get() == SessionPhase::Loading {
            self.phase.set(SessionPhase::Playing);
        }
        Ok(())
    }

    fn on_collision(&self, request: &CollisionRequest) -> Result<(), HandlerError> {
        if !self.is_playing() {
            return Ok(());
        }
        let mut cubes = acquire(&self.cubes, "cube lifecycle")?;
        let mut collisions = acquire(&self.collisions, "collision resolver")?;
        match collisions.handle(&mut cubes, request) {
            CollisionVerdict::Merged(_) => {}
            verdict => log::trace!("Collision {:?}: {:?}", request.initiator, verdict),
        }
        Ok(())
    }

    /// Field was cleared: forget everything tied to the old cubes
    fn on_gameplay_reset(&self) -> Result<(), HandlerError> {
        acquire(&self.collisions, "collision resolver")?.on_reset();
        acquire(&self.auto_merge, "auto-merge")?.on_reset();
        acquire(&self.drag, "drag controller")?.on_reset();
        Ok(())
    }

    fn on_touch(&self, event: &GameEvent) -> Result<(), HandlerError> {
        if !self.is_playing() {
            return Ok(());
        }
        let mut cubes = acquire(&self.cubes, "cube lifecycle")?;
        let mut drag = acquire(&self.drag, "drag controller")?;
        match *event {
            GameEvent::TouchStarted { x } => {
                drag.on_touch_started(&mut cubes, x);
            }
            GameEvent::TouchMoved { x } => drag.on_touch_moved(&mut cubes, x),
            GameEvent::TouchEnded { x } => {
                drag.on_touch_ended(&mut cubes, x);
            }
            _ => return Err(HandlerError::Unexpected(event.kind())),
        }
        Ok(())
    }

    fn restart(&self) -> Result<(), HandlerError> {
        let mut cubes = acquire(&self.cubes, "cube lifecycle")?;
        cubes.reset_cubes();
        acquire(&self.score, "score model")?.reset_score();
        if cubes.is_ready() {
            self.phase.set(SessionPhase::Playing);
            cubes.spawn_new_cube();
            log::info!("Session restarted");
        }
        Ok(())
    }
}

pub struct Session {
    bus: Rc<EventBus>,
    config: GameplayConfig,
    parts: Rc<Components>,
    subscriptions: Vec<(EventKind, Handler)>,
}

impl Session {
    /// Build a session around a fresh bus. The config is validated first.
    pub fn new(config: GameplayConfig, palette: CubePalette) -> Result<Self, ConfigError> {
        config.validate()?;
        let bus = Rc::new(EventBus::new());

        let parts = Rc::new(Components {
            cubes: RefCell::new(CubeLifecycle::new(
                Rc::clone(&bus),
                config.clone(),
                Rc::new(palette),
            )),
            collisions: RefCell::new(CollisionResolver::new(Rc::clone(&bus), &config)),
            auto_merge: RefCell::new(AutoMergeOrchestrator::new(Rc::clone(&bus), &config)),
            drag: RefCell::new(DragController::new(Rc::clone(&bus), &config)),
            score: ScoreModel::attach(Rc::clone(&bus)),
            phase: Cell::new(SessionPhase::Loading),
        });

        let mut session = Self {
            bus,
            config,
            parts,
            subscriptions: Vec::new(),
        };
        session.wire();
        log::info!("Session created (seed {:#x})", session.config.seed);
        Ok(session)
    }

    fn wire(&mut self) {
        self.route(EventKind::GameplaySceneLoaded, |parts, event| match event {
            GameEvent::GameplaySceneLoaded { spawn_anchor } => parts.on_scene_loaded(*spawn_anchor),
            other => Err(HandlerError::Unexpected(other.kind())),
        });
        self.route(EventKind::CubeLaunched, |parts, _| {
            acquire(&parts.cubes, "cube lifecycle")?.on_cube_launched();
            Ok(())
        });
        self.route(EventKind::CollisionRequested, |parts, event| match event {
            GameEvent::CollisionRequested(request) => parts.on_collision(request),
            other => Err(HandlerError::Unexpected(other.kind())),
        });
        self.route(EventKind::ResetRequested, |parts, _| {
            acquire(&parts.cubes, "cube lifecycle")?.reset_cubes();
            Ok(())
        });
        self.route(EventKind::GameplayReset, |parts, _| parts.on_gameplay_reset());
        self.route(EventKind::RestartRequested, |parts, _| parts.restart());
        for kind in [
            EventKind::TouchStarted,
            EventKind::TouchMoved,
            EventKind::TouchEnded,
        ] {
            self.route(kind, |parts, event| parts.on_touch(event));
        }
    }

    fn route<F>(&mut self, kind: EventKind, f: F)
    where
        F: Fn(&Components, &GameEvent) -> Result<(), HandlerError> + 'static,
    {
        let weak: Weak<Components> = Rc::downgrade(&self.parts);
        let h = handler(move |event| {
            let parts = weak.upgrade().ok_or(HandlerError::Gone("session"))?;
            f(&parts, event)
        });
        self.bus.subscribe(kind, Rc::clone(&h));
        self.subscriptions.push((kind, h));
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &GameplayConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.parts.phase.get()
    }

    /// Shorthand for publishing on the session's bus
    pub fn publish(&self, event: GameEvent) {
        self.bus.publish(event);
    }

    /// Announce the gameplay scene; the first cube spawns at `spawn_anchor`
    pub fn load_scene(&self, spawn_anchor: Vec3) {
        self.publish(GameEvent::GameplaySceneLoaded { spawn_anchor });
    }

    /// Forward a contact from the physics collaborator
    pub fn report_collision(&self, request: CollisionRequest) {
        self.publish(GameEvent::CollisionRequested(request));
    }

    /// Advance timers and the auto-merge animation by `dt` seconds. Events
    /// raised along the way are delivered once the step is done.
    pub fn tick(&self, dt: f32) -> TickReport {
        if !self.parts.is_playing() {
            return TickReport::default();
        }
        self.bus.deferred(|| {
            let mut cubes = self.parts.cubes.borrow_mut();
            let spawned = cubes.tick(dt);
            self.parts.collisions.borrow_mut().tick(dt);
            let auto_merge = self.parts.auto_merge.borrow_mut().tick(&mut cubes, dt);
            TickReport {
                spawned,
                auto_merge,
            }
        })
    }

    /// Start an auto-merge on the current field
    pub fn run_auto_merge(&self) -> Result<(), AutoMergeRejected> {
        let mut cubes = self.parts.cubes.borrow_mut();
        self.parts.auto_merge.borrow_mut().run(&mut cubes)
    }

    /// Ask the running auto-merge to stop at its next step
    pub fn cancel_auto_merge(&self) {
        self.parts.auto_merge.borrow().cancel();
    }

    pub fn auto_merge_state(&self) -> AutoMergeState {
        self.parts.auto_merge.borrow().state()
    }

    /// Clear the field and score and start over with a fresh cube
    pub fn restart(&self) {
        let result = self.bus.deferred(|| self.parts.restart());
        if let Err(err) = result {
            log::error!("Restart failed: {}", err);
        }
    }

    /// A cube touched the game over zone. Only the first report while
    /// playing counts.
    pub fn cube_entered_game_over_zone(&self, cube_id: CubeId) -> bool {
        if !self.parts.is_playing() || !self.parts.cubes.borrow().contains(cube_id) {
            return false;
        }
        self.parts.phase.set(SessionPhase::GameOver);
        log::info!("Game over: cube {} reached the zone", cube_id);
        self.publish(GameEvent::GameOver { cube_id });
        true
    }

    pub fn score(&self) -> ScoreSnapshot {
        self.parts.score.borrow().snapshot()
    }

    /// Read access to the cube lifecycle
    pub fn with_cubes<R>(&self, f: impl FnOnce(&CubeLifecycle) -> R) -> R {
        f(&self.parts.cubes.borrow())
    }

    /// Write access for the physics collaborator (moving bodies between
    /// ticks). Bus delivery waits until `f` returns.
    pub fn with_cubes_mut<R>(&self, f: impl FnOnce(&mut CubeLifecycle) -> R) -> R {
        self.bus.deferred(|| f(&mut self.parts.cubes.borrow_mut()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (kind, h) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(kind, &h);
        }
        if let Ok(mut score) = self.parts.score.try_borrow_mut() {
            score.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::record;
    use crate::consts::SIM_DT;

    fn playing_session(config: GameplayConfig) -> Session {
        let session = Session::new(config, CubePalette::default()).unwrap();
        session.load_scene(Vec3::new(0.0, 0.5, -4.0));
        session
    }

    fn set_value(session: &Session, id: CubeId, value: u32, position: Vec3) {
        session.with_cubes_mut(|cubes| {
            let cube = cubes.cube_mut(id).unwrap();
            cube.merge_with(value);
            cube.apply_post_merge_physics(position);
        });
    }

    /// Drag and release the held cube, then tick until its successor spawns
    fn throw(session: &Session) -> CubeId {
        let held = session.with_cubes(|c| c.active_cube_id()).unwrap();
        session.publish(GameEvent::TouchStarted { x: 0.0 });
        session.publish(GameEvent::TouchEnded { x: 0.0 });
        for _ in 0..120 {
            if session.tick(SIM_DT).spawned.is_some() {
                break;
            }
        }
        held
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = GameplayConfig {
            auto_merge_duration: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            Session::new(config, CubePalette::default()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_scene_load_starts_play() {
        let session = Session::new(GameplayConfig::default(), CubePalette::default()).unwrap();
        assert_eq!(session.phase(), SessionPhase::Loading);
        assert_eq!(session.tick(SIM_DT), TickReport::default());

        session.load_scene(Vec3::ZERO);
        assert_eq!(session.phase(), SessionPhase::Playing);
        assert_eq!(session.with_cubes(|c| c.active_count()), 1);
    }

    #[test]
    fn test_launch_respawns_after_delay() {
        let session = playing_session(GameplayConfig::default());
        let spawned = record(session.bus(), &[EventKind::CubeSpawned]);

        let first = throw(&session);

        assert_eq!(first, CubeId(0));
        assert_eq!(session.with_cubes(|c| c.active_cube_id()), Some(CubeId(1)));
        assert_eq!(
            *spawned.borrow(),
            vec![GameEvent::CubeSpawned { cube_id: CubeId(1) }]
        );
    }

    #[test]
    fn test_collision_merge_feeds_score() {
        let session = playing_session(GameplayConfig::default());
        let a = throw(&session);
        let b = throw(&session);
        set_value(&session, a, 4, Vec3::new(0.0, 0.5, 3.0));
        set_value(&session, b, 4, Vec3::new(0.0, 0.5, 2.0));

        let request = CollisionRequest {
            initiator: a,
            counterpart: Some(b),
            impact: Vec3::new(0.0, 0.0, -5.0),
            contact_point: Vec3::new(0.0, 0.5, 2.5),
        };
        session.report_collision(request.clone());
        session.report_collision(request);

        assert_eq!(session.score(), ScoreSnapshot { score: 4, best: 4 });
        assert_eq!(session.with_cubes(|c| c.cube(a).unwrap().value()), 8);
        assert!(session.with_cubes(|c| !c.contains(b)));
    }

    #[test]
    fn test_auto_merge_runs_through_ticks() {
        let session = playing_session(GameplayConfig::default());
        let a = throw(&session);
        let b = throw(&session);
        set_value(&session, a, 2, Vec3::new(-1.0, 0.5, 3.0));
        set_value(&session, b, 2, Vec3::new(1.0, 0.5, 3.0));

        session.run_auto_merge().unwrap();
        assert_eq!(
            session.run_auto_merge(),
            Err(AutoMergeRejected::AlreadyRunning)
        );

        let mut outcome = None;
        for _ in 0..200 {
            if let Some(done) = session.tick(SIM_DT).auto_merge {
                outcome = Some(done);
                break;
            }
        }
        assert!(matches!(outcome, Some(AutoMergeOutcome::Merged(_))));
        assert_eq!(session.score().score, 2);
        assert_eq!(session.auto_merge_state(), AutoMergeState::Idle);
    }

    #[test]
    fn test_reset_request_cancels_auto_merge() {
        let session = playing_session(GameplayConfig::default());
        let merges = record(session.bus(), &[EventKind::CubeMerged]);
        let a = throw(&session);
        let b = throw(&session);
        set_value(&session, a, 2, Vec3::new(-1.0, 0.5, 3.0));
        set_value(&session, b, 2, Vec3::new(1.0, 0.5, 3.0));

        session.run_auto_merge().unwrap();
        session.tick(SIM_DT);
        session.publish(GameEvent::ResetRequested);

        assert_eq!(session.auto_merge_state(), AutoMergeState::Idle);
        assert_eq!(session.with_cubes(|c| c.active_count()), 0);
        for _ in 0..100 {
            session.tick(SIM_DT);
        }
        assert!(merges.borrow().is_empty());
    }

    #[test]
    fn test_game_over_stops_play_until_restart() {
        let session = playing_session(GameplayConfig::default());
        let overs = record(session.bus(), &[EventKind::GameOver]);
        let thrown = throw(&session);
        set_value(&session, thrown, 8, Vec3::new(0.0, 0.5, 3.0));
        session.publish(GameEvent::CubeMerged {
            resulting_value: 16,
            merge_position: Vec3::ZERO,
            score_gained: 8,
        });

        assert!(session.cube_entered_game_over_zone(thrown));
        assert!(!session.cube_entered_game_over_zone(thrown));
        assert_eq!(session.phase(), SessionPhase::GameOver);
        assert_eq!(overs.borrow().len(), 1);

        // Input is ignored while the run is over
        session.publish(GameEvent::TouchStarted { x: 0.0 });
        session.publish(GameEvent::TouchEnded { x: 0.0 });
        assert_eq!(session.tick(1.0), TickReport::default());

        session.publish(GameEvent::RestartRequested);
        assert_eq!(session.phase(), SessionPhase::Playing);
        assert_eq!(session.score(), ScoreSnapshot { score: 0, best: 8 });
        assert_eq!(session.with_cubes(|c| c.active_ids()), vec![CubeId(0)]);
    }

    #[test]
    fn test_unknown_cube_does_not_end_game() {
        let session = playing_session(GameplayConfig::default());
        assert!(!session.cube_entered_game_over_zone(CubeId(99)));
        assert_eq!(session.phase(), SessionPhase::Playing);
    }

    #[test]
    fn test_drop_unsubscribes_everything() {
        let session = playing_session(GameplayConfig::default());
        let bus = Rc::clone(session.bus());
        drop(session);

        for kind in [
            EventKind::GameplaySceneLoaded,
            EventKind::CollisionRequested,
            EventKind::TouchEnded,
            EventKind::CubeMerged,
        ] {
            assert_eq!(bus.subscriber_count(kind), 0);
        }
    }
}

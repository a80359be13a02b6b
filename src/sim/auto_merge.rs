//! Animated auto-merge
//!
//! Picks two free cubes of equal value and merges them without a physical
//! collision: both rise, swing toward each other, then converge on a shared
//! point where the merge is applied. The animation is a plain state machine
//! advanced by `tick`; cancellation is a flag polled at the start of every
//! step, so a step that has started always finishes.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec3;

use super::collision::MergeRecord;
use super::cube::CubeId;
use super::lifecycle::CubeLifecycle;
use crate::bus::EventBus;
use crate::config::GameplayConfig;
use crate::consts::{
    AUTO_MERGE_CONVERGE_SHARE, AUTO_MERGE_RISE_SHARE, AUTO_MERGE_SWING, AUTO_MERGE_SWING_SHARE,
};
use crate::ease_vec3;

/// Shared cancellation flag for one run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMergePhase {
    /// Both cubes lift straight up
    Rising,
    /// Both cubes lean toward each other
    Swinging,
    /// Both cubes close in on the meeting point
    Converging,
}

impl AutoMergePhase {
    fn share(self) -> f32 {
        match self {
            AutoMergePhase::Rising => AUTO_MERGE_RISE_SHARE,
            AutoMergePhase::Swinging => AUTO_MERGE_SWING_SHARE,
            AutoMergePhase::Converging => AUTO_MERGE_CONVERGE_SHARE,
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            AutoMergePhase::Rising => Some(AutoMergePhase::Swinging),
            AutoMergePhase::Swinging => Some(AutoMergePhase::Converging),
            AutoMergePhase::Converging => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMergeState {
    Idle,
    Animating(AutoMergePhase),
}

/// Why `run` refused to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AutoMergeRejected {
    #[error("an auto-merge is already running")]
    AlreadyRunning,
    #[error("no two free cubes share a value")]
    NoPair,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum AutoMergeOutcome {
    Merged(MergeRecord),
    /// Cancelled on request; cubes stay where the animation left them
    Cancelled,
    /// A participant left the field (or changed value) mid-animation
    Interrupted,
}

/// Waypoints for both cubes, computed once when the run starts
#[derive(Debug, Clone)]
struct Animation {
    first: CubeId,
    second: CubeId,
    phase: AutoMergePhase,
    elapsed: f32,
    start: [Vec3; 2],
    risen: [Vec3; 2],
    swung: [Vec3; 2],
    meeting: Vec3,
    cancel: CancelToken,
}

impl Animation {
    fn new(first: CubeId, second: CubeId, start: [Vec3; 2], rise_height: f32) -> Self {
        let risen = start.map(|p| p + Vec3::Y * rise_height);
        let toward = (risen[1] - risen[0]).normalize_or_zero();
        let swung = [
            risen[0] + toward * AUTO_MERGE_SWING,
            risen[1] - toward * AUTO_MERGE_SWING,
        ];
        Self {
            first,
            second,
            phase: AutoMergePhase::Rising,
            elapsed: 0.0,
            start,
            risen,
            swung,
            meeting: (swung[0] + swung[1]) * 0.5,
            cancel: CancelToken::new(),
        }
    }

    /// (from, to) for the current phase
    fn leg(&self) -> ([Vec3; 2], [Vec3; 2]) {
        match self.phase {
            AutoMergePhase::Rising => (self.start, self.risen),
            AutoMergePhase::Swinging => (self.risen, self.swung),
            AutoMergePhase::Converging => (self.swung, [self.meeting; 2]),
        }
    }
}

pub struct AutoMergeOrchestrator {
    bus: Rc<EventBus>,
    duration: f32,
    rise_height: f32,
    animation: Option<Animation>,
}

impl AutoMergeOrchestrator {
    pub fn new(bus: Rc<EventBus>, config: &GameplayConfig) -> Self {
        Self {
            bus,
            duration: config.auto_merge_duration,
            rise_height: config.auto_merge_rise_height,
            animation: None,
        }
    }

    pub fn state(&self) -> AutoMergeState {
        match &self.animation {
            Some(animation) => AutoMergeState::Animating(animation.phase),
            None => AutoMergeState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.animation.is_some()
    }

    /// Ids being merged by the current run, first one survives
    pub fn participants(&self) -> Option<(CubeId, CubeId)> {
        self.animation.as_ref().map(|a| (a.first, a.second))
    }

    /// Token of the current run, for callers that cancel from elsewhere
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.animation.as_ref().map(|a| a.cancel.clone())
    }

    /// Request cancellation; takes effect on the next `tick`
    pub fn cancel(&self) {
        if let Some(animation) = &self.animation {
            animation.cancel.cancel();
        }
    }

    /// Abort immediately without merging
    pub fn on_reset(&mut self) {
        if let Some(animation) = self.animation.take() {
            animation.cancel.cancel();
            log::info!(
                "Auto-merge of {} and {} aborted by reset",
                animation.first, animation.second
            );
        }
    }

    /// First two free cubes of the first value that occurs at least twice,
    /// scanning in id order. The active (not yet launched) cube never takes part.
    pub fn find_pair(cubes: &CubeLifecycle) -> Option<(CubeId, CubeId)> {
        let held = cubes.active_cube_id();
        let mut groups: Vec<(u32, Vec<CubeId>)> = Vec::new();

        for cube in cubes.active_cubes() {
            if !cube.is_alive() || !cube.body.enabled || Some(cube.id()) == held {
                continue;
            }
            match groups.iter_mut().find(|(value, _)| *value == cube.value()) {
                Some((_, members)) => members.push(cube.id()),
                None => groups.push((cube.value(), vec![cube.id()])),
            }
        }

        groups
            .into_iter()
            .find(|(_, members)| members.len() >= 2)
            .map(|(_, members)| (members[0], members[1]))
    }

    /// Start a run. Both chosen cubes are locked kinematic for the animation.
    pub fn run(&mut self, cubes: &mut CubeLifecycle) -> Result<(), AutoMergeRejected> {
        if self.is_running() {
            log::debug!("Auto-merge already running");
            return Err(AutoMergeRejected::AlreadyRunning);
        }
        let (first, second) = Self::find_pair(cubes).ok_or(AutoMergeRejected::NoPair)?;

        let mut start = [Vec3::ZERO; 2];
        for (slot, id) in start.iter_mut().zip([first, second]) {
            if let Some(cube) = cubes.cube_mut(id) {
                cube.body.freeze();
                *slot = cube.position();
            }
        }

        log::info!("Auto-merge started: {} + {}", first, second);
        self.animation = Some(Animation::new(first, second, start, self.rise_height));
        Ok(())
    }

    /// Advance one animation step. Returns the outcome once the run ends.
    pub fn tick(&mut self, cubes: &mut CubeLifecycle, dt: f32) -> Option<AutoMergeOutcome> {
        let animation = self.animation.as_mut()?;

        if animation.cancel.is_cancelled() {
            log::info!("Auto-merge cancelled");
            self.animation = None;
            return Some(AutoMergeOutcome::Cancelled);
        }
        if !Self::still_mergeable(cubes, animation.first, animation.second) {
            log::warn!("Auto-merge interrupted: participants no longer mergeable");
            Self::release_participants(cubes, animation);
            self.animation = None;
            return Some(AutoMergeOutcome::Interrupted);
        }

        let phase_duration = self.duration * animation.phase.share();
        animation.elapsed += dt;
        let progress = if phase_duration > 0.0 {
            animation.elapsed / phase_duration
        } else {
            1.0
        };

        let (from, to) = animation.leg();
        let done = progress >= 1.0;
        for (i, id) in [animation.first, animation.second].into_iter().enumerate() {
            if let Some(cube) = cubes.cube_mut(id) {
                cube.body.position = if done {
                    to[i]
                } else {
                    ease_vec3(from[i], to[i], progress)
                };
            }
        }
        if !done {
            return None;
        }

        match animation.phase.next() {
            Some(next) => {
                animation.phase = next;
                animation.elapsed = 0.0;
                None
            }
            None => {
                let finished = self.animation.take()?;
                Some(self.apply(cubes, &finished))
            }
        }
    }

    fn still_mergeable(cubes: &CubeLifecycle, first: CubeId, second: CubeId) -> bool {
        match (cubes.cube(first), cubes.cube(second)) {
            (Some(a), Some(b)) => {
                a.is_alive()
                    && b.is_alive()
                    && a.value() == b.value()
                    && a.value().checked_mul(2).is_some()
            }
            _ => false,
        }
    }

    /// Hand any participant still on the field back to physics
    fn release_participants(cubes: &mut CubeLifecycle, animation: &Animation) {
        for id in [animation.first, animation.second] {
            if let Some(cube) = cubes.cube_mut(id).filter(|cube| cube.is_alive()) {
                cube.body.release();
            }
        }
    }

    fn apply(&self, cubes: &mut CubeLifecycle, animation: &Animation) -> AutoMergeOutcome {
        let merged = cubes
            .cube(animation.first)
            .and_then(|survivor| survivor.value().checked_mul(2));
        let Some(resulting_value) = merged else {
            log::warn!("Auto-merge interrupted: no value to merge into");
            Self::release_participants(cubes, animation);
            return AutoMergeOutcome::Interrupted;
        };
        let Some(survivor) = cubes.cube_mut(animation.first) else {
            return AutoMergeOutcome::Interrupted;
        };
        survivor.merge_with(resulting_value);
        survivor.apply_post_merge_physics(animation.meeting);
        cubes.remove_cube(animation.second);

        let record = MergeRecord {
            survivor: animation.first,
            retired: animation.second,
            resulting_value,
            merge_position: animation.meeting,
            score_gained: resulting_value / 2,
        };
        log::info!(
            "Auto-merge complete: {} now {}",
            record.survivor, record.resulting_value
        );
        self.bus.publish(record.to_event());
        AutoMergeOutcome::Merged(record)
    }
}

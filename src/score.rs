//! Score model
//!
//! Running total fed by merge events, plus the best total seen this process
//! (not persisted).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::bus::{EventBus, EventKind, GameEvent, Handler, HandlerError, handler};

/// Point-in-time view, used by the harness summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScoreSnapshot {
    pub score: u64,
    pub best: u64,
}

pub struct ScoreModel {
    bus: Rc<EventBus>,
    score: u64,
    best: u64,
    /// Merge subscription, present until disposed
    subscription: Option<Handler>,
}

impl ScoreModel {
    /// Detached model; nothing feeds it until `attach` is used instead
    pub fn new(bus: Rc<EventBus>) -> Self {
        Self {
            bus,
            score: 0,
            best: 0,
            subscription: None,
        }
    }

    /// Build a model subscribed to `CubeMerged` on `bus`
    pub fn attach(bus: Rc<EventBus>) -> Rc<RefCell<ScoreModel>> {
        let model = Rc::new(RefCell::new(Self::new(Rc::clone(&bus))));
        let weak: Weak<RefCell<ScoreModel>> = Rc::downgrade(&model);

        let on_merge = handler(move |event| {
            let GameEvent::CubeMerged { score_gained, .. } = event else {
                return Err(HandlerError::Unexpected(event.kind()));
            };
            let model = weak.upgrade().ok_or(HandlerError::Gone("score model"))?;
            let mut model = model
                .try_borrow_mut()
                .map_err(|_| HandlerError::Busy("score model"))?;
            model.add_score(i64::from(*score_gained));
            Ok(())
        });

        bus.subscribe(EventKind::CubeMerged, Rc::clone(&on_merge));
        model.borrow_mut().subscription = Some(on_merge);
        model
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn best(&self) -> u64 {
        self.best
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        ScoreSnapshot {
            score: self.score,
            best: self.best,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Add points and announce the new total. Negative input is ignored.
    pub fn add_score(&mut self, points: i64) {
        if points < 0 {
            log::warn!("Ignoring negative score delta {}", points);
            return;
        }
        self.score = self.score.saturating_add(points.unsigned_abs());
        if self.score > self.best {
            self.best = self.score;
        }
        self.bus.publish(GameEvent::ScoreChanged { score: self.score });
    }

    /// Back to zero; the best total is kept
    pub fn reset_score(&mut self) {
        self.score = 0;
        self.bus.publish(GameEvent::ScoreChanged { score: 0 });
    }

    /// Stop listening for merges. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(EventKind::CubeMerged, &subscription);
        }
    }
}

impl Drop for ScoreModel {
    fn drop(&mut self) {
        self.dispose();
    }
}

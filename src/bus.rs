//! Typed publish/subscribe event bus
//!
//! Single-threaded relay between the gameplay components. Events form a
//! closed enum and handlers are keyed by the event's kind. A publish made
//! while a dispatch is already running is queued and delivered once that
//! dispatch completes, so handlers are never entered reentrantly.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use glam::Vec3;

use crate::sim::{CollisionRequest, CubeId};

/// Everything that travels over the bus
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    // === Inbound (raised by input/physics/UI collaborators) ===
    /// A cube was launched down the lane
    CubeLaunched { force: f32 },
    /// Gameplay scene finished loading; cubes spawn at the anchor
    GameplaySceneLoaded { spawn_anchor: Vec3 },
    /// Raw contact reported by the physics collaborator
    CollisionRequested(CollisionRequest),
    /// Ask the lifecycle manager to clear the field
    ResetRequested,
    /// Ask the session for a full restart (field, score, first cube)
    RestartRequested,
    /// Pointer pressed; `x` is already projected to lane coordinates
    TouchStarted { x: f32 },
    TouchMoved { x: f32 },
    TouchEnded { x: f32 },

    // === Outbound (raised by the core) ===
    ActiveCubeChanged { cube_id: CubeId },
    CubeSpawned { cube_id: CubeId },
    CubeMerged {
        resulting_value: u32,
        merge_position: Vec3,
        score_gained: u32,
    },
    /// Acknowledges that the field was cleared
    GameplayReset,
    ScoreChanged { score: u64 },
    GameOver { cube_id: CubeId },
}

/// Dispatch key: the field-less discriminant of [`GameEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CubeLaunched,
    GameplaySceneLoaded,
    CollisionRequested,
    ResetRequested,
    RestartRequested,
    TouchStarted,
    TouchMoved,
    TouchEnded,
    ActiveCubeChanged,
    CubeSpawned,
    CubeMerged,
    GameplayReset,
    ScoreChanged,
    GameOver,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::CubeLaunched { .. } => EventKind::CubeLaunched,
            GameEvent::GameplaySceneLoaded { .. } => EventKind::GameplaySceneLoaded,
            GameEvent::CollisionRequested(_) => EventKind::CollisionRequested,
            GameEvent::ResetRequested => EventKind::ResetRequested,
            GameEvent::RestartRequested => EventKind::RestartRequested,
            GameEvent::TouchStarted { .. } => EventKind::TouchStarted,
            GameEvent::TouchMoved { .. } => EventKind::TouchMoved,
            GameEvent::TouchEnded { .. } => EventKind::TouchEnded,
            GameEvent::ActiveCubeChanged { .. } => EventKind::ActiveCubeChanged,
            GameEvent::CubeSpawned { .. } => EventKind::CubeSpawned,
            GameEvent::CubeMerged { .. } => EventKind::CubeMerged,
            GameEvent::GameplayReset => EventKind::GameplayReset,
            GameEvent::ScoreChanged { .. } => EventKind::ScoreChanged,
            GameEvent::GameOver { .. } => EventKind::GameOver,
        }
    }
}

/// Failure reported by a handler. The bus logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0} is already borrowed")]
    Busy(&'static str),
    #[error("{0} has been dropped")]
    Gone(&'static str),
    #[error("handler received unexpected event {0:?}")]
    Unexpected(EventKind),
}

/// Subscriber callback. Identity is the `Rc` allocation.
pub type Handler = Rc<dyn Fn(&GameEvent) -> Result<(), HandlerError>>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&GameEvent) -> Result<(), HandlerError> + 'static,
{
    Rc::new(f)
}

/// Publish/subscribe relay (share it as `Rc<EventBus>`)
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<HashMap<EventKind, Vec<Handler>>>,
    pending: RefCell<VecDeque<GameEvent>>,
    /// Nesting depth of dispatches and deferred sections
    depth: Cell<u32>,
}

/// Restores the depth counter even if a handler panics
struct DepthGuard<'a>(&'a Cell<u32>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Returns false (and logs) if that exact
    /// handler is already registered for the kind.
    pub fn subscribe(&self, kind: EventKind, handler: Handler) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let list = subscribers.entry(kind).or_default();
        if list.iter().any(|h| Rc::ptr_eq(h, &handler)) {
            log::warn!("Handler already subscribed to {:?}", kind);
            return false;
        }
        list.push(handler);
        true
    }

    /// Remove one registration. Returns false if it was not registered.
    pub fn unsubscribe(&self, kind: EventKind, handler: &Handler) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let Some(list) = subscribers.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|h| Rc::ptr_eq(h, handler)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .borrow()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Remove all registrations and anything still queued (hard reset only)
    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
        self.pending.borrow_mut().clear();
    }

    /// Deliver `event` to every handler of its kind, in subscription order.
    ///
    /// If a dispatch (or a [`deferred`](Self::deferred) section) is in
    /// progress the event is queued and delivered after it finishes.
    pub fn publish(&self, event: GameEvent) {
        self.pending.borrow_mut().push_back(event);
        if self.depth.get() == 0 {
            self.drain();
        }
    }

    /// Run `f` with delivery held back; everything published inside is
    /// delivered, in order, once `f` returns and no outer dispatch remains.
    ///
    /// If `f` panics, the events it queued are dropped and the panic resumes.
    pub fn deferred<R>(&self, f: impl FnOnce() -> R) -> R {
        let queued_before = self.pending.borrow().len();
        let result = {
            let _guard = DepthGuard::enter(&self.depth);
            panic::catch_unwind(AssertUnwindSafe(f))
        };
        match result {
            Ok(value) => {
                if self.depth.get() == 0 {
                    self.drain();
                }
                value
            }
            Err(payload) => {
                self.pending.borrow_mut().truncate(queued_before);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Number of events waiting for delivery
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    fn drain(&self) {
        let _guard = DepthGuard::enter(&self.depth);
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.dispatch(&event);
        }
    }

    fn dispatch(&self, event: &GameEvent) {
        let kind = event.kind();
        // Snapshot so handlers may (un)subscribe while we iterate
        let snapshot: Vec<Handler> = self
            .subscribers
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for handler in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::error!("Error in {:?} handler: {}", kind, err),
                Err(payload) => {
                    log::error!("Panic in {:?} handler: {}", kind, panic_message(&*payload))
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Collect every event of the given kinds (test helper)
#[cfg(test)]
pub(crate) fn record(bus: &EventBus, kinds: &[EventKind]) -> Rc<RefCell<Vec<GameEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for &kind in kinds {
        let sink = Rc::clone(&log);
        bus.subscribe(
            kind,
            handler(move |event| {
                sink.borrow_mut().push(event.clone());
                Ok(())
            }),
        );
    }
    log
}

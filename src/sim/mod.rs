//! Deterministic simulation module
//!
//! Cube entities, their pool and lifecycle, and the two merge paths
//! (physical collisions and the animated auto-merge). Everything here is
//! advanced by explicit `tick(dt)` calls:
//! - Seeded RNG only
//! - Stable iteration order (by cube id)
//! - No rendering or platform dependencies

pub mod auto_merge;
pub mod body;
pub mod collision;
pub mod cube;
pub mod lifecycle;
pub mod pool;

pub use auto_merge::{
    AutoMergeOrchestrator, AutoMergeOutcome, AutoMergePhase, AutoMergeRejected, AutoMergeState,
    CancelToken,
};
pub use body::Body;
pub use collision::{CollisionPair, CollisionRequest, CollisionResolver, CollisionVerdict, MergeRecord};
pub use cube::{Cube, CubeId};
pub use lifecycle::{CubeLifecycle, LifecycleState};
pub use pool::{ObjectPool, Poolable, SlotIndex};

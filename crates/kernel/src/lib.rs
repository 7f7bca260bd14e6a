//! World kernel: entity/component registry, event bus and frame pipelines.
//!
//! # Invariants
//! - An entity holds at most one component per [`lumen_ecs::ComponentKind`].
//! - The per-kind and per-entity tables always agree.
//! - Update systems run in registration order, then render systems do; the
//!   caller is responsible for calling [`World::update`] before [`World::render`].
//! - Execution is single-threaded and synchronous, events included.

pub mod event;
pub mod system;
pub mod systems;
pub mod world;

pub use event::{EventKind, WorldEvent};
pub use system::{BoxError, Frame, FrameClock, Stage, System, SystemId};
pub use systems::{CameraSystem, TransformSystem};
pub use world::{World, WorldError};

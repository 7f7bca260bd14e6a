//! Shared types for the lumen scene runtime.

mod types;

pub use types::{CanvasSize, EntityId};

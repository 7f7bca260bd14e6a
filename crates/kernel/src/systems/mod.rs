//! Update-stage systems that resolve recompute-dirty flags into matrices.

mod camera;
mod transform;

pub use camera::{CameraSystem, resolve_cameras};
pub use transform::{TransformSystem, resolve_transforms};

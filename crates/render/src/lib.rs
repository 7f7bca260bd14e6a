//! Render cache: GPU resource lifecycle and minimal uniform uploads.
//!
//! The render layer reads world state and writes it to a [`GpuDevice`]. It
//! compiles one program per renderable entity, uploads geometry once, and on
//! later frames rewrites only the uniforms whose inputs changed.
//!
//! # Invariants
//! - A cache entry exists only for entities the world still holds.
//! - Every GPU handle is owned by exactly one cache entry and released with it.
//! - Upload flags are cleared here and nowhere else.

pub mod cache;
pub mod device;
pub mod headless;
pub mod lights;
pub mod shaders;
mod system;

pub use cache::{CachedRenderable, RenderCache};
pub use device::{DeviceCapabilities, GpuDevice, GpuError};
pub use headless::{GpuCall, HeadlessDevice, Journal};
pub use lights::DirectionalLightCache;
pub use system::{FrameStats, RenderError, RenderSettings, RenderSystem};

pub fn crate_info() -> &'static str {
    "lumen-render v0.1.0"
}

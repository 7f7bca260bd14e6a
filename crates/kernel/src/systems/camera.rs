use crate::event::{EventKind, WorldEvent};
use crate::system::{BoxError, Frame, Stage, System, SystemId};
use crate::world::World;
use lumen_ecs::{Camera, ComponentData, OrthographicCamera, PerspectiveCamera};

fn resolve<C: Camera + ComponentData>(world: &mut World) -> usize {
    let mut recomputed = 0;
    world.for_each_mut::<C>(|_, camera| {
        if camera.view_state().needs_recompute() {
            camera.commit_view(camera.compose_view());
            recomputed += 1;
        }
        if camera.projection_state().needs_recompute() {
            camera.commit_projection(camera.compose_projection());
            recomputed += 1;
        }
    });
    recomputed
}

/// Recompute stale view and projection matrices of every camera.
///
/// Returns the number of matrices rebuilt.
pub fn resolve_cameras(world: &mut World) -> usize {
    resolve::<PerspectiveCamera>(world) + resolve::<OrthographicCamera>(world)
}

/// Update-stage system for cameras. Tracks canvas resizes to keep the aspect
/// ratio of perspective cameras in sync with the surface.
#[derive(Debug, Default)]
pub struct CameraSystem;

impl CameraSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for CameraSystem {
    fn name(&self) -> &'static str {
        "camera"
    }

    fn stage(&self) -> Stage {
        Stage::Update
    }

    fn init(&mut self, world: &mut World, id: SystemId) {
        world.subscribe(id, &[EventKind::ResizeCanvas]);
    }

    fn run(&mut self, world: &mut World, _frame: Frame) -> Result<(), BoxError> {
        let recomputed = resolve_cameras(world);
        tracing::trace!(recomputed, "cameras resolved");
        Ok(())
    }

    fn on_event(&mut self, world: &mut World, event: &WorldEvent) {
        if let WorldEvent::ResizeCanvas { width, height } = *event {
            if height == 0 {
                tracing::warn!(width, height, "ignoring resize to zero height");
                return;
            }
            let aspect = width as f32 / height as f32;
            world.for_each_mut::<PerspectiveCamera>(|_, camera| {
                camera.set_aspect(aspect);
            });
            tracing::debug!(width, height, aspect, "camera aspect updated");
        }
    }
}

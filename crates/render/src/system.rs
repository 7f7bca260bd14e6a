use crate::cache::{CameraInputs, ObjectInputs, RenderCache};
use crate::device::{GpuDevice, GpuError};
use crate::lights::DirectionalLightCache;
use glam::Mat4;
use lumen_common::{CanvasSize, EntityId};
use lumen_ecs::{
    Camera, ComponentKind, DirectionalLight, Geometry, Material, OrthographicCamera,
    PerspectiveCamera, Renderable, Transform,
};
use lumen_kernel::{BoxError, EventKind, Frame, Stage, System, SystemId, World, WorldEvent};

/// Render configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    /// Viewport applied before the first frame.
    pub canvas: CanvasSize,
    /// Slots in the directional light arrays of every program.
    pub max_directional_lights: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            canvas: CanvasSize::default(),
            max_directional_lights: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("device lacks {0}")]
    MissingCapability(&'static str),
    #[error("could not prepare renderable {entity}: {source}")]
    Gpu { entity: EntityId, source: GpuError },
}

/// Counters for one drawn frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub drawn: usize,
    /// Entries created this frame.
    pub created: usize,
    /// Renderables with `visible == false`.
    pub hidden: usize,
    /// Renderables missing geometry or material.
    pub skipped: usize,
    pub uniform_writes: usize,
}

/// Draws every visible renderable through a [`RenderCache`].
///
/// Runs in the render stage. It is the only consumer of camera and light
/// upload flags and clears them once per frame after drawing. Entries not
/// drawn in such a frame catch up through the frame generation.
#[derive(Debug)]
pub struct RenderSystem<D> {
    device: D,
    settings: RenderSettings,
    cache: RenderCache,
    lights: DirectionalLightCache,
    canvas: CanvasSize,
    viewport_dirty: bool,
    /// Frames that cleared camera and light flags.
    generation: u64,
    last_frame: FrameStats,
}

impl<D: GpuDevice> RenderSystem<D> {
    /// Fails if the device cannot run the cache's programs.
    pub fn new(device: D, settings: RenderSettings) -> Result<Self, RenderError> {
        let caps = device.capabilities();
        if !caps.vertex_array_objects {
            return Err(RenderError::MissingCapability("vertex array objects"));
        }
        if caps.max_texture_units == 0 {
            return Err(RenderError::MissingCapability("texture units"));
        }
        Ok(Self {
            device,
            cache: RenderCache::new(settings.max_directional_lights),
            lights: DirectionalLightCache::new(settings.max_directional_lights),
            canvas: settings.canvas,
            viewport_dirty: true,
            generation: 0,
            last_frame: FrameStats::default(),
            settings,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Draw one frame from the world's current state.
    ///
    /// Without a camera nothing is drawn and no flag is cleared.
    pub fn draw_frame(&mut self, world: &mut World) -> Result<FrameStats, RenderError> {
        let mut stats = FrameStats::default();
        if self.viewport_dirty {
            self.device
                .set_viewport(self.canvas.width, self.canvas.height);
            self.viewport_dirty = false;
        }
        self.device.clear(self.settings.clear_color);

        let Some((camera_entity, camera)) = active_camera(world) else {
            tracing::warn!("no camera in world, skipping frame");
            self.last_frame = stats;
            return Ok(stats);
        };
        self.generation += 1;
        self.lights.refresh(world.query::<DirectionalLight>());

        let renderables = world.entities_with(ComponentKind::Renderable).to_vec();
        for entity in renderables {
            if !world.get::<Renderable>(entity).is_some_and(|r| r.visible) {
                stats.hidden += 1;
                continue;
            }
            let (Some(geometry), Some(material)) =
                (world.get::<Geometry>(entity), world.get::<Material>(entity))
            else {
                tracing::warn!(%entity, "renderable without geometry or material, skipped");
                stats.skipped += 1;
                continue;
            };
            let transform = world.get::<Transform>(entity);
            let object = ObjectInputs {
                model: transform.map_or(Mat4::IDENTITY, Transform::model_matrix),
                model_dirty: transform.is_some_and(|t| t.state().needs_upload()),
                material,
            };

            if !self.cache.contains(entity) {
                stats.created += 1;
            }
            let entry = self
                .cache
                .get_or_create(entity, geometry, material, &mut self.device)
                .map_err(|source| RenderError::Gpu { entity, source })?;
            let outcome = entry.render(
                &mut self.device,
                self.generation,
                &camera,
                &object,
                &self.lights,
            );
            stats.drawn += 1;
            stats.uniform_writes += outcome.uniform_writes;

            if outcome.model_consumed {
                if let Some(transform) = world.get_mut::<Transform>(entity) {
                    transform.mark_uploaded();
                }
            }
            if outcome.material_consumed {
                if let Some(material) = world.get_mut::<Material>(entity) {
                    material.mark_uploaded();
                }
            }
        }

        mark_camera_uploaded(world, camera_entity);
        world.for_each_mut::<DirectionalLight>(|_, light| light.mark_uploaded());

        tracing::trace!(
            drawn = stats.drawn,
            created = stats.created,
            uniform_writes = stats.uniform_writes,
            "frame drawn"
        );
        self.last_frame = stats;
        Ok(stats)
    }
}

/// First camera in registration order, of either kind.
fn active_camera(world: &World) -> Option<(EntityId, CameraInputs)> {
    world.entities().iter().find_map(|&entity| {
        let camera: &dyn Camera = match world.get::<PerspectiveCamera>(entity) {
            Some(camera) => camera,
            None => world.get::<OrthographicCamera>(entity)?,
        };
        Some((entity, CameraInputs::from_camera(camera)))
    })
}

fn mark_camera_uploaded(world: &mut World, entity: EntityId) {
    if let Some(camera) = world.get_mut::<PerspectiveCamera>(entity) {
        camera.mark_uploaded();
    } else if let Some(camera) = world.get_mut::<OrthographicCamera>(entity) {
        camera.mark_uploaded();
    }
}

impl<D: GpuDevice + 'static> System for RenderSystem<D> {
    fn name(&self) -> &'static str {
        "render"
    }

    fn stage(&self) -> Stage {
        Stage::Render
    }

    fn init(&mut self, world: &mut World, id: SystemId) {
        world.subscribe(id, &[EventKind::RemoveEntity, EventKind::ResizeCanvas]);
    }

    fn run(&mut self, world: &mut World, frame: Frame) -> Result<(), BoxError> {
        let stats = self.draw_frame(world)?;
        tracing::trace!(delta = frame.delta, ?stats, "render system ran");
        Ok(())
    }

    fn on_event(&mut self, _world: &mut World, event: &WorldEvent) {
        match *event {
            WorldEvent::RemoveEntity { entity } => {
                self.cache.evict(entity, &mut self.device);
            }
            WorldEvent::ResizeCanvas { width, height } => {
                self.canvas = CanvasSize::new(width, height);
                self.viewport_dirty = true;
            }
            _ => {}
        }
    }

    fn cleanup(&mut self, _world: &mut World) {
        self.cache.clear(&mut self.device);
    }
}

//! Per-entity GPU state and minimal uniform uploads.
//!
//! A [`CachedRenderable`] is created the first time an entity is drawn and
//! owns every GPU handle made for it. On each later frame it writes only the
//! uniforms whose upstream upload flag is set; the first frame writes all of
//! them.

use crate::device::{
    BufferHandle, BufferTarget, GpuDevice, GpuError, ProgramHandle, ShaderHandle, ShaderStage,
    TextureHandle, UniformLocation, UniformValue, VertexArrayHandle,
};
use crate::lights::DirectionalLightCache;
use crate::shaders;
use glam::{Mat3, Mat4};
use lumen_common::EntityId;
use lumen_ecs::{Camera, Geometry, LightDirty, Material};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Texture unit used for the material map.
const MAP_UNIT: u32 = 0;

/// What a uniform is fed from, keyed by its declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    Model,
    View,
    Projection,
    ModelView,
    ModelViewProjection,
    Normal,
    LightDirections,
    LightColors,
    LightIntensities,
    LightCount,
    MaterialColor,
    Map,
}

impl UniformSlot {
    pub fn from_name(name: &str) -> Option<Self> {
        let slot = match name {
            shaders::MODEL_MATRIX => Self::Model,
            shaders::VIEW_MATRIX => Self::View,
            shaders::PROJECTION_MATRIX => Self::Projection,
            shaders::MODEL_VIEW_MATRIX => Self::ModelView,
            shaders::MODEL_VIEW_PROJECTION_MATRIX => Self::ModelViewProjection,
            shaders::NORMAL_MATRIX => Self::Normal,
            shaders::LIGHT_DIRECTIONS => Self::LightDirections,
            shaders::LIGHT_COLORS => Self::LightColors,
            shaders::LIGHT_INTENSITIES => Self::LightIntensities,
            shaders::LIGHT_COUNT => Self::LightCount,
            shaders::MATERIAL_COLOR => Self::MaterialColor,
            shaders::MAP => Self::Map,
            _ => return None,
        };
        Some(slot)
    }
}

/// A uniform resolved once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub slot: UniformSlot,
    pub location: UniformLocation,
}

/// Camera matrices and their upload flags for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraInputs {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_dirty: bool,
    pub projection_dirty: bool,
}

impl CameraInputs {
    pub fn from_camera(camera: &dyn Camera) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            view_dirty: camera.view_state().needs_upload(),
            projection_dirty: camera.projection_state().needs_upload(),
        }
    }
}

/// Per-entity inputs for one draw.
#[derive(Debug, Clone, Copy)]
pub struct ObjectInputs<'a> {
    pub model: Mat4,
    pub model_dirty: bool,
    pub material: &'a Material,
}

/// Result of one [`CachedRenderable::render`] call.
///
/// The `*_consumed` flags name the per-entity upload flags the caller should
/// now clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub uniform_writes: usize,
    pub model_consumed: bool,
    pub material_consumed: bool,
}

/// Lifecycle of a cache entry. Disposal consumes the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Created, never drawn. The next render writes every uniform.
    Created,
    Steady,
}

/// GPU handles created for one entry, released together.
#[derive(Debug, Default)]
struct OwnedHandles {
    shaders: Vec<ShaderHandle>,
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    buffers: Vec<BufferHandle>,
    texture: Option<TextureHandle>,
}

impl OwnedHandles {
    fn release<D: GpuDevice + ?Sized>(self, device: &mut D) {
        if let Some(vertex_array) = self.vertex_array {
            device.delete_vertex_array(vertex_array);
        }
        for buffer in self.buffers {
            device.delete_buffer(buffer);
        }
        if let Some(texture) = self.texture {
            device.delete_texture(texture);
        }
        if let Some(program) = self.program {
            device.delete_program(program);
        }
        for shader in self.shaders {
            device.delete_shader(shader);
        }
    }
}

/// GPU state of one renderable entity.
#[derive(Debug)]
pub struct CachedRenderable {
    handles: OwnedHandles,
    program: ProgramHandle,
    vertex_array: VertexArrayHandle,
    texture: Option<TextureHandle>,
    index_count: Option<u32>,
    vertex_count: u32,
    bindings: Vec<UniformBinding>,
    force_update: bool,
    /// Frame generation of the last draw.
    synced: u64,
    state: EntryState,
}

impl CachedRenderable {
    /// Compile, link and upload everything `geometry` and `material` need.
    ///
    /// On failure every handle created so far is released before the error
    /// is returned.
    pub fn create<D: GpuDevice + ?Sized>(
        device: &mut D,
        geometry: &Geometry,
        material: &Material,
        max_lights: usize,
    ) -> Result<Self, GpuError> {
        let mut handles = OwnedHandles::default();
        match Self::build(device, geometry, material, max_lights, &mut handles) {
            Ok((program, vertex_array, bindings)) => Ok(Self {
                program,
                vertex_array,
                texture: handles.texture,
                index_count: geometry.index_count(),
                vertex_count: geometry.vertex_count(),
                bindings,
                force_update: true,
                synced: 0,
                state: EntryState::Created,
                handles,
            }),
            Err(err) => {
                handles.release(device);
                Err(err)
            }
        }
    }

    fn build<D: GpuDevice + ?Sized>(
        device: &mut D,
        geometry: &Geometry,
        material: &Material,
        max_lights: usize,
        handles: &mut OwnedHandles,
    ) -> Result<(ProgramHandle, VertexArrayHandle, Vec<UniformBinding>), GpuError> {
        let source = shaders::program_source(material, geometry.attributes(), max_lights);

        let vertex = device
            .create_shader(ShaderStage::Vertex, &source.vertex)
            .inspect_err(|e| tracing::error!(error = %e, "vertex shader rejected"))?;
        handles.shaders.push(vertex);
        let fragment = device
            .create_shader(ShaderStage::Fragment, &source.fragment)
            .inspect_err(|e| tracing::error!(error = %e, "fragment shader rejected"))?;
        handles.shaders.push(fragment);
        let program = device
            .link_program(vertex, fragment)
            .inspect_err(|e| tracing::error!(error = %e, "program link failed"))?;
        handles.program = Some(program);

        let vertex_array = device.create_vertex_array()?;
        handles.vertex_array = Some(vertex_array);
        let attributes = [
            (shaders::POSITION, Some(&geometry.positions), 3),
            (shaders::UV, geometry.uvs.as_ref(), 2),
            (shaders::NORMAL, geometry.normals.as_ref(), 3),
        ];
        for (name, data, components) in attributes {
            let Some(data) = data.filter(|d| !d.is_empty()) else {
                continue;
            };
            let Some(location) = device.attribute_location(program, name) else {
                tracing::trace!(name, "attribute unused by program, not uploaded");
                continue;
            };
            let bytes: &[u8] = bytemuck::cast_slice(data.as_slice());
            let buffer = device.create_buffer(BufferTarget::Vertex, bytes)?;
            handles.buffers.push(buffer);
            device.vertex_attribute(vertex_array, buffer, location, components);
        }
        if let Some(indices) = geometry.indices.as_ref() {
            let bytes: &[u8] = bytemuck::cast_slice(indices.as_slice());
            let buffer = device.create_buffer(BufferTarget::Index, bytes)?;
            handles.buffers.push(buffer);
            device.bind_index_buffer(vertex_array, buffer);
        }

        if source.textured {
            if let Some(image) = material.texture() {
                handles.texture = Some(device.create_texture(image)?);
            }
        }

        let bindings = device
            .active_uniforms(program)
            .into_iter()
            .filter_map(|uniform| match UniformSlot::from_name(&uniform.name) {
                Some(slot) => Some(UniformBinding {
                    slot,
                    location: uniform.location,
                }),
                None => {
                    tracing::debug!(name = %uniform.name, "uniform has no known source");
                    None
                }
            })
            .collect();
        Ok((program, vertex_array, bindings))
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn bindings(&self) -> &[UniformBinding] {
        &self.bindings
    }

    /// Bind, write stale uniforms and draw.
    ///
    /// `generation` counts frames whose camera and light flags were cleared.
    /// An entry that skipped one of them rewrites every camera and light
    /// uniform, since the flags it missed are gone.
    pub fn render<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        generation: u64,
        camera: &CameraInputs,
        object: &ObjectInputs<'_>,
        lights: &DirectionalLightCache,
    ) -> RenderOutcome {
        device.use_program(self.program);
        device.bind_vertex_array(self.vertex_array);
        if let Some(texture) = self.texture {
            device.bind_texture(MAP_UNIT, texture);
        }

        let force = self.force_update;
        let missed = self.synced + 1 < generation;
        let shared = force || missed;
        let material = object.material;
        let mut model_view: Option<Mat4> = None;
        let mut writes = 0;

        for binding in &self.bindings {
            let location = binding.location;
            let stale = match binding.slot {
                UniformSlot::Model => force || object.model_dirty,
                UniformSlot::View => shared || camera.view_dirty,
                UniformSlot::Projection => shared || camera.projection_dirty,
                UniformSlot::ModelView | UniformSlot::Normal => {
                    shared || object.model_dirty || camera.view_dirty
                }
                UniformSlot::ModelViewProjection => {
                    shared || object.model_dirty || camera.view_dirty || camera.projection_dirty
                }
                UniformSlot::LightDirections => {
                    shared || lights.needs_upload(LightDirty::DIRECTION)
                }
                UniformSlot::LightColors => shared || lights.needs_upload(LightDirty::COLOR),
                UniformSlot::LightIntensities => {
                    shared || lights.needs_upload(LightDirty::INTENSITY)
                }
                UniformSlot::LightCount => shared || lights.count_changed(),
                UniformSlot::MaterialColor => force || material.is_dirty(),
                UniformSlot::Map => force,
            };
            if !stale {
                continue;
            }

            let value = match binding.slot {
                UniformSlot::Model => UniformValue::Mat4(object.model.to_cols_array()),
                UniformSlot::View => UniformValue::Mat4(camera.view.to_cols_array()),
                UniformSlot::Projection => UniformValue::Mat4(camera.projection.to_cols_array()),
                UniformSlot::ModelView => {
                    let mv = *model_view.get_or_insert_with(|| camera.view * object.model);
                    UniformValue::Mat4(mv.to_cols_array())
                }
                UniformSlot::ModelViewProjection => {
                    let mv = *model_view.get_or_insert_with(|| camera.view * object.model);
                    UniformValue::Mat4((camera.projection * mv).to_cols_array())
                }
                UniformSlot::Normal => {
                    let mv = *model_view.get_or_insert_with(|| camera.view * object.model);
                    UniformValue::Mat3(normal_matrix(mv).to_cols_array())
                }
                UniformSlot::LightDirections | UniformSlot::LightColors
                | UniformSlot::LightIntensities
                    if lights.count() == 0 =>
                {
                    continue;
                }
                UniformSlot::LightDirections => UniformValue::Vec3Array(lights.directions()),
                UniformSlot::LightColors => UniformValue::Vec3Array(lights.colors()),
                UniformSlot::LightIntensities => UniformValue::FloatArray(lights.intensities()),
                UniformSlot::LightCount => UniformValue::Int(lights.count() as i32),
                UniformSlot::MaterialColor => UniformValue::Vec3(material.color().to_array()),
                UniformSlot::Map => UniformValue::Sampler(MAP_UNIT as i32),
            };
            device.write_uniform(location, value);
            writes += 1;
        }

        match self.index_count {
            Some(count) => device.draw_elements(count),
            None => device.draw_arrays(self.vertex_count),
        }

        self.force_update = false;
        self.synced = generation;
        self.state = EntryState::Steady;
        RenderOutcome {
            uniform_writes: writes,
            model_consumed: force || object.model_dirty,
            material_consumed: force || material.is_dirty(),
        }
    }

    /// Delete every GPU handle this entry owns.
    pub fn dispose<D: GpuDevice + ?Sized>(self, device: &mut D) {
        self.handles.release(device);
    }
}

/// Inverse-transpose of the upper 3x3 of `model_view`; identity when singular.
fn normal_matrix(model_view: Mat4) -> Mat3 {
    let m = Mat3::from_mat4(model_view);
    if m.determinant().abs() <= f32::EPSILON {
        return Mat3::IDENTITY;
    }
    m.inverse().transpose()
}

/// Entity-keyed map of cache entries.
#[derive(Debug, Default)]
pub struct RenderCache {
    entries: BTreeMap<EntityId, CachedRenderable>,
    max_lights: usize,
}

impl RenderCache {
    pub fn new(max_lights: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_lights,
        }
    }

    /// Existing entry for `entity`, or a new one. A hit makes no GPU calls.
    pub fn get_or_create<D: GpuDevice + ?Sized>(
        &mut self,
        entity: EntityId,
        geometry: &Geometry,
        material: &Material,
        device: &mut D,
    ) -> Result<&mut CachedRenderable, GpuError> {
        match self.entries.entry(entity) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let entry = CachedRenderable::create(device, geometry, material, self.max_lights)?;
                tracing::debug!(
                    %entity,
                    uniforms = entry.bindings.len(),
                    "created render cache entry"
                );
                Ok(slot.insert(entry))
            }
        }
    }

    /// Dispose the entry for `entity`. Returns whether one existed.
    pub fn evict<D: GpuDevice + ?Sized>(&mut self, entity: EntityId, device: &mut D) -> bool {
        match self.entries.remove(&entity) {
            Some(entry) => {
                entry.dispose(device);
                tracing::debug!(%entity, "evicted render cache entry");
                true
            }
            None => false,
        }
    }

    /// Dispose every entry.
    pub fn clear<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        let count = self.entries.len();
        for (_, entry) in std::mem::take(&mut self.entries) {
            entry.dispose(device);
        }
        tracing::debug!(count, "render cache cleared");
    }

    pub fn get(&self, entity: EntityId) -> Option<&CachedRenderable> {
        self.entries.get(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuCall, HeadlessDevice};
    use glam::Vec3;
    use lumen_ecs::{DirectionalLight, Shading, TextureImage};

    fn camera(dirty: bool) -> CameraInputs {
        CameraInputs {
            view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y),
            projection: Mat4::perspective_rh_gl(45f32.to_radians(), 1.0, 0.1, 1000.0),
            view_dirty: dirty,
            projection_dirty: dirty,
        }
    }

    fn object(material: &Material, dirty: bool) -> ObjectInputs<'_> {
        ObjectInputs {
            model: Mat4::from_translation(Vec3::X),
            model_dirty: dirty,
            material,
        }
    }

    #[test]
    fn slot_names_round_trip_through_constants() {
        assert_eq!(UniformSlot::from_name("modelMatrix"), Some(UniformSlot::Model));
        assert_eq!(UniformSlot::from_name("map"), Some(UniformSlot::Map));
        assert_eq!(UniformSlot::from_name("time"), None);
    }

    #[test]
    fn create_uploads_geometry_once() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let mut cache = RenderCache::new(4);
        let id = EntityId::new();
        let geometry = Geometry::quad();
        let material = Material::default();

        cache.get_or_create(id, &geometry, &material, &mut device).unwrap();
        let buffers = journal.count(|c| matches!(c, GpuCall::CreateBuffer { .. }));
        // basic shading without texture: position + index
        assert_eq!(buffers, 2);

        journal.clear();
        cache.get_or_create(id, &geometry, &material, &mut device).unwrap();
        assert!(journal.calls().is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn first_render_forces_every_uniform() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let material = Material::default();
        let mut entry =
            CachedRenderable::create(&mut device, &Geometry::triangle(), &material, 4).unwrap();
        assert_eq!(entry.state(), EntryState::Created);

        let lights = DirectionalLightCache::new(4);
        let outcome =
            entry.render(&mut device, 1, &camera(false), &object(&material, false), &lights);
        assert_eq!(outcome.uniform_writes, entry.bindings().len());
        assert!(outcome.model_consumed);
        assert_eq!(entry.state(), EntryState::Steady);
        assert_eq!(
            journal.calls().last(),
            Some(&GpuCall::DrawArrays { vertex_count: 3 })
        );

        journal.clear();
        let outcome =
            entry.render(&mut device, 2, &camera(false), &object(&material, false), &lights);
        assert_eq!(outcome.uniform_writes, 0);
        assert_eq!(journal.uniform_writes(), 0);
        assert_eq!(journal.draw_calls(), 1);
    }

    #[test]
    fn model_change_rewrites_only_model() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let mut material = Material::default();
        material.mark_uploaded();
        let mut entry =
            CachedRenderable::create(&mut device, &Geometry::quad(), &material, 4).unwrap();
        let lights = DirectionalLightCache::new(4);
        entry.render(&mut device, 1, &camera(true), &object(&material, true), &lights);

        journal.clear();
        entry.render(&mut device, 2, &camera(false), &object(&material, true), &lights);
        assert_eq!(journal.uniform_writes(), 1);
        assert_eq!(journal.uniform_writes_named("modelMatrix"), 1);
        assert_eq!(
            journal.last_uniform("modelMatrix"),
            Some(Mat4::from_translation(Vec3::X).to_cols_array().to_vec())
        );
        assert_eq!(journal.count(|c| matches!(c, GpuCall::DrawElements { index_count: 6 })), 1);
    }

    #[test]
    fn composites_follow_their_inputs() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let mut material = Material::new(Shading::Normal, Vec3::ONE);
        material.mark_uploaded();
        let mut entry =
            CachedRenderable::create(&mut device, &Geometry::quad(), &material, 4).unwrap();
        let lights = DirectionalLightCache::new(4);
        entry.render(&mut device, 1, &camera(false), &object(&material, false), &lights);

        journal.clear();
        let mut cam = camera(false);
        cam.projection_dirty = true;
        entry.render(&mut device, 2, &cam, &object(&material, false), &lights);
        assert_eq!(journal.uniform_writes_named("projectionMatrix"), 1);
        assert_eq!(journal.uniform_writes_named("modelViewMatrix"), 0);
        assert_eq!(journal.uniform_writes_named("normalMatrix"), 0);

        journal.clear();
        cam.projection_dirty = false;
        cam.view_dirty = true;
        entry.render(&mut device, 3, &cam, &object(&material, false), &lights);
        assert_eq!(journal.uniform_writes_named("modelViewMatrix"), 1);
        assert_eq!(journal.uniform_writes_named("normalMatrix"), 1);
    }

    #[test]
    fn missed_generation_rewrites_camera_uniforms() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let mut material = Material::default();
        material.mark_uploaded();
        let mut entry =
            CachedRenderable::create(&mut device, &Geometry::quad(), &material, 4).unwrap();
        let lights = DirectionalLightCache::new(4);
        entry.render(&mut device, 1, &camera(false), &object(&material, false), &lights);

        // generation 2 ran without this entry and consumed the camera flags
        journal.clear();
        entry.render(&mut device, 3, &camera(false), &object(&material, false), &lights);
        assert_eq!(journal.uniform_writes_named("viewMatrix"), 1);
        assert_eq!(journal.uniform_writes_named("projectionMatrix"), 1);
        assert_eq!(journal.uniform_writes_named("modelMatrix"), 0);
        assert_eq!(journal.uniform_writes_named("materialColor"), 0);

        journal.clear();
        entry.render(&mut device, 4, &camera(false), &object(&material, false), &lights);
        assert_eq!(journal.uniform_writes(), 0);
    }

    #[test]
    fn lambert_uploads_light_arrays_on_change() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let mut material = Material::lambert(Vec3::ONE);
        material.mark_uploaded();
        let mut entry =
            CachedRenderable::create(&mut device, &Geometry::quad(), &material, 4).unwrap();
        let light_id = EntityId::new();
        let mut light = DirectionalLight::default();
        let mut lights = DirectionalLightCache::new(4);
        lights.refresh([(light_id, &light)]);
        entry.render(&mut device, 1, &camera(false), &object(&material, false), &lights);
        assert_eq!(journal.last_uniform("directionalLightCount"), Some(vec![1.0]));

        light.mark_uploaded();
        light.set_intensity(4.0);
        lights.refresh([(light_id, &light)]);
        journal.clear();
        entry.render(&mut device, 2, &camera(false), &object(&material, false), &lights);
        assert_eq!(journal.uniform_writes(), 1);
        assert_eq!(journal.last_uniform("directionalLightIntensities"), Some(vec![4.0]));
    }

    #[test]
    fn textured_entry_binds_map() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let material = Material::default().with_texture(TextureImage::solid([255, 0, 0, 255]));
        let mut entry =
            CachedRenderable::create(&mut device, &Geometry::quad(), &material, 4).unwrap();
        let lights = DirectionalLightCache::new(4);
        entry.render(&mut device, 1, &camera(false), &object(&material, false), &lights);
        assert_eq!(journal.last_uniform("map"), Some(vec![0.0]));
        assert_eq!(journal.count(|c| matches!(c, GpuCall::BindTexture { unit: 0, .. })), 1);
    }

    #[test]
    fn failed_compile_releases_partial_handles() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let material = Material::default();
        let mut cache = RenderCache::new(4);

        journal.set_fail_compiles(true);
        let err = cache
            .get_or_create(EntityId::new(), &Geometry::triangle(), &material, &mut device)
            .unwrap_err();
        assert!(matches!(err, GpuError::ShaderCompile { .. }));
        assert_eq!(journal.live_objects(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_and_clear_release_everything() {
        let mut device = HeadlessDevice::new();
        let journal = device.journal();
        let material = Material::default();
        let mut cache = RenderCache::new(4);
        let a = EntityId::new();
        let b = EntityId::new();
        cache.get_or_create(a, &Geometry::quad(), &material, &mut device).unwrap();
        cache.get_or_create(b, &Geometry::triangle(), &material, &mut device).unwrap();
        assert!(journal.live_objects() > 0);

        assert!(cache.evict(a, &mut device));
        assert!(!cache.evict(a, &mut device));
        assert!(!cache.contains(a));
        cache.clear(&mut device);
        assert!(cache.is_empty());
        assert_eq!(journal.live_objects(), 0);
    }

    #[test]
    fn singular_model_view_gives_identity_normal_matrix() {
        assert_eq!(normal_matrix(Mat4::ZERO), Mat3::IDENTITY);
        let scaled = Mat4::from_scale(Vec3::splat(2.0));
        assert!(normal_matrix(scaled).abs_diff_eq(Mat3::from_diagonal(Vec3::splat(0.5)), 1e-6));
    }
}

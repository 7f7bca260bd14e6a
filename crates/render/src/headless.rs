//! Recording backend with no GPU behind it.
//!
//! `HeadlessDevice` validates handles, parses `uniform`/`in` declarations out
//! of GLSL source for introspection and journals every call. Tests and the CLI
//! keep a [`Journal`] handle to inspect what the render cache asked for.

use crate::device::{
    ActiveUniform, BufferHandle, BufferTarget, DeviceCapabilities, GpuDevice, GpuError,
    ProgramHandle, ShaderHandle, ShaderStage, TextureHandle, UniformLocation, UniformType,
    UniformValue, VertexArrayHandle,
};
use lumen_ecs::TextureImage;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateShader { shader: ShaderHandle, stage: ShaderStage },
    DeleteShader(ShaderHandle),
    LinkProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    CreateBuffer {
        buffer: BufferHandle,
        target: BufferTarget,
        bytes: usize,
    },
    DeleteBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(VertexArrayHandle),
    VertexAttribute { location: u32, components: u32 },
    BindIndexBuffer(BufferHandle),
    DeleteVertexArray(VertexArrayHandle),
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
    },
    BindTexture { unit: u32, texture: TextureHandle },
    DeleteTexture(TextureHandle),
    WriteUniform {
        program: Option<ProgramHandle>,
        name: String,
        ty: UniformType,
        data: Vec<f32>,
    },
    Viewport { width: u32, height: u32 },
    Clear,
    DrawArrays { vertex_count: u32 },
    DrawElements { index_count: u32 },
}

#[derive(Debug, Default)]
struct JournalState {
    calls: Vec<GpuCall>,
    fail_compiles: bool,
    live: BTreeSet<Object>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Object {
    Shader(u32),
    Program(u32),
    Buffer(u32),
    VertexArray(u32),
    Texture(u32),
}

/// Shared view of a [`HeadlessDevice`]'s call log.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    state: Rc<RefCell<JournalState>>,
}

impl Journal {
    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn uniform_writes(&self) -> usize {
        self.count(|c| matches!(c, GpuCall::WriteUniform { .. }))
    }

    /// Writes to the uniform called `name`, across all programs.
    pub fn uniform_writes_named(&self, name: &str) -> usize {
        self.count(|c| matches!(c, GpuCall::WriteUniform { name: n, .. } if n == name))
    }

    /// Data of the most recent write to `name`.
    pub fn last_uniform(&self, name: &str) -> Option<Vec<f32>> {
        self.state
            .borrow()
            .calls
            .iter()
            .rev()
            .find_map(|c| match c {
                GpuCall::WriteUniform { name: n, data, .. } if n == name => Some(data.clone()),
                _ => None,
            })
    }

    pub fn draw_calls(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                GpuCall::DrawArrays { .. } | GpuCall::DrawElements { .. }
            )
        })
    }

    pub fn programs_linked(&self) -> usize {
        self.count(|c| matches!(c, GpuCall::LinkProgram(_)))
    }

    /// GPU objects created and not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Make every following shader compile fail.
    pub fn set_fail_compiles(&self, fail: bool) {
        self.state.borrow_mut().fail_compiles = fail;
    }

    fn record(&self, call: GpuCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn created(&self, object: Object) {
        self.state.borrow_mut().live.insert(object);
    }

    fn deleted(&self, object: Object) -> bool {
        self.state.borrow_mut().live.remove(&object)
    }
}

/// Declarations pulled out of one shader's source.
#[derive(Debug, Clone, Default)]
struct Declarations {
    uniforms: Vec<(String, UniformType, u32)>,
    inputs: Vec<String>,
}

impl Declarations {
    fn parse(stage: ShaderStage, source: &str) -> Self {
        let mut decls = Self::default();
        for line in source.lines() {
            let line = line.trim().trim_end_matches(';');
            let mut tokens = line
                .split_whitespace()
                .filter(|t| !matches!(*t, "highp" | "mediump" | "lowp"));
            match tokens.next() {
                Some("uniform") => {
                    let (Some(ty), Some(name)) = (tokens.next(), tokens.next()) else {
                        continue;
                    };
                    let Some(ty) = UniformType::from_glsl(ty) else {
                        tracing::debug!(ty, "headless device ignores uniform type");
                        continue;
                    };
                    let (name, len) = split_array(name);
                    decls.uniforms.push((name, ty, len));
                }
                Some("in") | Some("attribute") if stage == ShaderStage::Vertex => {
                    if let (Some(_ty), Some(name)) = (tokens.next(), tokens.next()) {
                        decls.inputs.push(name.to_string());
                    }
                }
                _ => {}
            }
        }
        decls
    }
}

fn split_array(name: &str) -> (String, u32) {
    match name.split_once('[') {
        Some((base, rest)) => {
            let len = rest.trim_end_matches(']').parse().unwrap_or(1);
            (base.to_string(), len)
        }
        None => (name.to_string(), 1),
    }
}

#[derive(Debug, Clone)]
struct LinkedProgram {
    uniforms: Vec<ActiveUniform>,
    attributes: Vec<String>,
}

/// GPU device that records instead of rendering.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    journal: Journal,
    capabilities: DeviceCapabilities,
    next_handle: u32,
    shaders: BTreeMap<ShaderHandle, (ShaderStage, Declarations)>,
    programs: BTreeMap<ProgramHandle, LinkedProgram>,
    current_program: Option<ProgramHandle>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Handle onto this device's call log.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn release(&self, object: Object) {
        if !self.journal.deleted(object) {
            tracing::warn!(?object, "headless device: deleting unknown object");
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, GpuError> {
        if self.journal.state.borrow().fail_compiles {
            return Err(GpuError::ShaderCompile {
                stage,
                log: "ERROR: 0:1: compilation disabled on this device".into(),
            });
        }
        if !source.contains("void main") {
            return Err(GpuError::ShaderCompile {
                stage,
                log: "ERROR: 0:0: 'main' : missing entry point".into(),
            });
        }
        let shader = ShaderHandle(self.next());
        self.shaders
            .insert(shader, (stage, Declarations::parse(stage, source)));
        self.journal.created(Object::Shader(shader.0));
        self.journal.record(GpuCall::CreateShader { shader, stage });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
        self.release(Object::Shader(shader.0));
        self.journal.record(GpuCall::DeleteShader(shader));
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, GpuError> {
        let (Some((ShaderStage::Vertex, vs)), Some((ShaderStage::Fragment, fs))) =
            (self.shaders.get(&vertex), self.shaders.get(&fragment))
        else {
            return Err(GpuError::ProgramLink {
                log: format!("invalid shader pair {vertex:?}/{fragment:?}"),
            });
        };

        let mut uniforms: Vec<ActiveUniform> = Vec::new();
        for (name, ty, len) in vs.uniforms.iter().chain(&fs.uniforms) {
            if uniforms.iter().any(|u| &u.name == name) {
                continue;
            }
            uniforms.push(ActiveUniform {
                name: name.clone(),
                ty: *ty,
                len: *len,
                location: UniformLocation(uniforms.len() as i32),
            });
        }
        let linked = LinkedProgram {
            uniforms,
            attributes: vs.inputs.clone(),
        };

        let program = ProgramHandle(self.next());
        self.programs.insert(program, linked);
        self.journal.created(Object::Program(program.0));
        self.journal.record(GpuCall::LinkProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.release(Object::Program(program.0));
        self.journal.record(GpuCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.journal.record(GpuCall::UseProgram(program));
    }

    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform> {
        self.programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs
            .get(&program)?
            .attributes
            .iter()
            .position(|a| a == name)
            .map(|i| i as u32)
    }

    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<BufferHandle, GpuError> {
        let buffer = BufferHandle(self.next());
        self.journal.created(Object::Buffer(buffer.0));
        self.journal.record(GpuCall::CreateBuffer {
            buffer,
            target,
            bytes: data.len(),
        });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.release(Object::Buffer(buffer.0));
        self.journal.record(GpuCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, GpuError> {
        if !self.capabilities.vertex_array_objects {
            return Err(GpuError::Allocation("vertex array"));
        }
        let vertex_array = VertexArrayHandle(self.next());
        self.journal.created(Object::VertexArray(vertex_array.0));
        self.journal
            .record(GpuCall::CreateVertexArray(vertex_array));
        Ok(vertex_array)
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.journal.record(GpuCall::BindVertexArray(vertex_array));
    }

    fn vertex_attribute(
        &mut self,
        _vertex_array: VertexArrayHandle,
        _buffer: BufferHandle,
        location: u32,
        components: u32,
    ) {
        self.journal.record(GpuCall::VertexAttribute {
            location,
            components,
        });
    }

    fn bind_index_buffer(&mut self, _vertex_array: VertexArrayHandle, buffer: BufferHandle) {
        self.journal.record(GpuCall::BindIndexBuffer(buffer));
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.release(Object::VertexArray(vertex_array.0));
        self.journal
            .record(GpuCall::DeleteVertexArray(vertex_array));
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureHandle, GpuError> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.rgba.len() != expected {
            return Err(GpuError::Allocation("texture with mismatched pixel data"));
        }
        let texture = TextureHandle(self.next());
        self.journal.created(Object::Texture(texture.0));
        self.journal.record(GpuCall::CreateTexture {
            texture,
            width: image.width,
            height: image.height,
        });
        Ok(texture)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.journal.record(GpuCall::BindTexture { unit, texture });
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.release(Object::Texture(texture.0));
        self.journal.record(GpuCall::DeleteTexture(texture));
    }

    fn write_uniform(&mut self, location: UniformLocation, value: UniformValue<'_>) {
        let name = self
            .current_program
            .and_then(|p| self.programs.get(&p))
            .and_then(|p| p.uniforms.iter().find(|u| u.location == location))
            .map(|u| u.name.clone())
            .unwrap_or_else(|| format!("<location {}>", location.0));
        self.journal.record(GpuCall::WriteUniform {
            program: self.current_program,
            name,
            ty: value.ty(),
            data: value.to_floats(),
        });
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.journal.record(GpuCall::Viewport { width, height });
    }

    fn clear(&mut self, _color: [f32; 4]) {
        self.journal.record(GpuCall::Clear);
    }

    fn draw_arrays(&mut self, vertex_count: u32) {
        self.journal.record(GpuCall::DrawArrays { vertex_count });
    }

    fn draw_elements(&mut self, index_count: u32) {
        self.journal.record(GpuCall::DrawElements { index_count });
    }
}

//! Boundary to the graphics backend.
//!
//! The render cache only talks to the GPU through [`GpuDevice`]. Handles are
//! opaque integers owned by whoever created them; the device never frees a
//! handle on its own.

use lumen_ecs::TextureImage;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Location of a uniform inside the program it was queried from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Declared type of a uniform, as reported by program introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Mat3,
    Mat4,
    Vec2,
    Vec3,
    Vec4,
    Float,
    Int,
    Sampler2D,
}

impl UniformType {
    /// Map a GLSL type keyword.
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        let ty = match keyword {
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "float" => Self::Float,
            "int" => Self::Int,
            "sampler2D" => Self::Sampler2D,
            _ => return None,
        };
        Some(ty)
    }
}

/// A uniform the linked program actually uses.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform {
    /// Name without any array suffix.
    pub name: String,
    pub ty: UniformType,
    /// Array length, 1 for scalars.
    pub len: u32,
    pub location: UniformLocation,
}

/// A typed uniform write. Array variants carry tightly packed floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Float(f32),
    Int(i32),
    /// Texture unit a `sampler2D` reads from.
    Sampler(i32),
    Vec3Array(&'a [f32]),
    FloatArray(&'a [f32]),
}

impl UniformValue<'_> {
    pub fn ty(&self) -> UniformType {
        match self {
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) | Self::Vec3Array(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Float(_) | Self::FloatArray(_) => UniformType::Float,
            Self::Int(_) => UniformType::Int,
            Self::Sampler(_) => UniformType::Sampler2D,
        }
    }

    /// Flatten to floats. Integer payloads are converted.
    pub fn to_floats(&self) -> Vec<f32> {
        match self {
            Self::Mat3(m) => m.to_vec(),
            Self::Mat4(m) => m.to_vec(),
            Self::Vec2(v) => v.to_vec(),
            Self::Vec3(v) => v.to_vec(),
            Self::Vec4(v) => v.to_vec(),
            Self::Float(x) => vec![*x],
            Self::Int(i) | Self::Sampler(i) => vec![*i as f32],
            Self::Vec3Array(a) | Self::FloatArray(a) => a.to_vec(),
        }
    }
}

/// Optional features a backend may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub vertex_array_objects: bool,
    pub max_texture_units: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            vertex_array_objects: true,
            max_texture_units: 16,
        }
    }
}

/// Errors reported by a [`GpuDevice`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum GpuError {
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("program failed to link:\n{log}")]
    ProgramLink { log: String },
    #[error("could not allocate {0}")]
    Allocation(&'static str),
}

/// Opaque graphics device: compiled programs, bound buffers, uniform writes.
///
/// Uniform writes and draws apply to the program bound by the last
/// [`GpuDevice::use_program`] and the vertex array bound by the last
/// [`GpuDevice::bind_vertex_array`].
pub trait GpuDevice {
    fn capabilities(&self) -> DeviceCapabilities;

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, GpuError>;
    fn delete_shader(&mut self, shader: ShaderHandle);

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, GpuError>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn use_program(&mut self, program: ProgramHandle);

    /// Uniforms the linked program declares and uses.
    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform>;
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<BufferHandle, GpuError>;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_vertex_array(&mut self) -> Result<VertexArrayHandle, GpuError>;
    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle);
    /// Record `buffer` as float attribute `location` with `components` per vertex.
    fn vertex_attribute(
        &mut self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        location: u32,
        components: u32,
    );
    fn bind_index_buffer(&mut self, vertex_array: VertexArrayHandle, buffer: BufferHandle);
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureHandle, GpuError>;
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);
    fn delete_texture(&mut self, texture: TextureHandle);

    fn write_uniform(&mut self, location: UniformLocation, value: UniformValue<'_>);

    fn set_viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, color: [f32; 4]);
    fn draw_arrays(&mut self, vertex_count: u32);
    /// Draw with the index buffer of the bound vertex array (u16 indices).
    fn draw_elements(&mut self, index_count: u32);
}

//! Component records for the scene runtime.
//!
//! Components are plain data bags. Their only behavior is mutators that flip
//! dirty flags; derived matrices are recomputed by update systems and uploaded
//! by the render layer.
//!
//! # Invariants
//! - Every mutator that changes an input of a derived matrix sets both the
//!   recompute and the upload tier of that matrix.
//! - Only the update systems clear the recompute tier; only the render layer
//!   clears the upload tier.
//! - A component kind is identified by [`ComponentKind`], never by type name.

mod camera;
mod dirty;
mod geometry;
mod light;
mod material;
mod transform;

pub use camera::{Camera, OrthographicCamera, PerspectiveCamera};
pub use dirty::{LightDirty, MatrixState, Staleness};
pub use geometry::{AttributeSet, Geometry};
pub use light::DirectionalLight;
pub use material::{Material, Shading, TextureImage};
pub use transform::Transform;

use std::fmt;

/// Marks an entity as drawable. Geometry and Material live on the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderable {
    pub visible: bool,
}

impl Default for Renderable {
    fn default() -> Self {
        Self { visible: true }
    }
}

/// Discriminant of [`Component`]. Tables are keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Transform,
    PerspectiveCamera,
    OrthographicCamera,
    DirectionalLight,
    Renderable,
    Geometry,
    Material,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transform => "Transform",
            Self::PerspectiveCamera => "PerspectiveCamera",
            Self::OrthographicCamera => "OrthographicCamera",
            Self::DirectionalLight => "DirectionalLight",
            Self::Renderable => "Renderable",
            Self::Geometry => "Geometry",
            Self::Material => "Material",
        };
        f.write_str(name)
    }
}

/// Closed set of component kinds an entity can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Transform(Transform),
    PerspectiveCamera(PerspectiveCamera),
    OrthographicCamera(OrthographicCamera),
    DirectionalLight(DirectionalLight),
    Renderable(Renderable),
    Geometry(Geometry),
    Material(Material),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Transform(_) => ComponentKind::Transform,
            Self::PerspectiveCamera(_) => ComponentKind::PerspectiveCamera,
            Self::OrthographicCamera(_) => ComponentKind::OrthographicCamera,
            Self::DirectionalLight(_) => ComponentKind::DirectionalLight,
            Self::Renderable(_) => ComponentKind::Renderable,
            Self::Geometry(_) => ComponentKind::Geometry,
            Self::Material(_) => ComponentKind::Material,
        }
    }
}

/// Typed view into [`Component`], used by the world's generic accessors.
pub trait ComponentData: Into<Component> + 'static {
    const KIND: ComponentKind;

    fn from_component(component: &Component) -> Option<&Self>;
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
}

macro_rules! declare_component {
    ($ty:ident) => {
        impl From<$ty> for Component {
            fn from(value: $ty) -> Self {
                Component::$ty(value)
            }
        }

        impl ComponentData for $ty {
            const KIND: ComponentKind = ComponentKind::$ty;

            fn from_component(component: &Component) -> Option<&Self> {
                match component {
                    Component::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                match component {
                    Component::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

declare_component!(Transform);
declare_component!(PerspectiveCamera);
declare_component!(OrthographicCamera);
declare_component!(DirectionalLight);
declare_component!(Renderable);
declare_component!(Geometry);
declare_component!(Material);

pub fn crate_info() -> &'static str {
    "lumen-ecs v0.1.0"
}

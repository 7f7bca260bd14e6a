use lumen_common::{CanvasSize, EntityId};
use lumen_ecs::ComponentKind;

/// Events fanned out synchronously by [`crate::World::publish`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldEvent {
    /// All components of a new entity are attached.
    RegisterEntity { entity: EntityId },
    /// The entity is about to be removed; its components are still readable.
    RemoveEntity { entity: EntityId },
    /// A component was attached to an existing entity.
    AttachComponent { entity: EntityId, kind: ComponentKind },
    /// The drawing surface changed size.
    ResizeCanvas { width: u32, height: u32 },
}

/// Subscription key of a [`WorldEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    RegisterEntity,
    RemoveEntity,
    AttachComponent,
    ResizeCanvas,
}

impl WorldEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RegisterEntity { .. } => EventKind::RegisterEntity,
            Self::RemoveEntity { .. } => EventKind::RemoveEntity,
            Self::AttachComponent { .. } => EventKind::AttachComponent,
            Self::ResizeCanvas { .. } => EventKind::ResizeCanvas,
        }
    }

    pub fn resize(size: CanvasSize) -> Self {
        Self::ResizeCanvas {
            width: size.width,
            height: size.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let id = EntityId::new();
        assert_eq!(
            WorldEvent::RegisterEntity { entity: id }.kind(),
            EventKind::RegisterEntity
        );
        assert_eq!(
            WorldEvent::resize(CanvasSize::new(4, 3)).kind(),
            EventKind::ResizeCanvas
        );
    }
}

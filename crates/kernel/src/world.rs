use crate::event::{EventKind, WorldEvent};
use crate::system::{BoxError, Frame, FrameClock, Stage, System, SystemId};
use lumen_common::EntityId;
use lumen_ecs::{Component, ComponentData, ComponentKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Errors from world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Configuration error: an entity may hold one component per kind.
    #[error("entity {entity} already holds a {kind} component")]
    DuplicateComponent {
        entity: EntityId,
        kind: ComponentKind,
    },
    #[error("entity {0} is not registered")]
    UnknownEntity(EntityId),
    #[error("{0} is not registered")]
    UnknownSystem(SystemId),
    #[error("system `{0}` is running and cannot be removed")]
    SystemBusy(&'static str),
    #[error("system `{system}` failed: {source}")]
    System {
        system: &'static str,
        source: BoxError,
    },
}

struct SystemSlot {
    name: &'static str,
    /// `None` while one of the system's hooks is running.
    system: Option<Box<dyn System>>,
}

/// Entity/component registry, event bus and frame pipelines.
///
/// Components are stored once per entity in `by_entity`; `by_kind` indexes the
/// owning entities of every kind in registration order. Both tables are
/// updated together by every mutation so neither can observe a component the
/// other lacks.
pub struct World {
    by_kind: BTreeMap<ComponentKind, Vec<EntityId>>,
    by_entity: BTreeMap<EntityId, Vec<Component>>,
    /// Entities in registration order.
    entities: Vec<EntityId>,
    systems: BTreeMap<SystemId, SystemSlot>,
    update_pipeline: Vec<SystemId>,
    render_pipeline: Vec<SystemId>,
    subscribers: BTreeMap<EventKind, Vec<SystemId>>,
    next_system: u32,
    update_clock: FrameClock,
    render_clock: FrameClock,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("components", &self.component_count())
            .field("update_pipeline", &self.update_pipeline)
            .field("render_pipeline", &self.render_pipeline)
            .finish()
    }
}

impl World {
    /// Create an empty world with no systems.
    pub fn new() -> Self {
        Self {
            by_kind: BTreeMap::new(),
            by_entity: BTreeMap::new(),
            entities: Vec::new(),
            systems: BTreeMap::new(),
            update_pipeline: Vec::new(),
            render_pipeline: Vec::new(),
            subscribers: BTreeMap::new(),
            next_system: 0,
            update_clock: FrameClock::new(),
            render_clock: FrameClock::new(),
        }
    }

    // --- Entities ---

    /// Register a new entity holding `components`.
    ///
    /// Nothing is registered if two components share a kind. Subscribers of
    /// [`EventKind::RegisterEntity`] run after every component is attached.
    pub fn register_entity(&mut self, components: Vec<Component>) -> Result<EntityId, WorldError> {
        let entity = EntityId::new();
        let mut seen = BTreeSet::new();
        for component in &components {
            let kind = component.kind();
            if !seen.insert(kind) {
                return Err(WorldError::DuplicateComponent { entity, kind });
            }
        }

        for kind in &seen {
            self.by_kind.entry(*kind).or_default().push(entity);
        }
        self.by_entity.insert(entity, components);
        self.entities.push(entity);
        tracing::debug!(%entity, kinds = ?seen, "registered entity");

        self.publish(WorldEvent::RegisterEntity { entity });
        Ok(entity)
    }

    /// Attach one more component to an existing entity.
    pub fn attach(&mut self, entity: EntityId, component: Component) -> Result<(), WorldError> {
        let kind = component.kind();
        let list = self
            .by_entity
            .get_mut(&entity)
            .ok_or(WorldError::UnknownEntity(entity))?;
        if list.iter().any(|c| c.kind() == kind) {
            return Err(WorldError::DuplicateComponent { entity, kind });
        }
        list.push(component);
        self.by_kind.entry(kind).or_default().push(entity);
        tracing::debug!(%entity, %kind, "attached component");

        self.publish(WorldEvent::AttachComponent { entity, kind });
        Ok(())
    }

    /// Remove an entity and return its components, if it existed.
    ///
    /// Subscribers of [`EventKind::RemoveEntity`] run first and can still read
    /// the entity's components. Cost is linear in the number of entities per kind.
    pub fn remove_entity(&mut self, entity: EntityId) -> Option<Vec<Component>> {
        if !self.by_entity.contains_key(&entity) {
            return None;
        }
        self.publish(WorldEvent::RemoveEntity { entity });

        let removed = self.by_entity.remove(&entity);
        for list in self.by_kind.values_mut() {
            list.retain(|e| *e != entity);
        }
        self.entities.retain(|e| *e != entity);
        tracing::debug!(%entity, "removed entity");
        removed
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.by_entity.contains_key(&entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Total number of components across all entities.
    pub fn component_count(&self) -> usize {
        self.by_entity.values().map(Vec::len).sum()
    }

    /// Live entities in registration order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    // --- Components ---

    pub fn components_of(&self, entity: EntityId) -> Option<&[Component]> {
        self.by_entity.get(&entity).map(Vec::as_slice)
    }

    /// Entities holding a component of `kind`, in registration order.
    pub fn entities_with(&self, kind: ComponentKind) -> &[EntityId] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All components of `kind`, in registration order.
    pub fn components_of_kind(
        &self,
        kind: ComponentKind,
    ) -> impl Iterator<Item = (EntityId, &Component)> + '_ {
        self.entities_with(kind).iter().filter_map(move |id| {
            self.by_entity
                .get(id)?
                .iter()
                .find(|c| c.kind() == kind)
                .map(|c| (*id, c))
        })
    }

    pub fn get<T: ComponentData>(&self, entity: EntityId) -> Option<&T> {
        self.by_entity
            .get(&entity)?
            .iter()
            .find_map(T::from_component)
    }

    pub fn get_mut<T: ComponentData>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.by_entity
            .get_mut(&entity)?
            .iter_mut()
            .find_map(T::from_component_mut)
    }

    /// Typed iteration over every component of kind `T`, in registration order.
    pub fn query<T: ComponentData>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.entities_with(T::KIND)
            .iter()
            .filter_map(move |id| self.get::<T>(*id).map(|c| (*id, c)))
    }

    /// Visit every component of kind `T` mutably, in registration order.
    pub fn for_each_mut<T: ComponentData>(&mut self, mut f: impl FnMut(EntityId, &mut T)) {
        let Some(ids) = self.by_kind.get(&T::KIND) else {
            return;
        };
        for id in ids {
            if let Some(component) = self
                .by_entity
                .get_mut(id)
                .and_then(|list| list.iter_mut().find_map(T::from_component_mut))
            {
                f(*id, component);
            }
        }
    }

    // --- Events ---

    /// Deliver `event` to every subscriber of its kind, in subscription order.
    ///
    /// Delivery is synchronous and cannot be cancelled. A subscriber whose hook
    /// is already running (reentrant publish) is skipped.
    pub fn publish(&mut self, event: WorldEvent) {
        let Some(ids) = self.subscribers.get(&event.kind()).cloned() else {
            return;
        };
        tracing::trace!(?event, subscribers = ids.len(), "publishing event");
        for id in ids {
            self.with_system(id, |system, world| system.on_event(world, &event));
        }
    }

    /// Subscribe a registered system to the given event kinds.
    pub fn subscribe(&mut self, id: SystemId, kinds: &[EventKind]) {
        for kind in kinds {
            let list = self.subscribers.entry(*kind).or_default();
            if !list.contains(&id) {
                list.push(id);
            }
        }
    }

    // --- Systems ---

    /// Register a system, run its `init` hook and file it into its pipeline.
    pub fn register_system(&mut self, mut system: Box<dyn System>) -> SystemId {
        let id = SystemId(self.next_system);
        self.next_system += 1;
        let name = system.name();
        let stage = system.stage();
        self.systems.insert(id, SystemSlot { name, system: None });

        system.init(self, id);

        if let Some(slot) = self.systems.get_mut(&id) {
            slot.system = Some(system);
        }
        match stage {
            Stage::Update => self.update_pipeline.push(id),
            Stage::Render => self.render_pipeline.push(id),
        }
        tracing::debug!(%id, name, ?stage, "registered system");
        id
    }

    pub fn add_system<S: System + 'static>(&mut self, system: S) -> SystemId {
        self.register_system(Box::new(system))
    }

    /// Remove a system and run its `cleanup` hook.
    pub fn remove_system(&mut self, id: SystemId) -> Result<(), WorldError> {
        let slot = self
            .systems
            .get_mut(&id)
            .ok_or(WorldError::UnknownSystem(id))?;
        let mut system = slot.system.take().ok_or(WorldError::SystemBusy(slot.name))?;
        self.systems.remove(&id);
        self.update_pipeline.retain(|s| *s != id);
        self.render_pipeline.retain(|s| *s != id);
        for list in self.subscribers.values_mut() {
            list.retain(|s| *s != id);
        }

        system.cleanup(self);
        tracing::debug!(%id, name = system.name(), "removed system");
        Ok(())
    }

    /// Remove every system, newest first.
    pub fn shutdown(&mut self) -> Result<(), WorldError> {
        let ids: Vec<SystemId> = self.systems.keys().rev().copied().collect();
        for id in ids {
            self.remove_system(id)?;
        }
        Ok(())
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn update_pipeline(&self) -> &[SystemId] {
        &self.update_pipeline
    }

    pub fn render_pipeline(&self) -> &[SystemId] {
        &self.render_pipeline
    }

    /// Run the update pipeline. `time` is a non-decreasing timestamp in milliseconds.
    pub fn update(&mut self, time: f64) -> Result<(), WorldError> {
        let _span = tracing::info_span!("update", time).entered();
        let frame = self.update_clock.tick(time);
        let ids = self.update_pipeline.clone();
        self.run_pipeline(&ids, frame)
    }

    /// Run the render pipeline. Call after [`World::update`] for the same frame.
    pub fn render(&mut self, time: f64) -> Result<(), WorldError> {
        let _span = tracing::info_span!("render", time).entered();
        let frame = self.render_clock.tick(time);
        let ids = self.render_pipeline.clone();
        self.run_pipeline(&ids, frame)
    }

    fn run_pipeline(&mut self, ids: &[SystemId], frame: Frame) -> Result<(), WorldError> {
        for id in ids {
            let outcome = self.with_system(*id, |system, world| {
                system
                    .run(world, frame)
                    .map_err(|source| WorldError::System {
                        system: system.name(),
                        source,
                    })
            });
            if let Some(result) = outcome {
                result?;
            }
        }
        Ok(())
    }

    /// Take a system out of its slot, run `f`, and put it back.
    fn with_system<R>(
        &mut self,
        id: SystemId,
        f: impl FnOnce(&mut dyn System, &mut World) -> R,
    ) -> Option<R> {
        let mut system = self.systems.get_mut(&id)?.system.take()?;
        let result = f(system.as_mut(), self);
        if let Some(slot) = self.systems.get_mut(&id) {
            slot.system = Some(system);
        }
        Some(result)
    }
}

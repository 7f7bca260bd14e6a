use lumen_common::EntityId;
use lumen_ecs::{DirectionalLight, LightDirty};

/// Per-frame flattening of every directional light into uniform arrays.
///
/// The dirty union tells programs which arrays to rewrite. Any change in which
/// light fills which slot marks every array dirty, since the moved lights'
/// own flags may be clean.
#[derive(Debug, Clone, Default)]
pub struct DirectionalLightCache {
    capacity: usize,
    slots: Vec<EntityId>,
    directions: Vec<f32>,
    colors: Vec<f32>,
    intensities: Vec<f32>,
    count: usize,
    count_changed: bool,
    dirty: LightDirty,
}

impl DirectionalLightCache {
    /// Cache holding at most `capacity` lights; extras are ignored.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            dirty: LightDirty::empty(),
            ..Self::default()
        }
    }

    /// Rebuild the arrays from this frame's lights, in query order.
    pub fn refresh<'a>(
        &mut self,
        lights: impl IntoIterator<Item = (EntityId, &'a DirectionalLight)>,
    ) {
        self.directions.clear();
        self.colors.clear();
        self.intensities.clear();
        let previous = std::mem::take(&mut self.slots);
        let mut dirty = LightDirty::empty();
        let mut seen = 0;

        for (entity, light) in lights {
            seen += 1;
            if seen > self.capacity {
                continue;
            }
            self.slots.push(entity);
            self.directions.extend_from_slice(&light.direction().to_array());
            self.colors.extend_from_slice(&light.color().to_array());
            self.intensities.push(light.intensity());
            dirty |= light.dirty();
        }
        if seen > self.capacity {
            tracing::warn!(
                lights = seen,
                capacity = self.capacity,
                "too many directional lights, extras ignored"
            );
        }

        self.count = self.slots.len();
        self.count_changed = self.count != previous.len();
        self.dirty = if self.slots != previous {
            tracing::debug!(count = self.count, "directional light slots reassigned");
            LightDirty::all()
        } else {
            dirty
        };
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the count differs from the previous refresh.
    pub fn count_changed(&self) -> bool {
        self.count_changed
    }

    pub fn dirty(&self) -> LightDirty {
        self.dirty
    }

    pub fn needs_upload(&self, field: LightDirty) -> bool {
        self.dirty.intersects(field)
    }

    pub fn directions(&self) -> &[f32] {
        &self.directions
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn intensities(&self) -> &[f32] {
        &self.intensities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn clean(direction: Vec3) -> (EntityId, DirectionalLight) {
        let mut light = DirectionalLight::new(direction, Vec3::ONE, 1.0);
        light.mark_uploaded();
        (EntityId::new(), light)
    }

    fn colored(color: Vec3) -> (EntityId, DirectionalLight) {
        let mut light = DirectionalLight::new(Vec3::NEG_Y, color, 1.0);
        light.mark_uploaded();
        (EntityId::new(), light)
    }

    fn refs(lights: &[(EntityId, DirectionalLight)]) -> Vec<(EntityId, &DirectionalLight)> {
        lights.iter().map(|(id, light)| (*id, light)).collect()
    }

    #[test]
    fn flattens_in_order() {
        let a = DirectionalLight::new(Vec3::NEG_Y, Vec3::X, 0.5);
        let b = DirectionalLight::new(Vec3::NEG_Z, Vec3::Y, 2.0);
        let mut cache = DirectionalLightCache::new(4);
        cache.refresh([(EntityId::new(), &a), (EntityId::new(), &b)]);
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.directions(), &[0.0, -1.0, 0.0, 0.0, 0.0, -1.0]);
        assert_eq!(cache.colors(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(cache.intensities(), &[0.5, 2.0]);
        assert!(cache.count_changed());
    }

    #[test]
    fn union_of_light_flags() {
        let mut lights = vec![clean(Vec3::NEG_Y), clean(Vec3::NEG_Z)];
        let mut cache = DirectionalLightCache::new(4);
        cache.refresh(refs(&lights));

        cache.refresh(refs(&lights));
        assert!(!cache.count_changed());
        assert_eq!(cache.dirty(), LightDirty::empty());

        lights[1].1.set_color(Vec3::Z);
        cache.refresh(refs(&lights));
        assert!(cache.needs_upload(LightDirty::COLOR));
        assert!(!cache.needs_upload(LightDirty::DIRECTION));
    }

    #[test]
    fn count_change_forces_every_array() {
        let lights = vec![clean(Vec3::NEG_Y), clean(Vec3::NEG_X)];
        let mut cache = DirectionalLightCache::new(4);
        cache.refresh(refs(&lights));
        cache.refresh(refs(&lights[..1]));
        assert!(cache.count_changed());
        assert_eq!(cache.dirty(), LightDirty::all());
    }

    #[test]
    fn extras_beyond_capacity_are_dropped() {
        let lights: Vec<_> = (0..3).map(|_| clean(Vec3::NEG_Y)).collect();
        let mut cache = DirectionalLightCache::new(2);
        cache.refresh(refs(&lights));
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.intensities().len(), 2);
    }

    #[test]
    fn removed_light_shifts_overflow_into_slot() {
        let mut lights = vec![colored(Vec3::X), colored(Vec3::Y), colored(Vec3::Z)];
        let mut cache = DirectionalLightCache::new(2);
        cache.refresh(refs(&lights));
        cache.refresh(refs(&lights));
        assert_eq!(cache.dirty(), LightDirty::empty());

        lights.remove(0);
        cache.refresh(refs(&lights));
        assert!(!cache.count_changed());
        assert_eq!(cache.dirty(), LightDirty::all());
        assert_eq!(cache.colors(), &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn reordered_slots_mark_every_array() {
        let mut lights = vec![clean(Vec3::NEG_Y), clean(Vec3::NEG_X)];
        let mut cache = DirectionalLightCache::new(4);
        cache.refresh(refs(&lights));
        lights.swap(0, 1);
        cache.refresh(refs(&lights));
        assert!(!cache.count_changed());
        assert_eq!(cache.dirty(), LightDirty::all());
        assert_eq!(cache.directions(), &[-1.0, 0.0, 0.0, 0.0, -1.0, 0.0]);
    }
}

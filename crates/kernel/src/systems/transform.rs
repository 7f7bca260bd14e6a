use crate::system::{BoxError, Frame, Stage, System};
use crate::world::World;
use lumen_ecs::Transform;

/// Recompute the model matrix of every transform whose recompute tier is set.
///
/// Returns how many matrices were rebuilt. The upload tier is left for the
/// render layer.
pub fn resolve_transforms(world: &mut World) -> usize {
    let mut recomputed = 0;
    world.for_each_mut::<Transform>(|_, transform| {
        if transform.state().needs_recompute() {
            transform.commit_model(transform.compose());
            recomputed += 1;
        }
    });
    recomputed
}

/// Update-stage system wrapping [`resolve_transforms`].
#[derive(Debug, Default)]
pub struct TransformSystem;

impl TransformSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for TransformSystem {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn stage(&self) -> Stage {
        Stage::Update
    }

    fn run(&mut self, world: &mut World, _frame: Frame) -> Result<(), BoxError> {
        let recomputed = resolve_transforms(world);
        tracing::trace!(recomputed, "transforms resolved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Quat, Vec3};
    use lumen_ecs::Staleness;

    #[test]
    fn clean_pass_is_a_noop() {
        let mut world = World::new();
        world
            .register_entity(vec![Transform::default().into()])
            .unwrap();
        assert_eq!(resolve_transforms(&mut world), 1);
        assert_eq!(resolve_transforms(&mut world), 0);
        assert_eq!(resolve_transforms(&mut world), 0);
    }

    #[test]
    fn repeated_passes_yield_identical_matrix() {
        let mut world = World::new();
        let id = world
            .register_entity(vec![Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)).into()])
            .unwrap();
        resolve_transforms(&mut world);
        let once = world.get::<Transform>(id).unwrap().model_matrix();
        for _ in 0..5 {
            resolve_transforms(&mut world);
        }
        assert_eq!(world.get::<Transform>(id).unwrap().model_matrix(), once);
    }

    #[test]
    fn translate_then_resolve_matches_compose() {
        let mut world = World::new();
        let id = world
            .register_entity(vec![Transform::default().into()])
            .unwrap();
        for _ in 0..3 {
            resolve_transforms(&mut world);
        }

        let t = world.get_mut::<Transform>(id).unwrap();
        t.rotate(Vec3::new(0.0, 0.5, 0.0));
        t.scale(Vec3::splat(2.0));
        t.translate(Vec3::new(4.0, 5.0, 6.0));
        resolve_transforms(&mut world);

        let t = world.get::<Transform>(id).unwrap();
        let expected =
            Mat4::from_scale_rotation_translation(t.scaling(), t.rotation(), Vec3::new(4.0, 5.0, 6.0));
        assert!(t.model_matrix().abs_diff_eq(expected, 1e-6));
        assert_ne!(t.rotation(), Quat::IDENTITY);
    }

    #[test]
    fn resolve_leaves_upload_tier() {
        let mut world = World::new();
        let id = world
            .register_entity(vec![Transform::default().into()])
            .unwrap();
        resolve_transforms(&mut world);
        assert_eq!(
            world.get::<Transform>(id).unwrap().state().staleness(),
            Staleness::NeedsUpload
        );
    }

    #[test]
    fn system_runs_through_world() {
        let mut world = World::new();
        world.add_system(TransformSystem::new());
        let id = world
            .register_entity(vec![Transform::default().into()])
            .unwrap();
        world.get_mut::<Transform>(id).unwrap().translate(Vec3::Y);
        world.update(16.0).unwrap();
        let t = world.get::<Transform>(id).unwrap();
        assert!(!t.state().needs_recompute());
        assert_eq!(t.model_matrix().w_axis.truncate(), Vec3::Y);
    }
}

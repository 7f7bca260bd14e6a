use crate::dirty::MatrixState;
use glam::{EulerRot, Mat4, Quat, Vec3};

/// Spatial transform: translation, rotation, scaling and the derived model matrix.
///
/// Inputs are only reachable through mutators so that every change marks the
/// model matrix stale in both tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scaling: Vec3,
    model: Mat4,
    state: MatrixState,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scaling: Vec3::ONE,
            model: Mat4::IDENTITY,
            state: MatrixState::STALE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scaling(&self) -> Vec3 {
        self.scaling
    }

    /// Model matrix as of the last update pass.
    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    pub fn state(&self) -> MatrixState {
        self.state
    }

    /// Move by `delta`.
    pub fn translate(&mut self, delta: Vec3) -> &mut Self {
        self.translation += delta;
        self.mark_stale()
    }

    /// Multiply the current scaling component-wise by `factor`.
    pub fn scale(&mut self, factor: Vec3) -> &mut Self {
        self.scaling *= factor;
        self.mark_stale()
    }

    /// Apply an XYZ Euler rotation (radians) on top of the current rotation.
    pub fn rotate(&mut self, euler: Vec3) -> &mut Self {
        let delta = Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
        self.rotation = (self.rotation * delta).normalize();
        self.mark_stale()
    }

    pub fn set_translation(&mut self, translation: Vec3) -> &mut Self {
        self.translation = translation;
        self.mark_stale()
    }

    pub fn set_rotation(&mut self, rotation: Quat) -> &mut Self {
        self.rotation = rotation.normalize();
        self.mark_stale()
    }

    pub fn set_scaling(&mut self, scaling: Vec3) -> &mut Self {
        self.scaling = scaling;
        self.mark_stale()
    }

    /// Model matrix for the current inputs. Does not touch any flag.
    pub fn compose(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scaling, self.rotation, self.translation)
    }

    /// Store a recomputed model matrix and clear the recompute tier.
    pub fn commit_model(&mut self, model: Mat4) {
        self.model = model;
        self.state.remove(MatrixState::RECOMPUTE);
    }

    /// Clear the upload tier after the model matrix reached the GPU.
    pub fn mark_uploaded(&mut self) {
        self.state.remove(MatrixState::UPLOAD);
    }

    fn mark_stale(&mut self) -> &mut Self {
        self.state |= MatrixState::STALE;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::Staleness;

    #[test]
    fn default_is_identity_and_stale() {
        let t = Transform::default();
        assert_eq!(t.translation(), Vec3::ZERO);
        assert_eq!(t.rotation(), Quat::IDENTITY);
        assert_eq!(t.scaling(), Vec3::ONE);
        assert_eq!(t.state().staleness(), Staleness::Both);
    }

    #[test]
    fn mutators_set_both_tiers() {
        let mut t = Transform::default();
        t.commit_model(t.compose());
        t.mark_uploaded();
        assert_eq!(t.state().staleness(), Staleness::Clean);

        t.translate(Vec3::X);
        assert_eq!(t.state().staleness(), Staleness::Both);

        t.commit_model(t.compose());
        t.mark_uploaded();
        t.scale(Vec3::splat(2.0));
        assert_eq!(t.state().staleness(), Staleness::Both);

        t.commit_model(t.compose());
        t.mark_uploaded();
        t.rotate(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(t.state().staleness(), Staleness::Both);
    }

    #[test]
    fn commit_clears_only_recompute() {
        let mut t = Transform::default();
        t.translate(Vec3::new(1.0, 2.0, 3.0));
        t.commit_model(t.compose());
        assert_eq!(t.state().staleness(), Staleness::NeedsUpload);
        assert_eq!(
            t.model_matrix().w_axis.truncate(),
            Vec3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn scale_multiplies() {
        let mut t = Transform::default();
        t.scale(Vec3::splat(2.0)).scale(Vec3::new(1.0, 3.0, 1.0));
        assert_eq!(t.scaling(), Vec3::new(2.0, 6.0, 2.0));
    }
}

use crate::dirty::MatrixState;
use glam::{Mat4, Vec3};

/// Shared surface of every camera kind.
///
/// The update system drives recomputation through `compose_*`/`commit_*`; the
/// render layer reads the committed matrices and clears the upload tier.
pub trait Camera {
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self) -> Mat4;
    fn view_state(&self) -> MatrixState;
    fn projection_state(&self) -> MatrixState;

    /// View matrix for the current inputs.
    fn compose_view(&self) -> Mat4;
    /// Projection matrix for the current inputs.
    fn compose_projection(&self) -> Mat4;

    fn commit_view(&mut self, view: Mat4);
    fn commit_projection(&mut self, projection: Mat4);

    /// Clear the upload tier of both matrices.
    fn mark_uploaded(&mut self);
}

/// Placement of a camera: where it sits, what it looks at, which way is up.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Eye {
    translation: Vec3,
    target: Vec3,
    up: Vec3,
    view: Mat4,
    state: MatrixState,
}

impl Eye {
    fn new(translation: Vec3) -> Self {
        Self {
            translation,
            target: Vec3::ZERO,
            up: Vec3::Y,
            view: Mat4::IDENTITY,
            state: MatrixState::STALE,
        }
    }

    fn compose(&self) -> Mat4 {
        Mat4::look_at_rh(self.translation, self.target, self.up)
    }
}

/// Projection slot shared by both camera kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Lens {
    projection: Mat4,
    state: MatrixState,
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            state: MatrixState::STALE,
        }
    }
}

macro_rules! eye_mutators {
    () => {
        pub fn translation(&self) -> Vec3 {
            self.eye.translation
        }

        pub fn target(&self) -> Vec3 {
            self.eye.target
        }

        pub fn up(&self) -> Vec3 {
            self.eye.up
        }

        /// Move the camera by `delta`. The look-at target stays where it is.
        pub fn translate(&mut self, delta: Vec3) -> &mut Self {
            self.eye.translation += delta;
            self.eye.state |= MatrixState::STALE;
            self
        }

        pub fn set_translation(&mut self, translation: Vec3) -> &mut Self {
            self.eye.translation = translation;
            self.eye.state |= MatrixState::STALE;
            self
        }

        pub fn look_at(&mut self, target: Vec3) -> &mut Self {
            self.eye.target = target;
            self.eye.state |= MatrixState::STALE;
            self
        }

        pub fn set_up(&mut self, up: Vec3) -> &mut Self {
            self.eye.up = up;
            self.eye.state |= MatrixState::STALE;
            self
        }
    };
}

macro_rules! impl_camera {
    ($ty:ty) => {
        impl Camera for $ty {
            fn view_matrix(&self) -> Mat4 {
                self.eye.view
            }

            fn projection_matrix(&self) -> Mat4 {
                self.lens.projection
            }

            fn view_state(&self) -> MatrixState {
                self.eye.state
            }

            fn projection_state(&self) -> MatrixState {
                self.lens.state
            }

            fn compose_view(&self) -> Mat4 {
                self.eye.compose()
            }

            fn compose_projection(&self) -> Mat4 {
                self.projection()
            }

            fn commit_view(&mut self, view: Mat4) {
                self.eye.view = view;
                self.eye.state.remove(MatrixState::RECOMPUTE);
            }

            fn commit_projection(&mut self, projection: Mat4) {
                self.lens.projection = projection;
                self.lens.state.remove(MatrixState::RECOMPUTE);
            }

            fn mark_uploaded(&mut self) {
                self.eye.state.remove(MatrixState::UPLOAD);
                self.lens.state.remove(MatrixState::UPLOAD);
            }
        }
    };
}

/// Perspective camera. Field of view is vertical, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    eye: Eye,
    lens: Lens,
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            eye: Eye::new(Vec3::new(0.0, 0.0, 1.0)),
            lens: Lens::default(),
            fov: 45.0_f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov,
            aspect,
            near,
            far,
            ..Self::default()
        }
    }

    eye_mutators!();

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn set_aspect(&mut self, aspect: f32) -> &mut Self {
        self.aspect = aspect;
        self.lens.state |= MatrixState::STALE;
        self
    }

    pub fn set_fov(&mut self, fov: f32) -> &mut Self {
        self.fov = fov;
        self.lens.state |= MatrixState::STALE;
        self
    }

    pub fn set_clip(&mut self, near: f32, far: f32) -> &mut Self {
        self.near = near;
        self.far = far;
        self.lens.state |= MatrixState::STALE;
        self
    }

    fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov, self.aspect, self.near, self.far)
    }
}

impl_camera!(PerspectiveCamera);

/// Orthographic camera described by its six clip planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicCamera {
    eye: Eye,
    lens: Lens,
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
}

impl Default for OrthographicCamera {
    fn default() -> Self {
        Self {
            eye: Eye::new(Vec3::new(0.0, 0.0, 1.0)),
            lens: Lens::default(),
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl OrthographicCamera {
    pub fn new(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
            near,
            far,
            ..Self::default()
        }
    }

    eye_mutators!();

    /// `[left, right, bottom, top, near, far]`.
    pub fn bounds(&self) -> [f32; 6] {
        [
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        ]
    }

    pub fn set_bounds(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> &mut Self {
        self.left = left;
        self.right = right;
        self.bottom = bottom;
        self.top = top;
        self.near = near;
        self.far = far;
        self.lens.state |= MatrixState::STALE;
        self
    }

    fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }
}

impl_camera!(OrthographicCamera);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::Staleness;

    fn settle<C: Camera>(cam: &mut C) {
        let view = cam.compose_view();
        let projection = cam.compose_projection();
        cam.commit_view(view);
        cam.commit_projection(projection);
        cam.mark_uploaded();
    }

    #[test]
    fn new_camera_is_stale() {
        let cam = PerspectiveCamera::default();
        assert_eq!(cam.view_state().staleness(), Staleness::Both);
        assert_eq!(cam.projection_state().staleness(), Staleness::Both);
    }

    #[test]
    fn translate_only_touches_view() {
        let mut cam = PerspectiveCamera::default();
        settle(&mut cam);
        cam.translate(Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(cam.view_state().staleness(), Staleness::Both);
        assert_eq!(cam.projection_state().staleness(), Staleness::Clean);
        assert_eq!(cam.translation(), Vec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn set_aspect_only_touches_projection() {
        let mut cam = PerspectiveCamera::default();
        settle(&mut cam);
        cam.set_aspect(2.0);
        assert_eq!(cam.view_state().staleness(), Staleness::Clean);
        assert_eq!(cam.projection_state().staleness(), Staleness::Both);
    }

    #[test]
    fn perspective_projection_matches_glam() {
        let cam = PerspectiveCamera::new(1.0, 1.5, 0.5, 50.0);
        assert_eq!(
            cam.compose_projection(),
            Mat4::perspective_rh_gl(1.0, 1.5, 0.5, 50.0)
        );
    }

    #[test]
    fn orthographic_bounds_drive_projection() {
        let mut cam = OrthographicCamera::default();
        settle(&mut cam);
        cam.set_bounds(-2.0, 2.0, -1.0, 1.0, 0.1, 10.0);
        assert_eq!(cam.projection_state().staleness(), Staleness::Both);
        assert_eq!(
            cam.compose_projection(),
            Mat4::orthographic_rh_gl(-2.0, 2.0, -1.0, 1.0, 0.1, 10.0)
        );
    }

    #[test]
    fn view_looks_at_target() {
        let mut cam = PerspectiveCamera::default();
        cam.set_translation(Vec3::new(0.0, 0.0, 5.0));
        let view = cam.compose_view();
        let origin_in_view = view.transform_point3(Vec3::ZERO);
        assert!(origin_in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }
}

use crate::dirty::LightDirty;
use glam::Vec3;

/// A light infinitely far away, shining along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    direction: Vec3,
    color: Vec3,
    intensity: f32,
    dirty: LightDirty,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::ONE,
            intensity: 1.0,
            dirty: LightDirty::all(),
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            dirty: LightDirty::all(),
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Upload-tier flags. Lights have no recompute tier.
    pub fn dirty(&self) -> LightDirty {
        self.dirty
    }

    pub fn set_direction(&mut self, direction: Vec3) -> &mut Self {
        self.direction = direction.normalize_or_zero();
        self.dirty |= LightDirty::DIRECTION;
        self
    }

    pub fn set_color(&mut self, color: Vec3) -> &mut Self {
        self.color = color;
        self.dirty |= LightDirty::COLOR;
        self
    }

    pub fn set_intensity(&mut self, intensity: f32) -> &mut Self {
        self.intensity = intensity;
        self.dirty |= LightDirty::INTENSITY;
        self
    }

    pub fn mark_uploaded(&mut self) {
        self.dirty = LightDirty::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_light_is_fully_dirty() {
        let light = DirectionalLight::default();
        assert_eq!(light.dirty(), LightDirty::all());
    }

    #[test]
    fn setters_flag_their_field() {
        let mut light = DirectionalLight::default();
        light.mark_uploaded();

        light.set_intensity(2.0);
        assert_eq!(light.dirty(), LightDirty::INTENSITY);

        light.set_color(Vec3::X);
        assert_eq!(light.dirty(), LightDirty::INTENSITY | LightDirty::COLOR);
    }

    #[test]
    fn direction_is_normalized() {
        let light = DirectionalLight::new(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 1.0);
        assert_eq!(light.direction(), Vec3::new(0.0, -1.0, 0.0));
    }
}

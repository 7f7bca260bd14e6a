use glam::Vec3;

/// Lighting model used to shade a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Shading {
    /// Flat base color, unaffected by lights.
    #[default]
    Basic,
    /// Diffuse response to directional lights. Needs vertex normals.
    Lambert,
    /// Visualizes view-space normals. Needs vertex normals.
    Normal,
}

/// Decoded RGBA8 image data for a material texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureImage {
    /// 1x1 texture of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        }
    }
}

/// Surface appearance of a renderable.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    shading: Shading,
    color: Vec3,
    texture: Option<TextureImage>,
    /// Upload tier for the material uniforms.
    dirty: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Shading::Basic, Vec3::splat(0.8))
    }
}

impl Material {
    pub fn new(shading: Shading, color: Vec3) -> Self {
        Self {
            shading,
            color,
            texture: None,
            dirty: true,
        }
    }

    pub fn basic(color: Vec3) -> Self {
        Self::new(Shading::Basic, color)
    }

    pub fn lambert(color: Vec3) -> Self {
        Self::new(Shading::Lambert, color)
    }

    pub fn with_texture(mut self, texture: TextureImage) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn shading(&self) -> Shading {
        self.shading
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn texture(&self) -> Option<&TextureImage> {
        self.texture.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_color(&mut self, color: Vec3) -> &mut Self {
        self.color = color;
        self.dirty = true;
        self
    }

    pub fn mark_uploaded(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_color_flags_upload() {
        let mut m = Material::basic(Vec3::ONE);
        m.mark_uploaded();
        assert!(!m.is_dirty());
        m.set_color(Vec3::X);
        assert!(m.is_dirty());
        assert_eq!(m.color(), Vec3::X);
    }

    #[test]
    fn solid_texture_is_one_pixel() {
        let t = TextureImage::solid([255, 0, 0, 255]);
        assert_eq!(t.rgba.len(), 4);
    }
}

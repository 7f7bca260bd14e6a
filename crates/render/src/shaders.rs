//! GLSL ES 3.00 program sources, assembled per material and attribute set.

use lumen_ecs::{AttributeSet, Material, Shading};

pub const MODEL_MATRIX: &str = "modelMatrix";
pub const VIEW_MATRIX: &str = "viewMatrix";
pub const PROJECTION_MATRIX: &str = "projectionMatrix";
pub const MODEL_VIEW_MATRIX: &str = "modelViewMatrix";
pub const MODEL_VIEW_PROJECTION_MATRIX: &str = "modelViewProjectionMatrix";
pub const NORMAL_MATRIX: &str = "normalMatrix";
pub const LIGHT_DIRECTIONS: &str = "directionalLightDirections";
pub const LIGHT_COLORS: &str = "directionalLightColors";
pub const LIGHT_INTENSITIES: &str = "directionalLightIntensities";
pub const LIGHT_COUNT: &str = "directionalLightCount";
pub const MATERIAL_COLOR: &str = "materialColor";
pub const MAP: &str = "map";

/// Vertex attribute names, bound by the render cache through introspection.
pub const POSITION: &str = "position";
pub const UV: &str = "uv";
pub const NORMAL: &str = "normal";

/// Vertex and fragment source of one program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
    /// Shading actually used, after falling back for missing attributes.
    pub shading: Shading,
    pub textured: bool,
}

/// Shading model a material gets on a geometry with `attributes`.
///
/// Lambert and Normal need vertex normals and fall back to Basic without them.
pub fn effective_shading(material: &Material, attributes: AttributeSet) -> Shading {
    match material.shading() {
        Shading::Lambert | Shading::Normal if !attributes.contains(AttributeSet::NORMAL) => {
            Shading::Basic
        }
        shading => shading,
    }
}

/// Build the program for `material` drawn with `attributes`.
///
/// The light arrays are declared with `max_lights` slots (at least one).
pub fn program_source(
    material: &Material,
    attributes: AttributeSet,
    max_lights: usize,
) -> ProgramSource {
    let shading = effective_shading(material, attributes);
    if shading != material.shading() {
        tracing::debug!(
            requested = ?material.shading(),
            "geometry has no normals, falling back to basic shading"
        );
    }
    let textured = material.texture().is_some() && attributes.contains(AttributeSet::UV);
    let slots = max_lights.max(1);

    ProgramSource {
        vertex: vertex_source(shading, textured),
        fragment: fragment_source(shading, textured, slots),
        shading,
        textured,
    }
}

fn vertex_source(shading: Shading, textured: bool) -> String {
    let mut src = String::from("#version 300 es\n");
    src.push_str(&format!("in vec3 {POSITION};\n"));
    if textured {
        src.push_str(&format!("in vec2 {UV};\n"));
        src.push_str("out vec2 vUv;\n");
    }
    if shading != Shading::Basic {
        src.push_str(&format!("in vec3 {NORMAL};\n"));
        src.push_str("out vec3 vNormal;\n");
    }

    let (decls, body) = match shading {
        Shading::Basic => (
            format!(
                "uniform mat4 {MODEL_MATRIX};\nuniform mat4 {VIEW_MATRIX};\nuniform mat4 {PROJECTION_MATRIX};\n"
            ),
            format!(
                "    gl_Position = {PROJECTION_MATRIX} * {VIEW_MATRIX} * {MODEL_MATRIX} * vec4({POSITION}, 1.0);\n"
            ),
        ),
        Shading::Lambert => (
            format!(
                "uniform mat4 {MODEL_VIEW_PROJECTION_MATRIX};\nuniform mat4 {MODEL_MATRIX};\n"
            ),
            format!(
                "    vNormal = normalize(mat3({MODEL_MATRIX}) * {NORMAL});\n    gl_Position = {MODEL_VIEW_PROJECTION_MATRIX} * vec4({POSITION}, 1.0);\n"
            ),
        ),
        Shading::Normal => (
            format!(
                "uniform mat4 {MODEL_VIEW_MATRIX};\nuniform mat4 {PROJECTION_MATRIX};\nuniform mat3 {NORMAL_MATRIX};\n"
            ),
            format!(
                "    vNormal = normalize({NORMAL_MATRIX} * {NORMAL});\n    gl_Position = {PROJECTION_MATRIX} * {MODEL_VIEW_MATRIX} * vec4({POSITION}, 1.0);\n"
            ),
        ),
    };
    src.push_str(&decls);
    src.push_str("void main() {\n");
    src.push_str(&body);
    if textured {
        src.push_str(&format!("    vUv = {UV};\n"));
    }
    src.push_str("}\n");
    src
}

fn fragment_source(shading: Shading, textured: bool, slots: usize) -> String {
    let mut src = String::from("#version 300 es\nprecision highp float;\n");
    if shading != Shading::Basic {
        src.push_str("in vec3 vNormal;\n");
    }
    if textured {
        src.push_str("in vec2 vUv;\n");
        src.push_str(&format!("uniform sampler2D {MAP};\n"));
    }
    if shading != Shading::Normal {
        src.push_str(&format!("uniform vec3 {MATERIAL_COLOR};\n"));
    }
    if shading == Shading::Lambert {
        src.push_str(&format!("uniform vec3 {LIGHT_DIRECTIONS}[{slots}];\n"));
        src.push_str(&format!("uniform vec3 {LIGHT_COLORS}[{slots}];\n"));
        src.push_str(&format!("uniform float {LIGHT_INTENSITIES}[{slots}];\n"));
        src.push_str(&format!("uniform int {LIGHT_COUNT};\n"));
    }
    src.push_str("out vec4 fragColor;\nvoid main() {\n");

    match shading {
        Shading::Basic => {
            src.push_str(&format!("    vec3 base = {MATERIAL_COLOR};\n"));
        }
        Shading::Lambert => {
            src.push_str("    vec3 light = vec3(0.0);\n");
            src.push_str(&format!("    for (int i = 0; i < {slots}; i++) {{\n"));
            src.push_str(&format!("        if (i >= {LIGHT_COUNT}) break;\n"));
            src.push_str(&format!(
                "        float d = max(dot(vNormal, -{LIGHT_DIRECTIONS}[i]), 0.0);\n"
            ));
            src.push_str(&format!(
                "        light += {LIGHT_COLORS}[i] * {LIGHT_INTENSITIES}[i] * d;\n"
            ));
            src.push_str("    }\n");
            src.push_str(&format!("    vec3 base = {MATERIAL_COLOR} * light;\n"));
        }
        Shading::Normal => {
            src.push_str("    vec3 base = vNormal * 0.5 + 0.5;\n");
        }
    }
    if textured {
        src.push_str(&format!("    base *= texture({MAP}, vUv).rgb;\n"));
    }
    src.push_str("    fragColor = vec4(base, 1.0);\n}\n");
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_ecs::TextureImage;

    fn declares(src: &str, name: &str) -> bool {
        src.lines().filter(|l| l.starts_with("uniform")).any(|l| {
            let declared = l.trim_end_matches(';').split_whitespace().last();
            declared.is_some_and(|n| n.split('[').next() == Some(name))
        })
    }

    #[test]
    fn basic_uses_separate_matrices() {
        let src = program_source(&Material::default(), AttributeSet::POSITION, 4);
        assert_eq!(src.shading, Shading::Basic);
        for name in [MODEL_MATRIX, VIEW_MATRIX, PROJECTION_MATRIX] {
            assert!(declares(&src.vertex, name), "{name}");
        }
        assert!(declares(&src.fragment, MATERIAL_COLOR));
        assert!(!declares(&src.vertex, MODEL_VIEW_PROJECTION_MATRIX));
    }

    #[test]
    fn lambert_declares_light_arrays() {
        let attrs = AttributeSet::POSITION | AttributeSet::NORMAL;
        let src = program_source(&Material::lambert(Vec3::ONE), attrs, 3);
        assert_eq!(src.shading, Shading::Lambert);
        assert!(declares(&src.vertex, MODEL_VIEW_PROJECTION_MATRIX));
        assert!(src.fragment.contains("uniform vec3 directionalLightDirections[3];"));
        assert!(declares(&src.fragment, LIGHT_COUNT));
        assert!(src.vertex.contains("in vec3 normal;"));
    }

    #[test]
    fn lambert_without_normals_falls_back() {
        let src = program_source(&Material::lambert(Vec3::ONE), AttributeSet::POSITION, 4);
        assert_eq!(src.shading, Shading::Basic);
        assert!(!declares(&src.fragment, LIGHT_DIRECTIONS));
    }

    #[test]
    fn normal_shading_uses_normal_matrix() {
        let attrs = AttributeSet::POSITION | AttributeSet::NORMAL;
        let src = program_source(&Material::new(Shading::Normal, Vec3::ONE), attrs, 4);
        assert!(declares(&src.vertex, NORMAL_MATRIX));
        assert!(declares(&src.vertex, MODEL_VIEW_MATRIX));
        assert!(!declares(&src.fragment, MATERIAL_COLOR));
    }

    #[test]
    fn texture_needs_uvs() {
        let material = Material::default().with_texture(TextureImage::solid([255; 4]));
        let without = program_source(&material, AttributeSet::POSITION, 4);
        assert!(!without.textured);
        let with = program_source(&material, AttributeSet::POSITION | AttributeSet::UV, 4);
        assert!(with.textured);
        assert!(declares(&with.fragment, MAP));
        assert!(with.vertex.contains("in vec2 uv;"));
    }

    #[test]
    fn zero_lights_still_declares_one_slot() {
        let attrs = AttributeSet::POSITION | AttributeSet::NORMAL;
        let src = program_source(&Material::lambert(Vec3::ONE), attrs, 0);
        assert!(src.fragment.contains("[1];"));
    }

    #[test]
    fn every_stage_has_main() {
        let src = program_source(&Material::default(), AttributeSet::POSITION, 4);
        assert!(src.vertex.contains("void main"));
        assert!(src.fragment.contains("void main"));
    }
}

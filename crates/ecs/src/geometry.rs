use bitflags::bitflags;

bitflags! {
    /// Vertex attributes a geometry provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttributeSet: u8 {
        const POSITION = 1 << 0;
        const UV = 1 << 1;
        const NORMAL = 1 << 2;
    }
}

/// Vertex data as flat numeric sequences.
///
/// Positions and normals hold three floats per vertex, uvs two. Indices are
/// optional; without them vertices are drawn in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<f32>,
    pub uvs: Option<Vec<f32>>,
    pub normals: Option<Vec<f32>>,
    pub indices: Option<Vec<u16>>,
}

impl Geometry {
    pub fn new(positions: Vec<f32>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    pub fn with_uvs(mut self, uvs: Vec<f32>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_normals(mut self, normals: Vec<f32>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_indices(mut self, indices: Vec<u16>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Single triangle in the XY plane, positions only.
    pub fn triangle() -> Self {
        #[rustfmt::skip]
        let positions = vec![
            -0.5, -0.5, 0.0,
             0.5, -0.5, 0.0,
             0.0,  0.5, 0.0,
        ];
        Self::new(positions)
    }

    /// Unit quad in the XY plane facing +Z, with uvs, normals and indices.
    pub fn quad() -> Self {
        #[rustfmt::skip]
        let positions = vec![
            -0.5, -0.5, 0.0,
             0.5, -0.5, 0.0,
             0.5,  0.5, 0.0,
            -0.5,  0.5, 0.0,
        ];
        #[rustfmt::skip]
        let uvs = vec![
            0.0, 0.0,
            1.0, 0.0,
            1.0, 1.0,
            0.0, 1.0,
        ];
        let normals = [0.0, 0.0, 1.0].repeat(4);
        Self::new(positions)
            .with_uvs(uvs)
            .with_normals(normals)
            .with_indices(vec![0, 1, 2, 2, 3, 0])
    }

    /// Attributes present on this geometry. Empty attribute arrays count as absent.
    pub fn attributes(&self) -> AttributeSet {
        let mut set = AttributeSet::empty();
        if !self.positions.is_empty() {
            set |= AttributeSet::POSITION;
        }
        if self.uvs.as_ref().is_some_and(|v| !v.is_empty()) {
            set |= AttributeSet::UV;
        }
        if self.normals.as_ref().is_some_and(|v| !v.is_empty()) {
            set |= AttributeSet::NORMAL;
        }
        set
    }

    pub fn vertex_count(&self) -> u32 {
        (self.positions.len() / 3) as u32
    }

    pub fn index_count(&self) -> Option<u32> {
        self.indices.as_ref().map(|i| i.len() as u32)
    }
}

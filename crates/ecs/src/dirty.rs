use bitflags::bitflags;

bitflags! {
    /// Staleness of one derived matrix.
    ///
    /// `RECOMPUTE` is cleared by the update system that rebuilds the matrix.
    /// `UPLOAD` is cleared by the render layer once the matrix has been written
    /// to a GPU uniform. Mutators always set both.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MatrixState: u8 {
        const RECOMPUTE = 1 << 0;
        const UPLOAD = 1 << 1;
    }
}

/// Exhaustive view of a [`MatrixState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Clean,
    NeedsRecompute,
    NeedsUpload,
    Both,
}

impl MatrixState {
    /// State of a freshly created value: nothing computed, nothing uploaded.
    pub const STALE: Self = Self::all();

    pub fn staleness(self) -> Staleness {
        match (self.contains(Self::RECOMPUTE), self.contains(Self::UPLOAD)) {
            (false, false) => Staleness::Clean,
            (true, false) => Staleness::NeedsRecompute,
            (false, true) => Staleness::NeedsUpload,
            (true, true) => Staleness::Both,
        }
    }

    pub fn needs_recompute(self) -> bool {
        self.contains(Self::RECOMPUTE)
    }

    pub fn needs_upload(self) -> bool {
        self.contains(Self::UPLOAD)
    }
}

impl Default for MatrixState {
    fn default() -> Self {
        Self::STALE
    }
}

bitflags! {
    /// Upload-tier flags of a directional light, one per uniform field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LightDirty: u8 {
        const DIRECTION = 1 << 0;
        const COLOR = 1 << 1;
        const INTENSITY = 1 << 2;
    }
}

impl Default for LightDirty {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_covers_all_states() {
        assert_eq!(MatrixState::empty().staleness(), Staleness::Clean);
        assert_eq!(
            MatrixState::RECOMPUTE.staleness(),
            Staleness::NeedsRecompute
        );
        assert_eq!(MatrixState::UPLOAD.staleness(), Staleness::NeedsUpload);
        assert_eq!(MatrixState::STALE.staleness(), Staleness::Both);
    }

    #[test]
    fn clearing_one_tier_keeps_the_other() {
        let mut state = MatrixState::default();
        state.remove(MatrixState::RECOMPUTE);
        assert!(!state.needs_recompute());
        assert!(state.needs_upload());
    }
}

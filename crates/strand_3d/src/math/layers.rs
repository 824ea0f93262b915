/// Layer membership bitmask for rendering and raycasting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layers {
    pub mask: u32,
}

impl Default for Layers {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Layers {
    /// Default layer (0)
    pub const DEFAULT: Layers = Layers { mask: 1 };
    /// All layers
    pub const ALL: Layers = Layers { mask: u32::MAX };

    /// Membership in exactly one channel
    pub fn set(&mut self, channel: u8) {
        self.mask = 1u32.checked_shl(channel as u32).unwrap_or(0);
    }

    pub fn enable(&mut self, channel: u8) {
        self.mask |= 1u32.checked_shl(channel as u32).unwrap_or(0);
    }

    pub fn disable(&mut self, channel: u8) {
        self.mask &= !1u32.checked_shl(channel as u32).unwrap_or(0);
    }

    /// Whether the two sets share a channel
    pub fn test(&self, other: Layers) -> bool {
        (self.mask & other.mask) != 0
    }
}

//! RGB colour

use crate::error::{EngineError, Result};

/// RGB colour with components in `0.0..=1.0`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

const NAMED: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x008000),
    ("lime", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("magenta", 0xff00ff),
    ("orange", 0xffa500),
    ("purple", 0x800080),
    ("hotpink", 0xff69b4),
    ("gray", 0x808080),
    ("grey", 0x808080),
];

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Create from a `0xRRGGBB` integer
    pub fn from_hex(hex: u32) -> Self {
        Self::rgb(
            ((hex >> 16) & 0xff) as f32 / 255.0,
            ((hex >> 8) & 0xff) as f32 / 255.0,
            (hex & 0xff) as f32 / 255.0,
        )
    }

    pub fn to_hex(&self) -> u32 {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    /// Parse `#rrggbb`, `#rgb` or a colour name
    pub fn parse(style: &str) -> Result<Self> {
        let style = style.trim();
        if let Some(hex) = style.strip_prefix('#') {
            let expanded: String = match hex.len() {
                3 => hex.chars().flat_map(|c| [c, c]).collect(),
                6 => hex.to_string(),
                _ => return Err(EngineError::UnknownColor(style.to_string())),
            };
            return u32::from_str_radix(&expanded, 16)
                .map(Self::from_hex)
                .map_err(|_| EngineError::UnknownColor(style.to_string()));
        }
        let lower = style.to_ascii_lowercase();
        NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, hex)| Self::from_hex(*hex))
            .ok_or_else(|| EngineError::UnknownColor(style.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(Color::parse("#ff0000").unwrap(), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(Color::parse("#0f0").unwrap().to_hex(), 0x00ff00);
        assert_eq!(Color::parse("HotPink").unwrap().to_hex(), 0xff69b4);
        assert!(Color::parse("not-a-colour").is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        assert_eq!(Color::from_hex(0x336699).to_hex(), 0x336699);
    }
}

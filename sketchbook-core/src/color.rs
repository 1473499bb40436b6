/// A straight-alpha color packed as `0xAARRGGBB`, the layout it takes on disk.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Argb(pub u32);
impl Argb {
    pub const BLACK: Self = Self(0xFF00_0000);
    pub const WHITE: Self = Self(0xFFFF_FFFF);

    #[must_use]
    pub const fn from_channels(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }
    #[must_use]
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
    /// Unpack into `[r, g, b, a]` byte order, as used by [`image::Rgba`].
    #[must_use]
    pub const fn to_rgba8(self) -> [u8; 4] {
        let [a, r, g, b] = self.0.to_be_bytes();
        [r, g, b, a]
    }
}
impl Default for Argb {
    fn default() -> Self {
        Self::BLACK
    }
}
impl std::fmt::Debug for Argb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Argb({:#010X})", self.0)
    }
}
impl std::fmt::Display for Argb {
    /// Writes as `#AARRGGBB`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("expected `#RRGGBB` or `#AARRGGBB`")]
    BadLength,
    #[error(transparent)]
    Digits(#[from] std::num::ParseIntError),
}

impl std::str::FromStr for Argb {
    type Err = ColorParseError;
    /// Parses `#RRGGBB` (opaque) or `#AARRGGBB`. The leading `#` is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix('#').unwrap_or(s);
        // Non-ascii would make the length checks lie.
        if !digits.is_ascii() {
            return Err(ColorParseError::BadLength);
        }
        match digits.len() {
            6 => Ok(Self(0xFF00_0000 | u32::from_str_radix(digits, 16)?)),
            8 => Ok(Self(u32::from_str_radix(digits, 16)?)),
            _ => Err(ColorParseError::BadLength),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Argb;
    #[test]
    fn parse() {
        assert_eq!("#000000".parse(), Ok(Argb::BLACK));
        assert_eq!("80FF0000".parse(), Ok(Argb(0x80FF_0000)));
        assert!("#FFF".parse::<Argb>().is_err());
        assert!("#GG0000".parse::<Argb>().is_err());
    }
    #[test]
    fn channels() {
        let c = Argb::from_channels(0x80, 1, 2, 3);
        assert_eq!(c.alpha(), 0x80);
        assert_eq!(c.to_rgba8(), [1, 2, 3, 0x80]);
        assert_eq!(c.to_string(), "#80010203");
        assert_eq!(Argb::WHITE.to_rgba8(), [0xFF; 4]);
    }
}

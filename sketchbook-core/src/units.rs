//! Physical units, and the conversions between device units and pixels.

pub const MM_PER_IN: f32 = 25.4;
pub const IN_PER_MM: f32 = 1.0 / MM_PER_IN;
/// Digitizers report positions in HIMETRIC, hundredths of a millimeter.
pub const HIMETRIC_PER_IN: f32 = 2540.0;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UnitParseError {
    #[error(transparent)]
    Value(#[from] std::num::ParseFloatError),
    #[error("unknown unit")]
    UnrecognizedUnit,
}

/// A physical length, so that pen widths can be given independent of screen density.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Length {
    /// Logical pixels. These are [`Resolution`] dependent.
    Logical(f32),
    Inch(f32),
    Millimeter(f32),
    /// Hundredths of a millimeter, the native unit of stylus packets.
    Himetric(f32),
}
impl Length {
    #[must_use]
    pub fn value(self) -> f32 {
        match self {
            Self::Logical(x) | Self::Inch(x) | Self::Millimeter(x) | Self::Himetric(x) => x,
        }
    }
    #[must_use]
    pub fn value_mut(&mut self) -> &mut f32 {
        match self {
            Self::Logical(x) | Self::Inch(x) | Self::Millimeter(x) | Self::Himetric(x) => x,
        }
    }
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Self::Logical(_) => "px",
            Self::Inch(_) => "in",
            Self::Millimeter(_) => "mm",
            Self::Himetric(_) => "hm",
        }
    }
    /// Convert into logical pixels, under the given resolution.
    #[must_use]
    pub fn into_logical(self, resolution: Resolution) -> f32 {
        match self {
            Self::Logical(l) => l,
            Self::Inch(i) => resolution.into_dpi() * i,
            Self::Millimeter(mm) => resolution.into_dpi() * (mm * IN_PER_MM),
            Self::Himetric(hm) => resolution.into_dpi() * hm / HIMETRIC_PER_IN,
        }
    }
}
impl std::fmt::Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value(), self.unit())
    }
}
impl std::str::FromStr for Length {
    type Err = UnitParseError;
    fn from_str(mut s: &str) -> Result<Self, Self::Err> {
        s = s.trim_ascii_end();
        // Every unit suffix is two ascii chars.
        if s.len() < 2 || !s.is_char_boundary(s.len() - 2) {
            return Err(UnitParseError::UnrecognizedUnit);
        }
        let (value, unit) = s.split_at(s.len() - 2);

        let mut parsed = match unit {
            "px" => Self::Logical(0.0),
            "in" => Self::Inch(0.0),
            "mm" => Self::Millimeter(0.0),
            "hm" => Self::Himetric(0.0),
            _ => return Err(UnitParseError::UnrecognizedUnit),
        };
        *parsed.value_mut() = value.trim_ascii().parse()?;
        Ok(parsed)
    }
}

/// Defines the relationship between logical pixels and physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolution {
    /// Dots (logical pixels) per inch
    Dpi(f32),
}
impl Resolution {
    #[must_use]
    pub fn into_dpi(self) -> f32 {
        let Resolution::Dpi(i) = self;
        i
    }
}
impl Default for Resolution {
    /// The classic desktop density.
    fn default() -> Self {
        Self::Dpi(96.0)
    }
}

/// Per-axis resolution of the surface that device samples are mapped onto.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SurfaceResolution {
    pub x: Resolution,
    pub y: Resolution,
}
impl SurfaceResolution {
    /// Map a raw digitizer sample into logical pixels.
    #[must_use]
    pub fn himetric_to_logical(&self, [x, y]: [i32; 2]) -> [f32; 2] {
        // Precision loss is irrelevant at digitizer ranges.
        #[allow(clippy::cast_precision_loss)]
        [
            Length::Himetric(x as f32).into_logical(self.x),
            Length::Himetric(y as f32).into_logical(self.y),
        ]
    }
}

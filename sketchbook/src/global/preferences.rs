use std::path::{Path, PathBuf};

use sketchbook_core::{
    color::Argb,
    stroke::{PenStyle, Smoothing},
    units::{Length, Resolution, SurfaceResolution},
};

const DOCUMENTATION: &str = r##"# Sketchbook preferences. You may edit this file, but be aware that formatting and comments will
# not be preserved, and all keys and values are case sensitive.

# book       - Path of the book to open. Defaults to "default.book" in the user data directory.
# log_level  - One of "off", "error", "warn", "info", "debug", "trace".
# stylus     - Set false to ignore the digitizer and draw with the mouse alone.
# dpi        - Display resolution [x, y], used to map digitizer samples onto the screen.
# viewport   - Size of the drawing surface [width, height] in pixels.
#
# [pen]
# color      - "#RRGGBB" or "#AARRGGBB".
# width      - A number with a unit: px, in, mm, or hm (HIMETRIC). e.g. "1px", "0.3mm".
# smoothing  - "antialias" or "none".

"##;

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PenPreferences {
    pub color: String,
    pub width: String,
    pub smoothing: String,
}
impl Default for PenPreferences {
    fn default() -> Self {
        let pen = PenStyle::default();
        Self {
            color: pen.color.to_string(),
            width: Length::Logical(pen.width).to_string(),
            smoothing: pen.smoothing.to_string(),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Preferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<PathBuf>,
    pub log_level: String,
    pub stylus: bool,
    pub dpi: [f32; 2],
    pub viewport: [u32; 2],
    pub pen: PenPreferences,
}
impl Default for Preferences {
    fn default() -> Self {
        Self {
            book: None,
            log_level: "debug".to_owned(),
            stylus: true,
            dpi: [96.0; 2],
            viewport: [800, 600],
            pen: PenPreferences::default(),
        }
    }
}

/// How the preferences came to be.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Origin {
    Loaded,
    /// Nothing on disk, or nowhere to look.
    Defaulted,
    /// The file exists but couldn't be used. It is never overwritten.
    FailedToLoad,
}

impl Preferences {
    const FILENAME: &'static str = "preferences.toml";
    /// Shared global preferences, loaded from the user's preference directory.
    /// (Or defaulted, if unavailable for some reason)
    #[must_use]
    pub fn get() -> &'static (Self, Origin) {
        static GLOBAL_PREFERENCES: std::sync::OnceLock<(Preferences, Origin)> =
            std::sync::OnceLock::new();

        GLOBAL_PREFERENCES.get_or_init(|| match super::preferences_dir() {
            None => {
                log::warn!("No preferences dir found, defaulting.");
                (Self::default(), Origin::Defaulted)
            }
            Some(mut dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(&dir)
            }
        })
    }
    #[must_use]
    pub fn load_or_default(path: &Path) -> (Self, Origin) {
        let string = match std::fs::read_to_string(path) {
            Ok(string) => string,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No preferences at {path:?}, defaulting.");
                return (Self::default(), Origin::Defaulted);
            }
            Err(err) => {
                log::warn!("Failed to read preferences {path:?}, defaulting:\n{err}");
                return (Self::default(), Origin::FailedToLoad);
            }
        };
        match toml::from_str(&string) {
            Ok(preferences) => (preferences, Origin::Loaded),
            Err(err) => {
                log::warn!("Failed to parse preferences {path:?}, defaulting:\n{err}");
                (Self::default(), Origin::FailedToLoad)
            }
        }
    }
    /// Write into the preferences dir, unless a file there failed to load.
    pub fn save(&self, origin: Origin) -> anyhow::Result<()> {
        if origin == Origin::FailedToLoad {
            anyhow::bail!("Refusing to overwrite preferences that failed to load");
        }
        let mut preferences =
            super::preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        self.save_to(&preferences)
    }
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(self)?;
        std::fs::write(path, string)?;
        Ok(())
    }
    /// The book to open when none is given on the command line.
    #[must_use]
    pub fn book_path(&self) -> Option<PathBuf> {
        self.book.clone().or_else(|| {
            let mut path = dirs::data_dir()?;
            path.push(env!("CARGO_PKG_NAME"));
            path.push("default.book");
            Some(path)
        })
    }
    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level {:?}", self.log_level);
            log::LevelFilter::Debug
        })
    }
    #[must_use]
    pub fn resolution(&self) -> SurfaceResolution {
        let [x, y] = self.dpi;
        SurfaceResolution {
            x: Resolution::Dpi(x),
            y: Resolution::Dpi(y),
        }
    }
    /// The pen described by the preferences. Unparsable fields fall back to their defaults.
    #[must_use]
    pub fn pen_style(&self) -> PenStyle {
        let default = PenStyle::default();
        let color = self.pen.color.parse::<Argb>().unwrap_or_else(|err| {
            log::warn!("Bad pen color {:?}: {err}", self.pen.color);
            default.color
        });
        let width = self
            .pen
            .width
            .parse::<Length>()
            .map_err(|err| err.to_string())
            .map(|width| width.into_logical(self.resolution().x))
            .and_then(|width| {
                if width.is_finite() && width > 0.0 {
                    Ok(width)
                } else {
                    Err("must be a positive, finite length".to_owned())
                }
            })
            .unwrap_or_else(|err| {
                log::warn!("Bad pen width {:?}: {err}", self.pen.width);
                default.width
            });
        let smoothing = self.pen.smoothing.parse::<Smoothing>().unwrap_or_else(|err| {
            log::warn!("Bad pen smoothing {:?}: {err}", self.pen.smoothing);
            default.smoothing
        });
        PenStyle {
            color,
            width,
            smoothing,
        }
    }
}

use std::sync::Arc;

use image::RgbaImage;

use super::Boundary;
use crate::{raster, Stroke};

/// How many undone strokes are remembered. Past this, the oldest undo is forgotten.
pub const REDO_LIMIT: usize = 1024;

/// One drawing surface. Strokes are shared immutably, so snapshots of a page are cheap.
#[derive(Default)]
pub struct Page {
    strokes: Vec<Arc<Stroke>>,
    /// Most recently undone at the back.
    redo_history: Vec<Arc<Stroke>>,
    /// Derived from `strokes`, never persisted. Its size only ever grows.
    cache: Option<RgbaImage>,
}
impl Clone for Page {
    /// Clones the strokes and history. The raster cache is *not* cloned - the copy will redraw
    /// on first render, if it ever gets rendered at all.
    fn clone(&self) -> Self {
        Self {
            strokes: self.strokes.clone(),
            redo_history: self.redo_history.clone(),
            cache: None,
        }
    }
}
impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("strokes", &self.strokes.len())
            .field("redo_history", &self.redo_history.len())
            .field("cache", &self.cache.as_ref().map(RgbaImage::dimensions))
            .finish()
    }
}

/// A rendered page, placed within a viewport.
pub struct PageView<'a> {
    pub image: &'a RgbaImage,
    /// Where the top-left of `image` lands in the viewport. Negative when the cache is
    /// larger than the viewport.
    pub offset: [i32; 2],
}

impl Page {
    /// Reconstruct a page from decoded parts.
    #[must_use]
    pub fn from_parts(strokes: Vec<Arc<Stroke>>, redo_history: Vec<Arc<Stroke>>) -> Self {
        Self {
            strokes,
            redo_history,
            cache: None,
        }
    }
    #[must_use]
    pub fn strokes(&self) -> &[Arc<Stroke>] {
        &self.strokes
    }
    /// Undone strokes, the next one to be redone last.
    #[must_use]
    pub fn redo_history(&self) -> &[Arc<Stroke>] {
        &self.redo_history
    }
    #[must_use]
    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }
    #[must_use]
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }
    /// Commit a new stroke. Forgets everything that could have been redone.
    pub fn add_stroke(&mut self, stroke: impl Into<Arc<Stroke>>) {
        self.redo_history.clear();
        self.push_stroke(stroke.into());
    }
    fn push_stroke(&mut self, stroke: Arc<Stroke>) {
        if let Some(cache) = self.cache.as_mut() {
            raster::draw_stroke(cache, center_of(cache), &stroke);
        }
        self.strokes.push(stroke);
    }
    pub fn undo(&mut self) -> Result<(), Boundary> {
        let stroke = self.strokes.pop().ok_or(Boundary::NothingToUndo)?;
        if self.redo_history.len() >= REDO_LIMIT {
            self.redo_history.remove(0);
        }
        self.redo_history.push(stroke);
        // Can't un-draw from a raster. Throw it away, next render redraws fully.
        self.cache = None;
        Ok(())
    }
    pub fn redo(&mut self) -> Result<(), Boundary> {
        let stroke = self.redo_history.pop().ok_or(Boundary::NothingToRedo)?;
        self.push_stroke(stroke);
        Ok(())
    }
    /// Render into a viewport of the given size, returning the cache and where to place it.
    ///
    /// Dimensions are rounded up to even so that the page center lands on a pixel boundary.
    pub fn render_into(&mut self, width: u32, height: u32) -> PageView<'_> {
        let width = width.saturating_add(width % 2);
        let height = height.saturating_add(height % 2);

        let cache = match self.cache.take() {
            Some(cache) if cache.width() >= width && cache.height() >= height => cache,
            old => {
                let (old_width, old_height) = old.as_ref().map_or((0, 0), RgbaImage::dimensions);
                drop(old);
                let mut cache = RgbaImage::new(old_width.max(width), old_height.max(height));
                log::trace!("page cache redraw at {:?}", cache.dimensions());
                raster::clear(&mut cache);
                let origin = center_of(&cache);
                for stroke in &self.strokes {
                    raster::draw_stroke(&mut cache, origin, stroke);
                }
                cache
            }
        };
        let image = self.cache.insert(cache);

        let offset = |viewport: u32, cache: u32| -> i32 {
            let delta = i64::from(viewport) - i64::from(cache);
            // Far within range for any image that could actually be allocated.
            i32::try_from(delta / 2).unwrap_or(i32::MIN)
        };
        PageView {
            offset: [
                offset(width, image.width()),
                offset(height, image.height()),
            ],
            image,
        }
    }
}

fn center_of(image: &RgbaImage) -> [f32; 2] {
    let (w, h) = image.dimensions();
    #[allow(clippy::cast_precision_loss)]
    [w as f32 / 2.0, h as f32 / 2.0]
}

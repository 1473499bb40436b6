//! The interactive loop. Owns the book, consumes strokes from the mux once per frame, and
//! decides how and when to save.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use sketchbook_core::{
    alert::{Alert, AlertKind},
    mux::{FusedStroke, InputMux, MouseButtons},
    raster,
    save::SaveCoordinator,
    stroke::{PenStyle, Point},
    Book, Boundary, Stroke,
};

/// Secondary strokes starting this close to the left or right edge turn the page.
pub const EDGE_MARGIN: f32 = 20.0;

#[derive(
    serde::Deserialize, Copy, Clone, PartialEq, Eq, Hash, Debug, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Undo,
    Redo,
    NextPage,
    PreviousPage,
}

#[derive(Clone, PartialEq, Debug)]
pub enum ShellEvent {
    /// There is new input in the mux.
    Invalidate,
    Action(Action),
    Resize { width: u32, height: u32 },
    Quit,
}

/// Rings the terminal bell.
#[derive(Copy, Clone, Default, Debug)]
pub struct TerminalBell;
impl Alert for TerminalBell {
    fn alert(&self, kind: AlertKind) {
        log::info!("alert: {kind}");
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

pub struct Shell {
    book: Book,
    mux: Arc<InputMux>,
    saves: SaveCoordinator<Book>,
    alert: Arc<dyn Alert>,
    pen: PenStyle,
    viewport: [u32; 2],
    /// The composited page plus in-progress stroke, as last drawn.
    frame: RgbaImage,
    frames: u64,
    quit: bool,
}

impl Shell {
    #[must_use]
    pub fn new(
        book: Book,
        mux: Arc<InputMux>,
        alert: Arc<dyn Alert>,
        pen: PenStyle,
        viewport: [u32; 2],
    ) -> Self {
        Self {
            book,
            mux,
            saves: SaveCoordinator::new(),
            alert,
            pen,
            viewport,
            frame: RgbaImage::new(viewport[0], viewport[1]),
            frames: 0,
            quit: false,
        }
    }
    #[must_use]
    pub fn book(&self) -> &Book {
        &self.book
    }
    #[must_use]
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }
    #[must_use]
    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }
    /// Handle events until told to quit or every sender hangs up, then wait for saves.
    pub fn run(&mut self, events: &crossbeam::channel::Receiver<ShellEvent>) {
        while !self.quit {
            let Ok(first) = events.recv() else {
                break;
            };
            // Many invalidations may be queued up. Take everything available and draw once.
            let mut dirty = false;
            for event in std::iter::once(first).chain(events.try_iter()) {
                match event {
                    ShellEvent::Invalidate => dirty = true,
                    other => {
                        // Input before this event must be seen before it is acted upon.
                        if std::mem::take(&mut dirty) {
                            self.redraw();
                        }
                        self.handle(other);
                        dirty = true;
                    }
                }
                if self.quit {
                    break;
                }
            }
            if dirty {
                self.redraw();
            }
        }
        self.shutdown();
    }
    pub fn handle(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Invalidate => self.redraw(),
            ShellEvent::Action(action) => self.act(action),
            ShellEvent::Resize { width, height } => {
                log::debug!("viewport resized to {width}x{height}");
                self.viewport = [width, height];
            }
            ShellEvent::Quit => self.quit = true,
        }
    }
    pub fn act(&mut self, action: Action) {
        log::trace!("action {action}");
        let result = match action {
            Action::Undo | Action::Redo => {
                let Some(page) = self.book.open_page_mut() else {
                    self.alert.alert(AlertKind::NoOpenPage);
                    return;
                };
                let result = if action == Action::Undo {
                    page.undo()
                } else {
                    page.redo()
                };
                if result.is_ok() {
                    self.blocking_save();
                }
                result
            }
            Action::NextPage => {
                self.book.next_page();
                Ok(())
            }
            Action::PreviousPage => self.book.previous_page().map(|_| ()),
        };
        self.boundary(result);
    }
    fn boundary(&self, result: Result<(), Boundary>) {
        if let Err(boundary) = result {
            log::debug!("{boundary}");
            self.alert.alert(AlertKind::Boundary);
        }
    }
    /// Save and wait for it, including any background save still in flight.
    fn blocking_save(&mut self) {
        self.saves.wait_idle();
        self.saves.apply_reports(&mut self.book);
        if let Err(err) = self.book.save_to_disk() {
            log::error!("failed to save {:?}: {err}", self.book.path());
        }
    }
    fn background_save(&self) {
        if let Err(err) = self.saves.background_save(self.book.snapshot()) {
            log::error!("could not save in the background: {err}");
        }
    }
    /// Where page coordinates `[0, 0]` land in the viewport.
    fn origin(&self) -> [f32; 2] {
        // Matches the even rounding of the page cache.
        #[allow(clippy::cast_precision_loss)]
        let origin = self.viewport.map(|len| (len + len % 2) as f32 / 2.0);
        origin
    }
    /// Commit or act on every completed stroke, returning the one still being drawn, if any.
    fn consume_strokes(&mut self) -> Option<FusedStroke> {
        loop {
            let stroke = self.mux.next_stroke()?;
            if !stroke.completed {
                return Some(stroke);
            }
            self.mux.remove_stroke();
            if stroke.buttons.contains(MouseButtons::LEFT) {
                self.commit(&stroke);
            } else if stroke.buttons.contains(MouseButtons::RIGHT) {
                self.secondary(&stroke);
            } else {
                log::debug!("ignoring {:?} stroke", stroke.buttons);
            }
        }
    }
    fn to_page(&self, points: &[Point]) -> Vec<Point> {
        let [x, y] = self.origin();
        points.iter().map(|point| point.offset([-x, -y])).collect()
    }
    fn commit(&mut self, stroke: &FusedStroke) {
        let stroke = Stroke::new(self.pen, self.to_page(&stroke.points));
        let Some(page) = self.book.open_page_mut() else {
            self.alert.alert(AlertKind::NoOpenPage);
            return;
        };
        page.add_stroke(stroke);
        self.background_save();
    }
    /// Secondary strokes are gestures, never drawn.
    fn secondary(&mut self, stroke: &FusedStroke) {
        let Some(&start) = stroke.points.first() else {
            return;
        };
        #[allow(clippy::cast_precision_loss)]
        let width = self.viewport[0] as f32;
        if start.x < EDGE_MARGIN {
            let result = self.book.previous_page().map(|_| ());
            self.boundary(result);
        } else if start.x > width - EDGE_MARGIN {
            if start.y < EDGE_MARGIN {
                log::info!("quit from the corner");
                self.quit = true;
            } else {
                self.book.next_page();
            }
        }
    }
    /// Consume input and recomposite the frame.
    pub fn redraw(&mut self) {
        self.saves.apply_reports(&mut self.book);
        let pending = self.consume_strokes();

        let [width, height] = self.viewport;
        if self.frame.dimensions() != (width, height) {
            self.frame = RgbaImage::new(width, height);
        }
        raster::clear(&mut self.frame);
        if let Some(page) = self.book.open_page_mut() {
            let view = page.render_into(width, height);
            image::imageops::replace(
                &mut self.frame,
                view.image,
                i64::from(view.offset[0]),
                i64::from(view.offset[1]),
            );
        }
        if let Some(pending) = pending.filter(|stroke| stroke.buttons.contains(MouseButtons::LEFT))
        {
            let overlay = Stroke::new(self.pen, self.to_page(&pending.points));
            let origin = self.origin();
            raster::draw_stroke(&mut self.frame, origin, &overlay);
        }

        self.frames += 1;
        self.log_stats();
    }
    fn log_stats(&self) {
        #[allow(clippy::cast_precision_loss)]
        let size = self.book.size_in_bytes() as f64;
        log::debug!(
            "Book pages: {} size: {}",
            self.book.page_count(),
            human_bytes::human_bytes(size)
        );
        if let Some(page) = self.book.open_page() {
            log::debug!("Page strokes: {}", page.stroke_count());
        }
    }
    /// Wait for outstanding saves to land.
    pub fn shutdown(&mut self) {
        if self.saves.is_saving() {
            log::info!("waiting for saves to finish");
        }
        self.saves.wait_idle();
        self.saves.apply_reports(&mut self.book);
    }
    /// Write the open page, as it would appear in the viewport, to a PNG.
    pub fn export_png(&mut self, path: &Path) -> anyhow::Result<()> {
        let [width, height] = self.viewport;
        let mut image = RgbaImage::new(width, height);
        raster::clear(&mut image);
        let page = self
            .book
            .open_page_mut()
            .ok_or_else(|| anyhow::anyhow!("no open page to export"))?;
        let view = page.render_into(width, height);
        image::imageops::replace(
            &mut image,
            view.image,
            i64::from(view.offset[0]),
            i64::from(view.offset[1]),
        );
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

//! # Input mux
//!
//! A pen on a tablet is reported twice: once through the digitizer with high precision, and
//! once more as an emulated mouse. Each source fills its own queue of strokes, and the consumer
//! sees one fused stream with the mouse's button semantics and the digitizer's points.
//!
//! The two queues are matched up by position alone. When the heads of the queues don't start in
//! the same place, the head of the longer queue is assumed to be a stroke the other source never
//! saw, and is thrown away. This is a heuristic and can pick wrong, e.g. if the mouse stroke
//! was lost but the stylus stroke is still being drawn - the user is alerted each time.

pub mod mouse;
pub mod stylus;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    alert::{Alert, AlertKind},
    stroke::Point,
    units::SurfaceResolution,
};

/// Strokes from each source whose first points are farther apart than this are not the
/// same stroke. Logical pixels.
pub const DESYNC_TOLERANCE: f32 = 2.0;

bitflags::bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(transparent)]
    pub struct MouseButtons : u8 {
        /// Draws. Also the stylus tip.
        const LEFT   = 0b0000_0001;
        /// Navigates. Also the stylus barrel button.
        const RIGHT  = 0b0000_0010;
        const MIDDLE = 0b0000_0100;
    }
}

/// Identifies which producer owns a queued stroke.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct Ticket(u64);

/// A stroke owned by one producer. Only ever grows while not `completed`.
#[derive(Debug)]
struct PendingStroke {
    ticket: Ticket,
    buttons: MouseButtons,
    points: Vec<Point>,
    completed: bool,
}

/// The consumer's view of the oldest stroke not yet removed.
#[derive(Clone, PartialEq, Debug)]
pub struct FusedStroke {
    pub buttons: MouseButtons,
    /// Logical pixels in the coordinate space of the input surface.
    pub points: Vec<Point>,
    /// When `true`, no more points will be added and the stroke can be removed.
    pub completed: bool,
}

struct Inner {
    mouse_strokes: VecDeque<PendingStroke>,
    stylus_strokes: VecDeque<PendingStroke>,
    mouse: mouse::MouseState,
    stylus: stylus::StylusState,
    next_ticket: u64,
    stylus_enabled: bool,
    resolution: SurfaceResolution,
}
impl Inner {
    fn ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }
}

/// The producer's stroke, if the consumer hasn't already taken it away.
fn owned_stroke(
    queue: &mut VecDeque<PendingStroke>,
    ticket: Ticket,
) -> Option<&mut PendingStroke> {
    // A producer only ever has its newest stroke pending.
    queue.back_mut().filter(|stroke| stroke.ticket == ticket)
}

pub struct InputMux {
    inner: Mutex<Inner>,
    alert: Arc<dyn Alert>,
}
impl InputMux {
    #[must_use]
    pub fn new(alert: Arc<dyn Alert>, resolution: SurfaceResolution) -> Self {
        Self {
            inner: Mutex::new(Inner {
                mouse_strokes: VecDeque::new(),
                stylus_strokes: VecDeque::new(),
                mouse: mouse::MouseState::default(),
                stylus: stylus::StylusState::default(),
                next_ticket: 0,
                stylus_enabled: true,
                resolution,
            }),
            alert,
        }
    }
    pub fn set_resolution(&self, resolution: SurfaceResolution) {
        self.inner.lock().resolution = resolution;
    }
    /// With the stylus disabled, digitizer events are ignored and mouse strokes are reported
    /// complete on their own.
    pub fn set_stylus_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.stylus_enabled == enabled {
            return;
        }
        log::debug!("stylus input {}", if enabled { "enabled" } else { "disabled" });
        inner.stylus_enabled = enabled;
        if !enabled {
            inner.stylus_strokes.clear();
            inner.stylus.reset();
        }
    }
    #[must_use]
    pub fn is_stylus_enabled(&self) -> bool {
        self.inner.lock().stylus_enabled
    }
    /// Lengths of the mouse and stylus queues.
    #[must_use]
    pub fn queue_lengths(&self) -> [usize; 2] {
        let inner = self.inner.lock();
        [inner.mouse_strokes.len(), inner.stylus_strokes.len()]
    }
    /// Peek the oldest stroke, dropping desynchronized strokes as needed.
    pub fn next_stroke(&self) -> Option<FusedStroke> {
        let mut inner = self.inner.lock();
        if !inner.stylus_enabled {
            return inner.mouse_strokes.front().map(|mouse| FusedStroke {
                buttons: mouse.buttons,
                points: mouse.points.clone(),
                completed: mouse.completed,
            });
        }
        loop {
            let desync = match (inner.mouse_strokes.front(), inner.stylus_strokes.front()) {
                (None, None) => return None,
                (Some(one), None) | (None, Some(one)) => {
                    // Only one side has seen it so far. Can't be done until both have.
                    return Some(FusedStroke {
                        buttons: one.buttons,
                        points: one.points.clone(),
                        completed: false,
                    });
                }
                (Some(mouse), Some(stylus)) => match (mouse.points.first(), stylus.points.first()) {
                    (Some(&m), Some(&s)) => m.dist2(s) > DESYNC_TOLERANCE * DESYNC_TOLERANCE,
                    // Nothing to compare yet.
                    _ => false,
                },
            };
            if desync {
                let inner = &mut *inner;
                let dropped = if inner.mouse_strokes.len() > inner.stylus_strokes.len() {
                    inner.mouse_strokes.pop_front();
                    "mouse"
                } else {
                    inner.stylus_strokes.pop_front();
                    "stylus"
                };
                log::warn!("mouse and stylus strokes disagree, dropped the {dropped} stroke");
                self.alert.alert(AlertKind::InputDesync);
                continue;
            }
            let (Some(mouse), Some(stylus)) =
                (inner.mouse_strokes.front(), inner.stylus_strokes.front())
            else {
                unreachable!("both heads checked present above")
            };
            let points = if stylus.points.is_empty() {
                &mouse.points
            } else {
                &stylus.points
            };
            return Some(FusedStroke {
                buttons: mouse.buttons,
                points: points.clone(),
                completed: mouse.completed && stylus.completed,
            });
        }
    }
    /// Discard the stroke last returned by [`Self::next_stroke`].
    ///
    /// # Panics
    /// If there is no such stroke.
    pub fn remove_stroke(&self) {
        let mut inner = self.inner.lock();
        let mouse = inner.mouse_strokes.pop_front();
        assert!(mouse.is_some(), "removed a stroke with no mouse stroke queued");
        if inner.stylus_enabled {
            let stylus = inner.stylus_strokes.pop_front();
            assert!(stylus.is_some(), "removed a stroke with no stylus stroke queued");
        }
    }
}

//! The mouse side of the mux. Positions are logical pixels.

use super::{owned_stroke, InputMux, MouseButtons, PendingStroke, Ticket};
use crate::stroke::Point;

#[derive(Default, Debug)]
pub(super) struct MouseState {
    pending: Option<Ticket>,
    /// The stroke lasts until all of these are released.
    held: MouseButtons,
}

impl InputMux {
    /// Starts a stroke, or if one is already underway, adds `button` to the set holding it open.
    pub fn mouse_down(&self, button: MouseButtons, position: Point) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        match inner.mouse.pending {
            None => {
                let ticket = inner.ticket();
                inner.mouse.pending = Some(ticket);
                inner.mouse.held = button;
                inner.mouse_strokes.push_back(PendingStroke {
                    ticket,
                    buttons: button,
                    points: vec![position],
                    completed: false,
                });
            }
            Some(ticket) => {
                inner.mouse.held |= button;
                if let Some(stroke) = owned_stroke(&mut inner.mouse_strokes, ticket) {
                    stroke.points.push(position);
                }
            }
        }
    }
    pub fn mouse_move(&self, position: Point) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(ticket) = inner.mouse.pending else {
            // Hovering.
            return;
        };
        match owned_stroke(&mut inner.mouse_strokes, ticket) {
            Some(stroke) => stroke.points.push(position),
            None => log::trace!("mouse stroke was taken by the consumer, discarding point"),
        }
    }
    /// Releases `button`, completing the stroke if it was the last one held.
    pub fn mouse_up(&self, button: MouseButtons, position: Point) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(ticket) = inner.mouse.pending else {
            log::warn!("{button:?} released without being pressed, ignoring");
            return;
        };
        inner.mouse.held.remove(button);
        let done = inner.mouse.held.is_empty();
        if let Some(stroke) = owned_stroke(&mut inner.mouse_strokes, ticket) {
            stroke.points.push(position);
            stroke.completed = done;
        }
        if done {
            inner.mouse.pending = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::mux;
    use super::*;

    fn mouse_only() -> InputMux {
        let (mux, _) = mux();
        mux.set_stylus_enabled(false);
        mux
    }

    #[test]
    fn down_move_up() {
        let mux = mouse_only();
        mux.mouse_down(MouseButtons::LEFT, Point::new(0.0, 0.0));
        mux.mouse_move(Point::new(1.0, 0.0));
        let stroke = mux.next_stroke().unwrap();
        assert_eq!(stroke.points.len(), 2);
        assert!(!stroke.completed);

        mux.mouse_up(MouseButtons::LEFT, Point::new(2.0, 0.0));
        let stroke = mux.next_stroke().unwrap();
        assert_eq!(stroke.points.len(), 3);
        assert!(stroke.completed);
        assert_eq!(stroke.buttons, MouseButtons::LEFT);
    }

    #[test]
    fn held_until_all_released() {
        let mux = mouse_only();
        mux.mouse_down(MouseButtons::LEFT, Point::new(0.0, 0.0));
        mux.mouse_down(MouseButtons::RIGHT, Point::new(1.0, 0.0));
        mux.mouse_up(MouseButtons::LEFT, Point::new(2.0, 0.0));
        assert!(!mux.next_stroke().unwrap().completed);

        mux.mouse_up(MouseButtons::RIGHT, Point::new(3.0, 0.0));
        let stroke = mux.next_stroke().unwrap();
        assert!(stroke.completed);
        // Keeps the button it was started with.
        assert_eq!(stroke.buttons, MouseButtons::LEFT);
        assert_eq!(stroke.points.len(), 4);
        assert_eq!(mux.queue_lengths(), [1, 0]);
    }

    #[test]
    fn first_button_release_completes_alone() {
        let mux = mouse_only();
        mux.mouse_down(MouseButtons::RIGHT, Point::new(0.0, 0.0));
        mux.mouse_up(MouseButtons::RIGHT, Point::new(0.0, 0.0));
        assert!(mux.next_stroke().unwrap().completed);
    }

    #[test]
    fn stray_events_ignored() {
        let mux = mouse_only();
        mux.mouse_move(Point::new(1.0, 1.0));
        mux.mouse_up(MouseButtons::LEFT, Point::new(1.0, 1.0));
        assert_eq!(mux.next_stroke(), None);
    }

    #[test]
    fn consumer_took_pending_stroke() {
        let mux = mouse_only();
        mux.mouse_down(MouseButtons::LEFT, Point::new(0.0, 0.0));
        mux.remove_stroke();
        mux.mouse_move(Point::new(1.0, 0.0));
        mux.mouse_up(MouseButtons::LEFT, Point::new(2.0, 0.0));
        assert_eq!(mux.next_stroke(), None);

        // Next stroke is tracked normally.
        mux.mouse_down(MouseButtons::LEFT, Point::new(5.0, 0.0));
        mux.mouse_up(MouseButtons::LEFT, Point::new(6.0, 0.0));
        assert_eq!(mux.next_stroke().unwrap().points[0], Point::new(5.0, 0.0));
    }
}

//! # Alerts
//!
//! Non-blocking notifications to the user, for things that are not errors but that the
//! user should still know about - undoing with nothing to undo, stepping off the first page,
//! input streams falling out of step. On a desktop this is the system beep.

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr, strum::Display)]
pub enum AlertKind {
    /// An undo, redo, or page navigation hit the end of its range.
    Boundary,
    /// The mouse and stylus queues disagreed, and a stroke was thrown away.
    InputDesync,
    /// A stroke was completed but there was nowhere to put it.
    NoOpenPage,
}

/// A sink for alerts. Must be cheap and must not block, as it is called from
/// the interactive thread and from within the input mux's lock.
pub trait Alert: Send + Sync {
    fn alert(&self, kind: AlertKind);
}

impl<A: Alert + ?Sized> Alert for std::sync::Arc<A> {
    fn alert(&self, kind: AlertKind) {
        (**self).alert(kind);
    }
}

/// Counts alerts by kind. Handy for tests and for on-screen stats.
#[derive(Default, Debug)]
pub struct CountingAlert {
    counts: parking_lot::Mutex<hashbrown::HashMap<AlertKind, usize>>,
}
impl CountingAlert {
    #[must_use]
    pub fn count(&self, kind: AlertKind) -> usize {
        self.counts.lock().get(&kind).copied().unwrap_or(0)
    }
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}
impl Alert for CountingAlert {
    fn alert(&self, kind: AlertKind) {
        *self.counts.lock().entry(kind).or_default() += 1;
    }
}

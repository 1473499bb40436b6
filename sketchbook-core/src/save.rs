//! # Background saving
//!
//! Saves run on a worker thread so the interactive thread never waits on the disk. At most one
//! save is in flight. Requests made while busy are coalesced: only the most recent is kept, and
//! it is written as soon as the in-flight save finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::Book;

/// Something that can be written out to durable storage.
pub trait Persist: Send + 'static {
    type Error: std::error::Error + Send + 'static;
    /// Write, returning the number of bytes written.
    fn persist(&mut self) -> Result<u64, Self::Error>;
    /// Human readable name of the destination, for logs.
    fn describe(&self) -> String;
}

/// The outcome of one completed save.
#[derive(Debug)]
pub struct SaveReport<E> {
    pub target: String,
    pub outcome: Result<u64, E>,
    pub elapsed: Duration,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum SaveStatus {
    #[default]
    NeverSaved,
    Saved { bytes: u64 },
    /// The most recent save failed. The next `background_save` will try again.
    Failed { message: String },
}

enum State<T> {
    Idle,
    /// A worker thread exists. It will write `next` after its current save, if any.
    Saving { next: Option<T> },
}

struct Shared<T: Persist> {
    state: Mutex<State<T>>,
    /// Signalled on the transition to `Idle`.
    idle: Condvar,
    status: Mutex<SaveStatus>,
    completed: AtomicU64,
    reports: crossbeam::channel::Sender<SaveReport<T::Error>>,
}
impl<T: Persist> Shared<T> {
    fn set_idle(&self, state: &mut State<T>) {
        *state = State::Idle;
        self.idle.notify_all();
    }
}

pub struct SaveCoordinator<T: Persist> {
    shared: Arc<Shared<T>>,
    reports: crossbeam::channel::Receiver<SaveReport<T::Error>>,
}
impl<T: Persist> Default for SaveCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T: Persist> SaveCoordinator<T> {
    #[must_use]
    pub fn new() -> Self {
        let (send, recv) = crossbeam::channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Idle),
                idle: Condvar::new(),
                status: Mutex::new(SaveStatus::NeverSaved),
                completed: AtomicU64::new(0),
                reports: send,
            }),
            reports: recv,
        }
    }
    /// Save `snapshot` in the background. If a save is already running, `snapshot` replaces
    /// any earlier request still waiting for its turn.
    ///
    /// Only fails if the worker thread could not be started, in which case nothing was saved.
    pub fn background_save(&self, snapshot: T) -> std::io::Result<()> {
        let mut state = self.shared.state.lock();
        match &mut *state {
            State::Saving { next } => {
                if next.replace(snapshot).is_some() {
                    log::trace!("superseded a pending save");
                }
                Ok(())
            }
            State::Idle => {
                *state = State::Saving { next: None };
                let shared = Arc::clone(&self.shared);
                let spawned = std::thread::Builder::new()
                    .name("Save worker".to_owned())
                    .spawn(move || save_worker(&shared, snapshot));
                match spawned {
                    // Detach. It exits on its own once there's nothing left to do.
                    Ok(_) => Ok(()),
                    Err(err) => {
                        log::error!("failed to start save worker: {err}");
                        self.shared.set_idle(&mut state);
                        Err(err)
                    }
                }
            }
        }
    }
    /// Reports of saves completed since the last poll. Never blocks.
    pub fn poll_reports(&self) -> impl Iterator<Item = SaveReport<T::Error>> + '_ {
        self.reports.try_iter()
    }
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.shared.status.lock().clone()
    }
    /// Number of saves that ran to completion, successfully or not.
    #[must_use]
    pub fn saves_completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }
    #[must_use]
    pub fn is_saving(&self) -> bool {
        matches!(*self.shared.state.lock(), State::Saving { .. })
    }
    /// Block until every requested save has been written.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while matches!(*state, State::Saving { .. }) {
            self.shared.idle.wait(&mut state);
        }
    }
}
impl SaveCoordinator<Book> {
    /// Drain reports, recording the size of successful saves into the live book.
    /// Returns how many reports there were.
    pub fn apply_reports(&self, live: &mut Book) -> usize {
        let mut count = 0;
        for report in self.poll_reports() {
            count += 1;
            if let Ok(bytes) = report.outcome {
                live.set_size_in_bytes(bytes);
            }
        }
        count
    }
}

/// Returns the coordinator to idle if the worker unwinds, so `wait_idle` can't hang and
/// later saves get a fresh worker.
struct PanicGuard<'a, T: Persist>(&'a Shared<T>);
impl<T: Persist> Drop for PanicGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("save worker panicked, pending save discarded");
            *self.0.status.lock() = SaveStatus::Failed {
                message: "save worker panicked".to_owned(),
            };
            let mut state = self.0.state.lock();
            self.0.set_idle(&mut state);
        }
    }
}

fn save_worker<T: Persist>(shared: &Shared<T>, mut item: T) {
    let _guard = PanicGuard(shared);
    loop {
        let target = item.describe();
        let start = Instant::now();
        let outcome = item.persist();
        let elapsed = start.elapsed();
        // Release the snapshot before possibly picking up another.
        drop(item);

        let status = match &outcome {
            Ok(bytes) => {
                log::info!("saved {target} ({bytes} bytes) in {}ms", elapsed.as_millis());
                SaveStatus::Saved { bytes: *bytes }
            }
            Err(err) => {
                log::error!("failed to save {target}: {err}");
                SaveStatus::Failed {
                    message: err.to_string(),
                }
            }
        };
        *shared.status.lock() = status;
        shared.completed.fetch_add(1, Ordering::AcqRel);
        // Nobody listening is fine, the status still records the outcome.
        let _ = shared.reports.send(SaveReport {
            target,
            outcome,
            elapsed,
        });

        let mut state = shared.state.lock();
        let next = match &mut *state {
            State::Saving { next } => next.take(),
            State::Idle => None,
        };
        match next {
            Some(next) => item = next,
            None => {
                shared.set_idle(&mut state);
                return;
            }
        }
    }
}

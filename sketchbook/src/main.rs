#![warn(clippy::pedantic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod global;
pub mod script;
pub mod shell;

use anyhow::Result as AnyResult;
use sketchbook_core::{alert::Alert, mux::InputMux, Book};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
enum ArgError {
    #[error("{0} expects a path")]
    MissingValue(&'static str),
    #[error("unrecognized argument {0:?}")]
    Unrecognized(std::ffi::OsString),
}

/// Command line. Paths are `OsString`s, let the system handle character encoding restrictions.
#[derive(Default, Debug, PartialEq, Eq)]
struct Args {
    /// Replay input from this file rather than sitting idle.
    script: Option<PathBuf>,
    /// Write the open page to this PNG on exit.
    export: Option<PathBuf>,
    /// Overrides the book from the preferences.
    book: Option<PathBuf>,
}
impl Args {
    fn parse(args: impl IntoIterator<Item = std::ffi::OsString>) -> Result<Self, ArgError> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (slot, name) = match arg.to_str() {
                Some("--script") => (&mut parsed.script, "--script"),
                Some("--export") => (&mut parsed.export, "--export"),
                Some("--book") => (&mut parsed.book, "--book"),
                _ => return Err(ArgError::Unrecognized(arg)),
            };
            *slot = Some(args.next().ok_or(ArgError::MissingValue(name))?.into());
        }
        Ok(parsed)
    }
}

/// Write the open page to `path`, returning the size of the file.
fn export(shell: &mut shell::Shell, path: &Path) -> AnyResult<u64> {
    let written = shell.export_png(path);
    let size: AnyResult<u64> = try_block::try_block! {
        written?;
        let size = std::fs::metadata(path)?.len();
        Ok(size)
    };
    size
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let args = Args::parse(std::env::args_os().skip(1))?;
    let (preferences, origin) = global::Preferences::get();
    log::set_max_level(preferences.log_level());
    if *origin == global::preferences::Origin::Defaulted {
        if let Err(e) = preferences.save(*origin) {
            log::warn!("Failed to save preferences:\n{e:?}");
        }
    }

    let book_path = args
        .book
        .clone()
        .or_else(|| preferences.book_path())
        .ok_or_else(|| anyhow::anyhow!("no book given and no data directory to keep one in"))?;
    let book = Book::create_or_load(&book_path)?;
    log::info!("opened {book_path:?} with {} pages", book.page_count());

    let resolution = preferences.resolution();
    let alert: Arc<dyn Alert> = Arc::new(shell::TerminalBell);
    let mux = Arc::new(InputMux::new(alert.clone(), resolution));
    mux.set_stylus_enabled(preferences.stylus);

    let (send, recv) = crossbeam::channel::unbounded();
    let delivery = match &args.script {
        Some(path) => {
            let script = script::Script::load(path)?;
            Some(script::spawn_delivery(script, mux.clone(), resolution, send)?)
        }
        None => {
            // Nothing will ever arrive. Draw once and leave.
            let _ = send.send(shell::ShellEvent::Invalidate);
            let _ = send.send(shell::ShellEvent::Quit);
            None
        }
    };

    let mut shell = shell::Shell::new(
        book,
        mux,
        alert,
        preferences.pen_style(),
        preferences.viewport,
    );
    shell.run(&recv);
    // Unblock the replay thread, should it still be sending.
    drop(recv);
    if let Some(delivery) = delivery {
        if delivery.join().is_err() {
            log::error!("input replay panicked");
        }
    }

    if let Some(path) = &args.export {
        match export(&mut shell, path) {
            #[allow(clippy::cast_precision_loss)]
            Ok(size) => log::info!(
                "exported the open page to {path:?} ({})",
                human_bytes::human_bytes(size as f64)
            ),
            Err(e) => {
                log::error!("failed to export {path:?}: {e:#}");
                return Err(e);
            }
        }
    }
    Ok(())
}

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use super::{page::Page, Boundary};
use crate::io::{self, DecodeError, LoadError, SaveError, WriteOptions};

/// An ordered, never empty, collection of pages backed by a file on disk.
#[derive(Clone, Debug)]
pub struct Book {
    pages: Vec<Page>,
    /// Always `None` or a valid index into `pages`.
    open_page: Option<usize>,
    path: PathBuf,
    /// Length of the file most recently loaded or saved. Informational.
    size_in_bytes: u64,
}

impl Book {
    /// A book with one empty page, not yet written anywhere.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            pages: vec![Page::default()],
            open_page: Some(0),
            path: path.into(),
            size_in_bytes: 0,
        }
    }
    /// Load the book at `path`, falling back to an interrupted save if the main file is unusable.
    /// Neither existing is fine, and results in a fresh book.
    pub fn create_or_load(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        let mut failures = Vec::new();

        for candidate in [path.clone(), io::staging_path(&path)] {
            let file = match File::open(&candidate) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    log::warn!("could not open {candidate:?}: {err}");
                    failures.push((candidate, err.into()));
                    continue;
                }
            };
            let size_in_bytes = file.metadata().map_or(0, |meta| meta.len());
            match io::read_book(BufReader::new(file)) {
                Ok(decoded) => {
                    log::info!(
                        "loaded {candidate:?}, {} pages",
                        decoded.pages.len()
                    );
                    return Ok(Self {
                        pages: decoded.pages,
                        open_page: decoded.open_page,
                        path,
                        size_in_bytes,
                    });
                }
                Err(err) => {
                    log::warn!("could not decode {candidate:?}: {err}");
                    failures.push((candidate, err));
                }
            }
        }

        if failures.is_empty() {
            log::info!("no book at {path:?}, starting fresh");
            Ok(Self::new(path))
        } else {
            Err(LoadError::Corrupt { path, failures })
        }
    }
    /// Write the book to its path, returning the number of bytes written.
    ///
    /// The new file is written beside the old and read back before replacing it, so at every
    /// point either the old or the new file is loadable by [`Self::create_or_load`].
    pub fn save_to_disk(&mut self) -> Result<u64, SaveError> {
        let len = self.stage()?;
        self.verify_stage()?;
        self.commit_stage()?;
        self.size_in_bytes = len;
        log::debug!("saved {:?}, {len} bytes", self.path);
        Ok(len)
    }
    /// If a previous save was interrupted between removing the old file and moving the new one
    /// in, finish the move. Returns whether anything was recovered.
    ///
    /// A stale stage that doesn't decode is deleted instead.
    pub fn recover_stale_stage(&self) -> Result<bool, SaveError> {
        let staging = io::staging_path(&self.path);
        let final_exists = self.path.try_exists().map_err(SaveError::io(&self.path))?;
        let staging_exists = staging.try_exists().map_err(SaveError::io(&staging))?;
        if final_exists || !staging_exists {
            return Ok(false);
        }
        if let Err(err) = self.verify_stage() {
            log::warn!("discarded an unreadable stale stage: {err}");
            return Ok(false);
        }
        log::warn!("promoting staged save {staging:?} left by an interrupted save");
        std::fs::rename(&staging, &self.path).map_err(SaveError::io(&staging))?;
        Ok(true)
    }
    /// Write the staging file, durably. Returns its length.
    ///
    /// On failure the partial staging file is removed.
    pub fn stage(&self) -> Result<u64, SaveError> {
        self.recover_stale_stage()?;

        let staging = io::staging_path(&self.path);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(SaveError::io(parent))?;
        }
        self.write_durably(&staging).map_err(|err| {
            discard(&staging);
            SaveError::io(&staging)(err)
        })
    }
    fn write_durably(&self, path: &Path) -> std::io::Result<u64> {
        let mut writer = BufWriter::new(File::create(path)?);
        io::write_book(&mut writer, &self.pages, self.open_page, WriteOptions::default())?;
        let file = writer
            .into_inner()
            .map_err(std::io::IntoInnerError::into_error)?;
        file.sync_all()?;
        Ok(file.metadata()?.len())
    }
    /// Fully decode the staging file. One that fails is removed, so it can never be loaded or
    /// promoted in place of the last good save.
    pub fn verify_stage(&self) -> Result<(), SaveError> {
        let staging = io::staging_path(&self.path);
        let fail = |source: DecodeError| {
            discard(&staging);
            SaveError::Verify {
                path: staging.clone(),
                source,
            }
        };
        let file = File::open(&staging).map_err(|err| fail(err.into()))?;
        io::read_book(BufReader::new(file)).map_err(fail)?;
        Ok(())
    }
    /// Replace the main file with the staging file.
    pub fn commit_stage(&self) -> Result<(), SaveError> {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                return Err(SaveError::io(&self.path)(err));
            }
            _ => (),
        }
        let staging = io::staging_path(&self.path);
        std::fs::rename(&staging, &self.path).map_err(SaveError::io(&staging))
    }
    /// An independent copy for saving elsewhere. Strokes are shared, page caches are not copied.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
    #[must_use]
    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }
    pub fn set_size_in_bytes(&mut self, size: u64) {
        self.size_in_bytes = size;
    }
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
    #[must_use]
    pub fn open_page_index(&self) -> Option<usize> {
        self.open_page
    }
    #[must_use]
    pub fn open_page(&self) -> Option<&Page> {
        self.open_page.map(|idx| &self.pages[idx])
    }
    pub fn open_page_mut(&mut self) -> Option<&mut Page> {
        self.open_page.map(|idx| &mut self.pages[idx])
    }
    /// # Panics
    /// If `page` is not an index of this book.
    pub fn set_open_page(&mut self, page: Option<usize>) {
        if let Some(idx) = page {
            assert!(
                idx < self.pages.len(),
                "page {idx} does not belong to a book of {} pages",
                self.pages.len()
            );
        }
        self.open_page = page;
    }
    /// Move to the next page, creating it if this was the last. Returns the new index.
    pub fn next_page(&mut self) -> usize {
        let next = self.open_page.map_or(0, |idx| idx + 1);
        if next == self.pages.len() {
            self.pages.push(Page::default());
        }
        self.open_page = Some(next);
        next
    }
    /// Move to the previous page. Returns the new index.
    pub fn previous_page(&mut self) -> Result<usize, Boundary> {
        let previous = self
            .open_page
            .and_then(|idx| idx.checked_sub(1))
            .ok_or(Boundary::FirstPage)?;
        self.open_page = Some(previous);
        Ok(previous)
    }
}

/// Best-effort removal of a staging file known to be bad.
fn discard(staging: &Path) {
    match std::fs::remove_file(staging) {
        Err(err) if err.kind() != ErrorKind::NotFound => {
            log::error!("could not remove bad staging file {staging:?}: {err}");
        }
        _ => (),
    }
}

impl crate::save::Persist for Book {
    type Error = SaveError;
    fn persist(&mut self) -> Result<u64, Self::Error> {
        self.save_to_disk()
    }
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stroke::{PenStyle, Point, Stroke};

    fn stroke(x: f32) -> Stroke {
        Stroke::new(PenStyle::default(), vec![Point::new(x, 0.0), Point::new(x, 5.0)])
    }
    fn first_xs(book: &Book, page: usize) -> Vec<f32> {
        book.pages()[page]
            .strokes()
            .iter()
            .map(|s| s.points[0].x)
            .collect()
    }

    #[test]
    fn fresh_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let book = Book::create_or_load(dir.path().join("a.book")).unwrap();
        assert_eq!(book.page_count(), 1);
        assert_eq!(book.open_page_index(), Some(0));
        assert_eq!(book.size_in_bytes(), 0);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        let mut book = Book::create_or_load(&path).unwrap();
        book.open_page_mut().unwrap().add_stroke(stroke(3.0));
        let written = book.save_to_disk().unwrap();

        assert_eq!(book.size_in_bytes(), written);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), written);
        assert!(!io::staging_path(&path).exists());

        let loaded = Book::create_or_load(&path).unwrap();
        assert_eq!(loaded.page_count(), 1);
        assert_eq!(loaded.open_page_index(), Some(0));
        assert_eq!(
            loaded.pages()[0].strokes()[0].as_ref(),
            book.pages()[0].strokes()[0].as_ref()
        );
        assert_eq!(loaded.pages()[0].stroke_count(), 1);
        assert_eq!(loaded.size_in_bytes(), written);
    }

    #[test]
    fn interrupted_after_staging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        let mut book = Book::new(&path);
        book.open_page_mut().unwrap().add_stroke(stroke(1.0));
        book.save_to_disk().unwrap();

        // Crash with the new version staged but not committed. Old version wins.
        book.open_page_mut().unwrap().add_stroke(stroke(2.0));
        book.stage().unwrap();
        assert_eq!(first_xs(&Book::create_or_load(&path).unwrap(), 0), [1.0]);

        // Crash having just deleted the old version. New version is recovered from staging.
        std::fs::remove_file(&path).unwrap();
        assert_eq!(first_xs(&Book::create_or_load(&path).unwrap(), 0), [1.0, 2.0]);
    }

    #[test]
    fn stale_stage_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        let mut book = Book::new(&path);
        book.open_page_mut().unwrap().add_stroke(stroke(1.0));
        book.stage().unwrap();

        assert!(book.recover_stale_stage().unwrap());
        assert!(path.exists());
        assert!(!io::staging_path(&path).exists());
        // Nothing further to do.
        assert!(!book.recover_stale_stage().unwrap());

        // A save over a stale stage ends with only the newest version.
        book.stage().unwrap();
        std::fs::remove_file(&path).unwrap();
        book.open_page_mut().unwrap().add_stroke(stroke(2.0));
        book.save_to_disk().unwrap();
        assert!(!io::staging_path(&path).exists());
        assert_eq!(first_xs(&Book::create_or_load(&path).unwrap(), 0), [1.0, 2.0]);
    }

    #[test]
    fn corrupt_primary_uses_staging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        let mut book = Book::new(&path);
        book.open_page_mut().unwrap().add_stroke(stroke(7.0));
        let staged = book.stage().unwrap();
        std::fs::write(&path, b"definitely not a book").unwrap();

        let loaded = Book::create_or_load(&path).unwrap();
        assert_eq!(first_xs(&loaded, 0), [7.0]);
        assert_eq!(loaded.size_in_bytes(), staged);
    }

    #[test]
    fn all_corrupt_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        std::fs::write(&path, b"RIFF").unwrap();
        std::fs::write(io::staging_path(&path), b"").unwrap();

        let Err(LoadError::Corrupt { failures, .. }) = Book::create_or_load(&path) else {
            panic!("loaded from garbage");
        };
        assert_eq!(failures.len(), 2);
        assert!(failures
            .iter()
            .all(|(_, err)| matches!(err, DecodeError::IO(_))));
    }

    /// Cut the staging file short, as if the disk lied about the write.
    fn tear_stage(path: &Path) {
        let staging = io::staging_path(path);
        let len = std::fs::metadata(&staging).unwrap().len();
        File::options()
            .write(true)
            .open(&staging)
            .unwrap()
            .set_len(len / 2)
            .unwrap();
    }

    #[test]
    fn failed_verify_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        let mut book = Book::new(&path);
        book.open_page_mut().unwrap().add_stroke(stroke(1.0));
        book.save_to_disk().unwrap();
        let before = std::fs::read(&path).unwrap();

        book.open_page_mut().unwrap().add_stroke(stroke(2.0));
        book.stage().unwrap();
        tear_stage(&path);
        assert!(matches!(book.verify_stage(), Err(SaveError::Verify { .. })));
        assert!(!io::staging_path(&path).exists());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn failed_first_save_stays_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        let mut book = Book::new(&path);

        // Torn before the first commit, nothing durable yet.
        book.stage().unwrap();
        tear_stage(&path);
        assert!(book.verify_stage().is_err());
        let reloaded = Book::create_or_load(&path).unwrap();
        assert_eq!(reloaded.page_count(), 1);
        assert_eq!(reloaded.size_in_bytes(), 0);

        // Refused by the encoder, leaving no partial stage behind.
        book.open_page_mut().unwrap().add_stroke(Stroke::new(
            PenStyle {
                width: f32::INFINITY,
                ..PenStyle::default()
            },
            vec![Point::new(0.0, 0.0)],
        ));
        assert!(matches!(book.save_to_disk(), Err(SaveError::IO { .. })));
        assert!(!io::staging_path(&path).exists());
        assert!(!path.exists());
        assert_eq!(
            Book::create_or_load(&path).unwrap().pages()[0].stroke_count(),
            0
        );
    }

    #[test]
    fn unreadable_stale_stage_never_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.book");
        std::fs::write(io::staging_path(&path), b"RIFF\x00").unwrap();

        let mut book = Book::new(&path);
        assert!(!book.recover_stale_stage().unwrap());
        assert!(!io::staging_path(&path).exists());
        assert!(!path.exists());

        book.open_page_mut().unwrap().add_stroke(stroke(4.0));
        book.save_to_disk().unwrap();
        assert_eq!(first_xs(&Book::create_or_load(&path).unwrap(), 0), [4.0]);
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("a.book");
        Book::new(&path).save_to_disk().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn navigation() {
        let mut book = Book::new("unused.book");
        assert_eq!(book.previous_page(), Err(Boundary::FirstPage));
        assert_eq!(book.next_page(), 1);
        assert_eq!(book.page_count(), 2);
        assert_eq!(book.previous_page(), Ok(0));
        // Revisiting doesn't grow the book.
        assert_eq!(book.next_page(), 1);
        assert_eq!(book.page_count(), 2);

        book.set_open_page(None);
        assert!(book.open_page().is_none());
        assert_eq!(book.previous_page(), Err(Boundary::FirstPage));
        assert_eq!(book.open_page_index(), None);
        assert_eq!(book.next_page(), 0);
    }

    #[test]
    #[should_panic = "does not belong"]
    fn foreign_page() {
        Book::new("unused.book").set_open_page(Some(1));
    }

    #[test]
    fn snapshot_is_independent() {
        let mut book = Book::new("unused.book");
        book.open_page_mut().unwrap().add_stroke(stroke(1.0));
        let _ = book.open_page_mut().unwrap().render_into(4, 4);

        let snapshot = book.snapshot();
        book.open_page_mut().unwrap().add_stroke(stroke(2.0));
        book.next_page();

        assert_eq!(snapshot.page_count(), 1);
        assert_eq!(first_xs(&snapshot, 0), [1.0]);
        assert!(!snapshot.pages()[0].has_cache());
        // Same committed stroke, not a copy.
        assert!(std::sync::Arc::ptr_eq(
            &snapshot.pages()[0].strokes()[0],
            &book.pages()[0].strokes()[0]
        ));
    }
}

//! # IO
//!
//! Reading and writing `.book` files. The container is RIFF with custom chunks:
//!
//! ```text
//! RIFF skbk
//!     bkhd                  version, open page, page count
//!     LIST page             repeated page_count times
//!         LIST hist         committed strokes, oldest first
//!             strk*
//!         LIST redo         optional, undone strokes, next to redo last
//!             strk*
//! ```
//!
//! All values are little endian. Chunks with unrecognized IDs are skipped.

pub mod riff;

use std::io::{Error as IOError, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use az::CheckedAs;
use bytemuck::Zeroable;
use riff::{
    decode::{BinaryChunkReader, SubchunkReader},
    encode::{write_chunk, ChunkWriter},
    ChunkID,
};

use crate::{
    color::Argb,
    state::page::Page,
    stroke::{PenStyle, Point, Smoothing, Stroke},
};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Version(pub u8, pub u8, pub u8, pub u8);
impl Version {
    pub const CURRENT: Self = Version(0, 1, 0, 0);
}
impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0, self.1, self.2, self.3)
    }
}

#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct BookHeader {
    version: [u8; 4],
    /// -1 for no open page.
    open_page: i32,
    page_count: u32,
}
impl BookHeader {
    /// Swap between native and little endian. Its own inverse.
    fn swap_le(self) -> Self {
        Self {
            version: self.version,
            open_page: i32::from_le(self.open_page),
            page_count: u32::from_le(self.page_count),
        }
    }
}

#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct StrokeHeader {
    color: u32,
    /// Bits of an `f32`.
    width: u32,
    smoothing: u8,
    _reserved: [u8; 3],
    point_count: u32,
}
impl StrokeHeader {
    fn swap_le(self) -> Self {
        Self {
            color: u32::from_le(self.color),
            width: u32::from_le(self.width),
            smoothing: self.smoothing,
            _reserved: self._reserved,
            point_count: u32::from_le(self.point_count),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("{0}")]
    IO(#[from] IOError),
    #[error("not a book file, found {0} container")]
    NotABook(String),
    #[error("missing book header")]
    MissingHeader,
    #[error("unsupported book version {0}")]
    UnsupportedVersion(Version),
    #[error("header claims {claimed} pages, found {found}")]
    PageCount { claimed: u32, found: usize },
    #[error("open page {open} out of range for {pages} pages")]
    OpenPageOutOfRange { open: i32, pages: usize },
    #[error("malformed stroke: {0}")]
    BadStroke(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// Some file existed, but nothing could be decoded. Don't overwrite it!
    #[error("no candidate for {path:?} could be loaded ({} failed)", .failures.len())]
    Corrupt {
        path: PathBuf,
        failures: Vec<(PathBuf, DecodeError)>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    #[error("writing {path:?}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: IOError,
    },
    /// The staged file didn't read back. The previous save is untouched.
    #[error("staged file {path:?} failed verification: {source}")]
    Verify {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}
impl SaveError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(IOError) -> Self + '_ {
        move |source| Self::IO {
            path: path.to_owned(),
            source,
        }
    }
}

/// Where a save is written before being moved over `path`.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".new");
    staging.into()
}

/// The contents of a book file, before being attached to a path.
#[derive(Debug)]
pub struct DecodedBook {
    pub pages: Vec<Page>,
    pub open_page: Option<usize>,
}

/// Controls for older-format output.
#[derive(Copy, Clone, Debug)]
pub struct WriteOptions {
    /// Write a `LIST redo` per page.
    pub redo: bool,
}
impl Default for WriteOptions {
    fn default() -> Self {
        Self { redo: true }
    }
}

pub fn write_book<W: Write + Seek>(
    writer: W,
    pages: &[Page],
    open_page: Option<usize>,
    options: WriteOptions,
) -> Result<(), IOError> {
    let too_large = || IOError::other(anyhow::anyhow!("book too large to encode"));
    let header = BookHeader {
        version: [
            Version::CURRENT.0,
            Version::CURRENT.1,
            Version::CURRENT.2,
            Version::CURRENT.3,
        ],
        open_page: match open_page {
            Some(idx) => idx.checked_as().ok_or_else(too_large)?,
            None => -1,
        },
        page_count: pages.len().checked_as().ok_or_else(too_large)?,
    }
    .swap_le();

    let mut root = ChunkWriter::with_subtype(writer, ChunkID::RIFF, ChunkID::SKBK)?;
    write_chunk(&mut root, ChunkID::BKHD, bytemuck::bytes_of(&header))?;
    for page in pages {
        let mut page_chunk = ChunkWriter::with_subtype(&mut root, ChunkID::LIST, ChunkID::PAGE)?;
        write_stroke_list(&mut page_chunk, ChunkID::HIST, page.strokes())?;
        if options.redo {
            write_stroke_list(&mut page_chunk, ChunkID::REDO, page.redo_history())?;
        }
        page_chunk.finish()?;
    }
    root.finish()
}

fn write_stroke_list<W: Write + Seek>(
    writer: W,
    subtype: ChunkID,
    strokes: &[Arc<Stroke>],
) -> Result<(), IOError> {
    let mut list = ChunkWriter::with_subtype(writer, ChunkID::LIST, subtype)?;
    // Reused between strokes.
    let mut buf = Vec::<u8>::new();
    for stroke in strokes {
        // Mirrors the check in `read_stroke`, so a bad pen fails here rather than at verify.
        if !stroke.style.width.is_finite() {
            return Err(IOError::new(
                std::io::ErrorKind::InvalidInput,
                anyhow::anyhow!("stroke width {} can't be encoded", stroke.style.width),
            ));
        }
        let header = StrokeHeader {
            color: stroke.style.color.0,
            width: stroke.style.width.to_bits(),
            smoothing: stroke.style.smoothing as u8,
            _reserved: [0; 3],
            point_count: stroke
                .points
                .len()
                .checked_as()
                .ok_or_else(|| IOError::other(anyhow::anyhow!("stroke too long to encode")))?,
        }
        .swap_le();

        buf.clear();
        buf.extend_from_slice(bytemuck::bytes_of(&header));
        for point in &stroke.points {
            buf.extend_from_slice(&point.x.to_le_bytes());
            buf.extend_from_slice(&point.y.to_le_bytes());
        }
        write_chunk(&mut list, ChunkID::STRK, &buf)?;
    }
    list.finish()
}

pub fn read_book<R: Read + Seek>(reader: R) -> Result<DecodedBook, DecodeError> {
    let root = BinaryChunkReader::new(reader)?;
    if root.id() != ChunkID::RIFF {
        return Err(DecodeError::NotABook(root.id().to_string()));
    }
    let mut root = root.subchunks()?;
    if root.subtype_id() != ChunkID::SKBK {
        return Err(DecodeError::NotABook(format!("RIFF {}", root.subtype_id())));
    }

    let mut header = None::<BookHeader>;
    let mut pages = Vec::<Page>::new();
    while let Some(mut chunk) = root.next_subchunk()? {
        match chunk.id() {
            ChunkID::BKHD => {
                let mut parsed = BookHeader::zeroed();
                chunk.read_exact(bytemuck::bytes_of_mut(&mut parsed))?;
                // Newer versions may append fields.
                chunk.skip()?;
                let parsed = parsed.swap_le();
                let [major, minor, patch, build] = parsed.version;
                let version = Version(major, minor, patch, build);
                if major != Version::CURRENT.0 || minor > Version::CURRENT.1 {
                    return Err(DecodeError::UnsupportedVersion(version));
                }
                header = Some(parsed);
            }
            ChunkID::LIST => {
                let mut list = chunk.subchunks()?;
                if list.subtype_id() == ChunkID::PAGE {
                    pages.push(read_page(&mut list)?);
                } else {
                    log::trace!("skipping LIST {}", list.subtype_id());
                    skip_rest(&mut list)?;
                }
            }
            other => {
                log::trace!("skipping chunk {other}");
                chunk.skip()?;
            }
        }
    }

    let header = header.ok_or(DecodeError::MissingHeader)?;
    if header.page_count as usize != pages.len() || pages.is_empty() {
        return Err(DecodeError::PageCount {
            claimed: header.page_count,
            found: pages.len(),
        });
    }
    let open_page = match header.open_page {
        -1 => None,
        open => Some(
            usize::try_from(open)
                .ok()
                .filter(|&idx| idx < pages.len())
                .ok_or(DecodeError::OpenPageOutOfRange {
                    open,
                    pages: pages.len(),
                })?,
        ),
    };
    Ok(DecodedBook { pages, open_page })
}

fn skip_rest<R: Read + Seek>(list: &mut SubchunkReader<R>) -> Result<(), IOError> {
    while let Some(chunk) = list.next_subchunk()? {
        chunk.skip()?;
    }
    Ok(())
}

fn read_page<R: Read + Seek>(page: &mut SubchunkReader<R>) -> Result<Page, DecodeError> {
    let mut strokes = Vec::new();
    let mut redo = Vec::new();
    while let Some(chunk) = page.next_subchunk()? {
        if chunk.id() != ChunkID::LIST {
            chunk.skip()?;
            continue;
        }
        let mut list = chunk.subchunks()?;
        let into = match list.subtype_id() {
            ChunkID::HIST => &mut strokes,
            ChunkID::REDO => &mut redo,
            _ => {
                skip_rest(&mut list)?;
                continue;
            }
        };
        while let Some(chunk) = list.next_subchunk()? {
            if chunk.id() == ChunkID::STRK {
                into.push(Arc::new(read_stroke(chunk)?));
            } else {
                chunk.skip()?;
            }
        }
    }
    Ok(Page::from_parts(strokes, redo))
}

fn read_stroke<R: Read>(mut chunk: BinaryChunkReader<R>) -> Result<Stroke, DecodeError> {
    let mut header = StrokeHeader::zeroed();
    chunk
        .read_exact(bytemuck::bytes_of_mut(&mut header))
        .map_err(|_| DecodeError::BadStroke("truncated header"))?;
    let header = header.swap_le();

    let width = f32::from_bits(header.width);
    if !width.is_finite() {
        return Err(DecodeError::BadStroke("non-finite width"));
    }
    let smoothing =
        Smoothing::from_repr(header.smoothing).ok_or(DecodeError::BadStroke("unknown smoothing"))?;
    // Check against the bytes actually present before allocating anything.
    let point_count = header.point_count as usize;
    if point_count.checked_mul(std::mem::size_of::<[f32; 2]>()) != Some(chunk.remaining()) {
        return Err(DecodeError::BadStroke("point count doesn't match chunk length"));
    }

    let mut raw = vec![0u8; chunk.remaining()];
    chunk.read_exact(&mut raw)?;
    let points = raw
        .chunks_exact(8)
        .map(|xy| {
            let [x0, x1, x2, x3, y0, y1, y2, y3] = xy else {
                unreachable!()
            };
            Point::new(
                f32::from_le_bytes([*x0, *x1, *x2, *x3]),
                f32::from_le_bytes([*y0, *y1, *y2, *y3]),
            )
        })
        .collect();

    Ok(Stroke::new(
        PenStyle {
            color: Argb(header.color),
            width,
            smoothing,
        },
        points,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn sample_pages() -> Vec<Page> {
        let a = Stroke::new(
            PenStyle {
                color: Argb(0xFF12_3456),
                width: 2.5,
                smoothing: Smoothing::None,
            },
            vec![Point::new(0.0, 0.0), Point::new(-3.5, 7.25)],
        );
        let b = Stroke::new(PenStyle::default(), vec![Point::new(1.0, 1.0)]);
        let mut first = Page::default();
        first.add_stroke(a);
        first.add_stroke(b);
        first.undo().unwrap();
        vec![first, Page::default()]
    }

    fn encode(pages: &[Page], open: Option<usize>, options: WriteOptions) -> Vec<u8> {
        let mut file = Vec::new();
        write_book(Cursor::new(&mut file), pages, open, options).unwrap();
        file
    }

    #[test]
    fn preserves_history_and_cursor() {
        let file = encode(&sample_pages(), Some(1), WriteOptions::default());
        let book = read_book(Cursor::new(&file)).unwrap();
        assert_eq!(book.open_page, Some(1));
        assert_eq!(book.pages.len(), 2);

        let first = &book.pages[0];
        assert_eq!(first.stroke_count(), 1);
        let stroke = &first.strokes()[0];
        assert_eq!(stroke.style.color, Argb(0xFF12_3456));
        assert_eq!(stroke.style.width, 2.5);
        assert_eq!(stroke.style.smoothing, Smoothing::None);
        assert_eq!(stroke.points, [Point::new(0.0, 0.0), Point::new(-3.5, 7.25)]);
        assert_eq!(first.redo_history().len(), 1);
        assert_eq!(book.pages[1].stroke_count(), 0);
    }

    #[test]
    fn no_open_page() {
        let file = encode(&sample_pages(), None, WriteOptions::default());
        assert_eq!(read_book(Cursor::new(&file)).unwrap().open_page, None);
    }

    #[test]
    fn missing_redo_is_empty() {
        let file = encode(&sample_pages(), Some(0), WriteOptions { redo: false });
        let book = read_book(Cursor::new(&file)).unwrap();
        assert_eq!(book.pages[0].stroke_count(), 1);
        assert!(book.pages[0].redo_history().is_empty());
    }

    #[test]
    fn truncated() {
        let file = encode(&sample_pages(), Some(0), WriteOptions::default());
        for len in [0, 7, 12, 30, file.len() - 1] {
            assert!(
                read_book(Cursor::new(&file[..len])).is_err(),
                "decoded a file truncated to {len} bytes"
            );
        }
    }

    #[test]
    fn rejects_foreign_files() {
        let mut file = encode(&sample_pages(), Some(0), WriteOptions::default());
        file[8..12].copy_from_slice(b"WAVE");
        assert!(matches!(
            read_book(Cursor::new(&file)),
            Err(DecodeError::NotABook(_))
        ));
    }

    #[test]
    fn open_page_out_of_range() {
        let file = encode(&sample_pages(), Some(2), WriteOptions::default());
        assert!(matches!(
            read_book(Cursor::new(&file)),
            Err(DecodeError::OpenPageOutOfRange { open: 2, pages: 2 })
        ));
    }

    #[test]
    fn non_finite_width() {
        let mut page = Page::default();
        page.add_stroke(Stroke::new(PenStyle::default(), vec![]));
        let mut file = encode(&[page.clone()], Some(0), WriteOptions::default());
        // Width follows the color in the stroke header.
        let strk = file.windows(4).position(|id| id == b"strk").unwrap();
        file[strk + 12..strk + 16].copy_from_slice(&f32::NAN.to_le_bytes());
        assert!(matches!(
            read_book(Cursor::new(&file)),
            Err(DecodeError::BadStroke(_))
        ));

        // And it's refused on the way out, too.
        page.add_stroke(Stroke::new(
            PenStyle {
                width: f32::INFINITY,
                ..PenStyle::default()
            },
            vec![],
        ));
        let err = write_book(Cursor::new(Vec::new()), &[page], Some(0), WriteOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn skips_unknown_chunks() {
        let mut file = Vec::new();
        {
            let mut root =
                ChunkWriter::with_subtype(Cursor::new(&mut file), ChunkID::RIFF, ChunkID::SKBK)
                    .unwrap();
            write_chunk(&mut root, ChunkID(*b"meta"), b"hello!").unwrap();
            let header = BookHeader {
                version: [0, 1, 0, 0],
                open_page: 0,
                page_count: 1,
            }
            .swap_le();
            write_chunk(&mut root, ChunkID::BKHD, bytemuck::bytes_of(&header))
                .unwrap();
            let mut page =
                ChunkWriter::with_subtype(&mut root, ChunkID::LIST, ChunkID::PAGE).unwrap();
            write_chunk(&mut page, ChunkID(*b"thmb"), &[0; 5]).unwrap();
            page.finish().unwrap();
            ChunkWriter::with_subtype(&mut root, ChunkID::LIST, ChunkID(*b"INFO"))
                .unwrap()
                .finish()
                .unwrap();
            root.finish().unwrap();
        }
        let book = read_book(Cursor::new(&file)).unwrap();
        assert_eq!(book.pages.len(), 1);
        assert_eq!(book.open_page, Some(0));
    }

    #[test]
    fn staging_path_appends() {
        assert_eq!(
            staging_path(Path::new("/tmp/a.book")),
            PathBuf::from("/tmp/a.book.new")
        );
    }
}

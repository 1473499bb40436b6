//! Minimal RIFF container reading and writing.
//!
//! Every chunk is a four byte ID, a little-endian `u32` payload length, then the payload.
//! `RIFF` and `LIST` chunks carry a four byte subtype at the start of their payload, followed
//! by nested chunks.

pub mod decode;
pub mod encode;

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
#[repr(transparent)]
pub struct ChunkID(pub [u8; 4]);
impl ChunkID {
    // RIFF standard chunks
    pub const RIFF: Self = ChunkID(*b"RIFF");
    pub const LIST: Self = ChunkID(*b"LIST");
    // sketchbook custom chunks
    pub const SKBK: Self = ChunkID(*b"skbk");
    pub const BKHD: Self = ChunkID(*b"bkhd");
    pub const PAGE: Self = ChunkID(*b"page");
    pub const HIST: Self = ChunkID(*b"hist");
    pub const REDO: Self = ChunkID(*b"redo");
    pub const STRK: Self = ChunkID(*b"strk");
    #[must_use]
    pub fn id_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}
impl std::fmt::Display for ChunkID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Write as a string if possible, otherwise as a hex string.
        if let Some(str) = self.id_str() {
            f.write_str(str)
        } else {
            write!(f, "{:x?}", self.0)
        }
    }
}
impl std::ops::Deref for ChunkID {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::{
        decode::BinaryChunkReader,
        encode::{write_chunk, ChunkWriter},
        ChunkID,
    };
    use std::io::{Cursor, Read};

    /// Hand-assembled file: RIFF skbk { bkhd[4], LIST page { } }
    #[rustfmt::skip]
    const NESTED: &[u8] = &[
        b'R', b'I', b'F', b'F', 28, 0, 0, 0, b's', b'k', b'b', b'k',
            b'b', b'k', b'h', b'd', 4, 0, 0, 0, 1, 2, 3, 4,
            b'L', b'I', b'S', b'T', 4, 0, 0, 0, b'p', b'a', b'g', b'e',
    ];

    #[test]
    fn write_nested() {
        let mut file = Vec::<u8>::new();
        {
            let mut root =
                ChunkWriter::with_subtype(Cursor::new(&mut file), ChunkID::RIFF, ChunkID::SKBK)
                    .unwrap();
            write_chunk(&mut root, ChunkID::BKHD, &[1, 2, 3, 4]).unwrap();
            ChunkWriter::with_subtype(&mut root, ChunkID::LIST, ChunkID::PAGE)
                .unwrap()
                .finish()
                .unwrap();
            root.finish().unwrap();
        }
        assert_eq!(&file, NESTED);
    }

    #[test]
    fn read_nested() {
        let root = BinaryChunkReader::new(Cursor::new(NESTED)).unwrap();
        assert_eq!(root.id(), ChunkID::RIFF);
        assert_eq!(root.data_len(), NESTED.len() - 8);
        let mut subchunks = root.subchunks().unwrap();
        assert_eq!(subchunks.subtype_id(), ChunkID::SKBK);

        let mut header = subchunks.next_subchunk().unwrap().unwrap();
        assert_eq!(header.id(), ChunkID::BKHD);
        let mut data = Vec::new();
        header.read_to_end(&mut data).unwrap();
        assert_eq!(data, [1, 2, 3, 4]);

        let list = subchunks.next_subchunk().unwrap().unwrap();
        assert_eq!(list.id(), ChunkID::LIST);
        let mut pages = list.subchunks().unwrap();
        assert_eq!(pages.subtype_id(), ChunkID::PAGE);
        assert!(pages.next_subchunk().unwrap().is_none());
        drop(pages);

        // End of the RIFF.
        assert!(subchunks.next_subchunk().unwrap().is_none());
    }

    #[test]
    fn child_overrunning_parent() {
        let mut bad = NESTED.to_vec();
        // Claim the bkhd chunk is much longer than the RIFF.
        bad[16] = 200;
        let mut subchunks = BinaryChunkReader::new(Cursor::new(bad))
            .unwrap()
            .subchunks()
            .unwrap();
        assert!(subchunks.next_subchunk().is_err());
    }
}

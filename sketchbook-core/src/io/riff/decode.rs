use super::ChunkID;
use az::CheckedAs;
use std::io::{
    Error as IOError, ErrorKind as IOErrorKind, Read, Result as IOResult, Seek, SeekFrom,
};

pub struct BinaryChunkReader<R: Read> {
    id: ChunkID,
    /// How far into the chunk we've read. Zero is the basis
    /// for Seeks, and reads will EOF at cursor == len.
    cursor: u32,
    len: u32,
    reader: R,
}
impl<R: Read> Read for BinaryChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IOResult<usize> {
        let max_bytes = self.remaining();
        let clamped_buf_len = buf.len().min(max_bytes);
        let clamped_buf = &mut buf[..clamped_buf_len];

        let num_read = self.reader.read(clamped_buf)?;

        // Add to cursor, ensure that inner reader didn't do a silly.
        self.cursor = num_read
            .checked_as::<u32>()
            .and_then(|read| self.cursor.checked_add(read))
            .filter(|cursor| *cursor <= self.len)
            .ok_or_else(|| {
                IOError::other(anyhow::anyhow!(
                    "internal reader violated len requirements!"
                ))
            })?;

        Ok(num_read)
    }
}
impl<R: Read + Seek> Seek for BinaryChunkReader<R> {
    /// Seek the stream within this reader's address space. Seeks past-the-end are clamped.
    fn seek(&mut self, pos: SeekFrom) -> IOResult<u64> {
        let new_cursor = match pos {
            SeekFrom::Current(delta) => i64::from(self.cursor).checked_add(delta),
            SeekFrom::End(delta) => i64::from(self.len).checked_add(delta),
            SeekFrom::Start(pos) => pos.checked_as(),
        }
        .ok_or_else(|| IOError::other(anyhow::anyhow!("seek with overflow")))?;
        // Seek-before-start is an error
        if new_cursor < 0 {
            return Err(IOError::other(anyhow::anyhow!("seek past-the-start")));
        }
        // Clamp to end. Fits in u32 after the clamp.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let new_cursor = new_cursor.min(i64::from(self.len)) as u32;
        let diff = i64::from(new_cursor) - i64::from(self.cursor);

        // Seek underlying stream by the clamped diff, update own cursor.
        self.reader.seek(SeekFrom::Current(diff))?;
        self.cursor = new_cursor;

        Ok(u64::from(self.cursor))
    }
    fn stream_position(&mut self) -> IOResult<u64> {
        Ok(u64::from(self.cursor))
    }
}
impl<R: Read> BinaryChunkReader<R> {
    /// Read a chunk from the given Read. Immediately fetches 8 bytes
    /// from the stream to get the ID and length.
    pub fn new(mut read: R) -> IOResult<Self> {
        let mut header = [0u8; 8];
        read.read_exact(&mut header).map_err(|err| {
            if err.kind() == IOErrorKind::UnexpectedEof {
                IOError::new(
                    IOErrorKind::UnexpectedEof,
                    anyhow::anyhow!("not enough bytes to read chunk header"),
                )
            } else {
                err
            }
        })?;
        let [i0, i1, i2, i3, l0, l1, l2, l3] = header;

        Ok(Self {
            id: ChunkID([i0, i1, i2, i3]),
            cursor: 0,
            len: u32::from_le_bytes([l0, l1, l2, l3]),
            reader: read,
        })
    }
    #[must_use]
    pub fn id(&self) -> ChunkID {
        self.id
    }
    /// Size of chunk payload
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.len as usize
    }
    /// Bytes of payload not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        (self.len - self.cursor) as usize
    }
    /// Interpret the unstructured payload as RIFF/LIST subchunks.
    pub fn subchunks(mut self) -> IOResult<SubchunkReader<R>> {
        let mut inner_id = ChunkID([0; 4]);
        self.read_exact(&mut inner_id.0).map_err(|_| {
            IOError::new(
                IOErrorKind::UnexpectedEof,
                anyhow::anyhow!("failed to read subchunk id of {}", self.id),
            )
        })?;
        Ok(SubchunkReader {
            inner_id,
            reader: self,
        })
    }
}
impl<R: Read + Seek> BinaryChunkReader<R> {
    /// Advance the inner reader to the end of this chunk.
    pub fn skip(mut self) -> IOResult<()> {
        let remaining = self.len - self.cursor;
        self.reader.seek(SeekFrom::Current(i64::from(remaining)))?;
        self.cursor = self.len;

        Ok(())
    }
}

pub struct SubchunkReader<R: Read> {
    inner_id: ChunkID,
    reader: BinaryChunkReader<R>,
}
impl<R: Read> SubchunkReader<R> {
    #[must_use]
    pub fn id(&self) -> ChunkID {
        self.reader.id()
    }
    #[must_use]
    pub fn subtype_id(&self) -> ChunkID {
        self.inner_id
    }
    /// Read the subchunk at the current position, or `None` at the end of the parent.
    /// The previous subchunk must have been read to its end, or skipped.
    pub fn next_subchunk(
        &mut self,
    ) -> IOResult<Option<BinaryChunkReader<&mut BinaryChunkReader<R>>>> {
        if self.reader.remaining() == 0 {
            return Ok(None);
        }
        let parent_id = self.reader.id();
        let child = BinaryChunkReader::new(&mut self.reader)?;
        if child.data_len() > child.reader.remaining() {
            return Err(IOError::new(
                IOErrorKind::InvalidData,
                anyhow::anyhow!(
                    "chunk {} of {} bytes overruns its parent {}",
                    child.id(),
                    child.data_len(),
                    parent_id
                ),
            ));
        }
        Ok(Some(child))
    }
}

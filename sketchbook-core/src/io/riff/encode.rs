use super::ChunkID;
use az::CheckedAs;
use std::io::{Error as IOError, Result as IOResult, Seek, SeekFrom, Write};

fn header(id: ChunkID, len: u32) -> [u8; 8] {
    let len = len.to_le_bytes();
    [id[0], id[1], id[2], id[3], len[0], len[1], len[2], len[3]]
}

/// Write a leaf chunk whose payload is already in memory. Doesn't need `Seek`.
pub fn write_chunk(mut writer: impl Write, id: ChunkID, data: &[u8]) -> IOResult<()> {
    let len: u32 = data
        .len()
        .checked_as()
        .ok_or_else(|| IOError::other(anyhow::anyhow!("RIFF chunk {id} exceeded 4GiB")))?;
    writer.write_all(&header(id, len))?;
    writer.write_all(data)
}

/// A `RIFF` or `LIST` chunk, streamed. Writes are append-only, and the length field is
/// patched by seeking back over the payload once the chunk is finished.
pub struct ChunkWriter<W: Write + Seek> {
    id: ChunkID,
    /// Payload bytes so far, including the subtype. RIFF caps this at 4GiB.
    len: u32,
    /// How far the cursor sits behind the end, while a child chunk patches its length.
    rewind: u32,
    /// Whether the length on disk is behind `len`.
    stale: bool,
    writer: W,
}
impl<W: Write + Seek> ChunkWriter<W> {
    pub fn with_subtype(mut writer: W, id: ChunkID, subtype: ChunkID) -> IOResult<Self> {
        writer.write_all(&header(id, 4))?;
        writer.write_all(&subtype)?;
        Ok(Self {
            id,
            len: 4,
            rewind: 0,
            stale: false,
            writer,
        })
    }
    #[must_use]
    pub fn id(&self) -> ChunkID {
        self.id
    }
    fn overflow(&self) -> IOError {
        IOError::other(anyhow::anyhow!("RIFF chunk {} exceeded 4GiB", self.id))
    }
    /// Must be called with the cursor at the end of the payload.
    fn patch_len(&mut self) -> IOResult<()> {
        let payload = i64::from(self.len);
        self.writer.seek(SeekFrom::Current(-payload - 4))?;
        self.writer.write_all(&self.len.to_le_bytes())?;
        self.writer.seek(SeekFrom::Current(payload))?;
        self.stale = false;
        Ok(())
    }
    /// Patch the length and flush, reporting errors that dropping would swallow.
    pub fn finish(mut self) -> IOResult<()> {
        if self.stale {
            self.patch_len()?;
        }
        self.writer.flush()
    }
}
impl<W: Write + Seek> Drop for ChunkWriter<W> {
    fn drop(&mut self) {
        if self.stale {
            let _ = self.patch_len();
        }
    }
}
impl<W: Write + Seek> Write for ChunkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        let written = self.writer.write(buf)?;
        let count: u32 = written.checked_as().ok_or_else(|| self.overflow())?;
        // Bytes before the end replace what's there, the rest grow the chunk.
        let overwritten = count.min(self.rewind);
        self.rewind -= overwritten;
        let grown = count - overwritten;
        if grown > 0 {
            self.len = self.len.checked_add(grown).ok_or_else(|| self.overflow())?;
            self.stale = true;
        }
        Ok(written)
    }
    fn flush(&mut self) -> IOResult<()> {
        if self.stale {
            self.patch_len()?;
        }
        self.writer.flush()
    }
}
/// Nested chunks seek back through their parent to patch their lengths. Only relative seeks
/// that stay within what has been written are allowed.
impl<W: Write + Seek> Seek for ChunkWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> IOResult<u64> {
        let SeekFrom::Current(delta) = pos else {
            return Err(IOError::other("chunk writers only seek relative to the cursor"));
        };
        let rewind = i64::from(self.rewind) - delta;
        if rewind < 0 || rewind > i64::from(self.len) {
            return Err(IOError::other(anyhow::anyhow!(
                "seek outside of the written part of chunk {}",
                self.id
            )));
        }
        self.writer.seek(SeekFrom::Current(delta))?;
        // In range of `len`, checked above.
        self.rewind = rewind.checked_as().ok_or_else(|| self.overflow())?;
        Ok(u64::from(self.len - self.rewind))
    }
}

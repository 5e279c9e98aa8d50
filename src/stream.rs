//! Stream adapter (spec section 6, "Stream adapter"): the callbacks the core calls on
//! external byte sinks/sources. Two concrete adapters are provided, matching spec section
//! 4.10's "in-memory byte buffer; file (file-descriptor or memory-mapped)": `MemStream` and
//! `FileStream`. Memory-mapped *writing* is left unimplemented; spec section 9's open question
//! declares write-side memory mapping optional, and DESIGN.md records that decision.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// The stream contract the marker layer, Tier-1/Tier-2 engines and bit I/O layer are written
/// against. The host owns the concrete stream; this crate never manages its lifetime beyond
/// the `Stream` object itself (there is no separate destructor callback, unlike the C
/// original — that is what `Drop` is for in Rust).
pub trait Stream {
    /// Reads up to `buf.len()` bytes, returning the number actually read (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `buf`, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Seeks to an absolute offset from the start of the stream.
    fn seek(&mut self, abs_offset: u64) -> Result<()>;

    /// Current absolute offset.
    fn tell(&mut self) -> Result<u64>;

    /// Skips `n` bytes forward without reading them (used to jump over tile-part payloads that
    /// are cached elsewhere — e.g. PPT bodies already consumed via the packet-header cache).
    fn skip(&mut self, n: u64) -> Result<()> {
        let at = self.tell()?;
        self.seek(at + n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Total stream length, when known in advance (a `MemStream` always knows it; a live
    /// socket-backed stream might not).
    fn len(&mut self) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// In-memory byte buffer stream — the adapter used by the conformance tests in spec section 8
/// and by any host that already has the whole codestream in memory.
#[derive(Debug, Default)]
pub struct MemStream {
    buf: Vec<u8>,
    pos: usize,
}

impl MemStream {
    pub fn new() -> Self {
        MemStream {
            buf: Vec::new(),
            pos: 0,
        }
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        MemStream { buf, pos: 0 }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Zero-copy read: hands back a slice directly from the backing buffer instead of copying
    /// into a caller buffer (spec section 6, `zero_copy_read`). Advances the cursor by `n`.
    pub fn zero_copy_read(&mut self, n: usize) -> Option<&[u8]> {
        if self.pos + n > self.buf.len() {
            return None;
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(s)
    }
}

impl Stream for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let avail = self.buf.len().saturating_sub(self.pos);
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.pos == self.buf.len() {
            self.buf.extend_from_slice(buf);
        } else {
            let end = self.pos + buf.len();
            if end > self.buf.len() {
                self.buf.resize(end, 0);
            }
            self.buf[self.pos..end].copy_from_slice(buf);
        }
        self.pos += buf.len();
        Ok(buf.len())
    }

    fn seek(&mut self, abs_offset: u64) -> Result<()> {
        self.pos = abs_offset as usize;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn len(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.buf.len() as u64))
    }
}

/// File-descriptor-backed stream. Memory-mapped *reading* could be layered on top of this via
/// `zero_copy_read`-style slicing of an `mmap`; memory-mapped *writing* is out of scope here
/// (spec section 9 open question, resolved as optional — see DESIGN.md).
pub struct FileStream {
    file: File,
}

impl FileStream {
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(FileStream {
            file: File::open(path)?,
        })
    }

    pub fn create(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(FileStream {
            file: File::create(path)?,
        })
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn seek(&mut self, abs_offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(abs_offset))?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    fn len(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.file.metadata()?.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_stream_round_trip() {
        let mut s = MemStream::new();
        s.write(&[1, 2, 3, 4]).unwrap();
        s.seek(0).unwrap();
        let mut buf = [0u8; 4];
        let n = s.read(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn mem_stream_zero_copy_read() {
        let mut s = MemStream::from_bytes(vec![9, 8, 7, 6]);
        let slice = s.zero_copy_read(2).unwrap();
        assert_eq!(slice, &[9, 8]);
        assert_eq!(s.tell().unwrap(), 2);
    }

    #[test]
    fn mem_stream_skip_advances_without_reading() {
        let mut s = MemStream::from_bytes(vec![1, 2, 3, 4, 5]);
        s.skip(3).unwrap();
        let mut buf = [0u8; 2];
        s.read(&mut buf).unwrap();
        assert_eq!(buf, [4, 5]);
    }
}

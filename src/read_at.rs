use std::fs::File;
use std::io;

use nom::number::Endianness;

use crate::error::{Error, Result};

/// A positional byte source. Reads never move a cursor, so a single source
/// can serve concurrent readers.
pub trait ReadAt {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => break,
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    offset += n as u64;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        if buf.is_empty() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer",
            ))
        }
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        if offset >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

/// A window over a positional byte source, offset 0 of the subset mapping to
/// `start_offset` of the underlying source. Reads are clamped to the window.
pub struct Subset<R: ReadAt> {
    source: R,
    start_offset: u64,
    size: u64,
}

impl<R: ReadAt> Subset<R> {
    pub fn new(source: R, start_offset: u64, size: u64) -> Self {
        Subset {
            source,
            start_offset,
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Reads the entire window into an owned buffer. Handy for pulling a
    /// load-command payload out of an image.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.size as usize];
        self.read_exact_at(&mut buf, 0)?;
        Ok(buf)
    }
}

impl<R: ReadAt> ReadAt for Subset<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let n = buf.len().min((self.size - offset) as usize);
        self.source.read_at(&mut buf[..n], self.start_offset + offset)
    }
}

fn map_read_err(e: io::Error, offset: u64) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::TruncatedInput(offset)
    } else {
        Error::Io(e)
    }
}

pub(crate) fn read_u16_at<R: ReadAt + ?Sized>(
    source: &R,
    endian: Endianness,
    offset: u64,
) -> Result<u16> {
    let mut buf = [0u8; 2];
    source
        .read_exact_at(&mut buf, offset)
        .map_err(|e| map_read_err(e, offset))?;
    Ok(match endian {
        Endianness::Big => u16::from_be_bytes(buf),
        Endianness::Little => u16::from_le_bytes(buf),
        Endianness::Native => u16::from_ne_bytes(buf),
    })
}

pub(crate) fn read_u32_at<R: ReadAt + ?Sized>(
    source: &R,
    endian: Endianness,
    offset: u64,
) -> Result<u32> {
    let mut buf = [0u8; 4];
    source
        .read_exact_at(&mut buf, offset)
        .map_err(|e| map_read_err(e, offset))?;
    Ok(match endian {
        Endianness::Big => u32::from_be_bytes(buf),
        Endianness::Little => u32::from_le_bytes(buf),
        Endianness::Native => u32::from_ne_bytes(buf),
    })
}

pub(crate) fn read_u64_at<R: ReadAt + ?Sized>(
    source: &R,
    endian: Endianness,
    offset: u64,
) -> Result<u64> {
    let mut buf = [0u8; 8];
    source
        .read_exact_at(&mut buf, offset)
        .map_err(|e| map_read_err(e, offset))?;
    Ok(match endian {
        Endianness::Big => u64::from_be_bytes(buf),
        Endianness::Little => u64::from_le_bytes(buf),
        Endianness::Native => u64::from_ne_bytes(buf),
    })
}

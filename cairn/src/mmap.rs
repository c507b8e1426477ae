//! Memory-mapped file (component C9).
//!
//! Grounded on `memmap2`'s usage in ChainSafe/forest (a pack example
//! repo storing large archives via `memmap2::MmapMut`), wrapped in the
//! map/size/data/resize/sync contract §4.8 specifies: resizing is only
//! permitted while the mapping is writable, and dropping the mapping
//! flushes and truncates it to its logical length rather than leaving
//! trailing zero-padding from the last `resize` on disk.
#![cfg(feature = "std")]

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Mmap, MmapMut};

use crate::error::Error;

/// Whether a [`MmapFile`] was opened for reading only or for read-write
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only: [`MmapFile::resize`] is not permitted.
    ReadOnly,
    /// Read-write: the mapping may be resized, and is flushed on drop.
    ReadWrite,
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// A memory-mapped file used as a [`crate::ser::Sink`] (when writable)
/// or as the source buffer for [`crate::de::Verifier`] (either mode).
pub struct MmapFile {
    file: File,
    mapping: Mapping,
    len: u64,
}

impl MmapFile {
    /// Opens `path` read-only and maps its entire current length.
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        // SAFETY: the caller is responsible for not mutating the file
        // out from under this mapping through another handle, per
        // memmap2's documented safety contract for `Mmap::map`.
        let mapping = unsafe { Mmap::map(&file)? };
        Ok(Self {
            file,
            mapping: Mapping::ReadOnly(mapping),
            len,
        })
    }

    /// Opens (creating if necessary) `path` for read-write access,
    /// truncating or growing it to exactly `len` bytes and mapping the
    /// result.
    pub fn open_write(path: impl AsRef<Path>, len: u64) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(len)?;
        // SAFETY: same contract as `open_read`.
        let mapping = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            mapping: Mapping::ReadWrite(mapping),
            len,
        })
    }

    /// Whether this mapping allows resizing.
    pub fn access_mode(&self) -> AccessMode {
        match self.mapping {
            Mapping::ReadOnly(_) => AccessMode::ReadOnly,
            Mapping::ReadWrite(_) => AccessMode::ReadWrite,
        }
    }

    /// The mapping's current logical length in bytes.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// A view of the mapped bytes.
    pub fn data(&self) -> &[u8] {
        match &self.mapping {
            Mapping::ReadOnly(m) => &m[..self.len as usize],
            Mapping::ReadWrite(m) => &m[..self.len as usize],
        }
    }

    /// A mutable view of the mapped bytes, if opened for read-write
    /// access.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.mapping {
            Mapping::ReadOnly(_) => None,
            Mapping::ReadWrite(m) => Some(&mut m[..self.len as usize]),
        }
    }

    /// Grows or shrinks the mapping to `new_len` bytes, remapping the
    /// file as needed.
    ///
    /// Only valid in [`AccessMode::ReadWrite`]; per §4.8, resizing a
    /// read-only mapping is a programmer error, reported as
    /// [`Error::OwnershipViolation`].
    pub fn resize(&mut self, new_len: u64) -> Result<(), Error> {
        if self.access_mode() != AccessMode::ReadWrite {
            return Err(Error::OwnershipViolation(
                "cannot resize a read-only memory-mapped file",
            ));
        }
        self.file.set_len(new_len)?;
        let mapping = unsafe { MmapMut::map_mut(&self.file)? };
        self.mapping = Mapping::ReadWrite(mapping);
        self.len = new_len;
        Ok(())
    }

    /// Flushes any pending writes to disk.
    pub fn sync(&self) -> Result<(), Error> {
        if let Mapping::ReadWrite(m) = &self.mapping {
            m.flush()?;
        }
        Ok(())
    }
}

impl Drop for MmapFile {
    fn drop(&mut self) {
        // Best-effort: a failure here has nowhere left to report to.
        let _ = self.sync();
        if self.access_mode() == AccessMode::ReadWrite {
            let _ = self.file.set_len(self.len);
        }
    }
}

impl crate::ser::Sink for MmapFile {
    type Error = Error;

    fn pos(&self) -> usize {
        self.len as usize
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = self.len;
        let end = start + bytes.len() as u64;
        if end > self.size() {
            self.resize(end)?;
        }
        let data = self
            .data_mut()
            .expect("write requires a read-write mapping");
        data[start as usize..end as usize].copy_from_slice(bytes);
        self.len = self.len.max(end);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error> {
        let end = offset + bytes.len();
        let data = self
            .data_mut()
            .expect("write_at requires a read-write mapping");
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.cairn");

        {
            let mut mapped = MmapFile::open_write(&path, 0).unwrap();
            crate::ser::Sink::write(&mut mapped, b"hello, cairn").unwrap();
            mapped.sync().unwrap();
        }

        let mapped = MmapFile::open_read(&path).unwrap();
        assert_eq!(mapped.data(), b"hello, cairn");
    }

    #[test]
    fn resize_on_read_only_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.cairn");
        std::fs::write(&path, b"fixed").unwrap();

        let mut mapped = MmapFile::open_read(&path).unwrap();
        assert!(mapped.resize(10).is_err());
    }
}

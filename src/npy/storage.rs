//! Memory-mapped regions holding a complete `.npy` image (header and data).

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::{
    fs::{File, OpenOptions},
    io::{self, Write as _},
    path::Path,
};

/// How an existing `.npy` file is mapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Mapped read-only. Writes are rejected.
    #[default]
    ReadOnly,
    /// Mapped shared and writable. Writes reach the file.
    ReadWrite,
    /// Mapped private and writable. Writes stay in memory and never reach
    /// the file.
    CopyOnWrite,
}

impl OpenMode {
    pub(crate) fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true).write(self == Self::ReadWrite);
        options
    }
}

#[derive(Debug)]
pub(crate) enum Storage {
    ReadOnly(Mmap),
    Shared { file: File, map: MmapMut },
    Private(MmapMut),
    Anonymous(MmapMut),
}

// SAFETY (for every `map` call below): the library never truncates a file it
// has mapped, except in `resize`, which replaces the mapping right after. Other
// processes truncating the file while it is mapped is outside our control, as
// with any memory-mapped file.
impl Storage {
    pub(crate) fn open(file: File, mode: OpenMode) -> io::Result<Self> {
        Ok(match mode {
            OpenMode::ReadOnly => Self::ReadOnly(unsafe { Mmap::map(&file)? }),
            OpenMode::ReadWrite => {
                let map = unsafe { MmapMut::map_mut(&file)? };
                Self::Shared { file, map }
            }
            OpenMode::CopyOnWrite => Self::Private(unsafe { MmapOptions::new().map_copy(&file)? }),
        })
    }

    /// Creates (or truncates) the file at `path`, writes `header`, and
    /// zero-extends the file to `len` bytes.
    pub(crate) fn create(path: &Path, header: &[u8], len: usize) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(header)?;
        // Sparse if the filesystem supports it.
        file.set_len(len as u64)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self::Shared { file, map })
    }

    /// Allocates a zeroed region of `len` bytes starting with `header`.
    pub(crate) fn anonymous(header: &[u8], len: usize) -> io::Result<Self> {
        let mut map = MmapMut::map_anon(len)?;
        map[..header.len()].copy_from_slice(header);
        Ok(Self::Anonymous(map))
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Self::ReadOnly(map) => &map[..],
            Self::Shared { map, .. } | Self::Private(map) | Self::Anonymous(map) => &map[..],
        }
    }

    /// Returns `None` for a read-only mapping.
    pub(crate) fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::ReadOnly(_) => None,
            Self::Shared { map, .. } | Self::Private(map) | Self::Anonymous(map) => {
                Some(&mut map[..])
            }
        }
    }

    pub(crate) fn is_writable(&self) -> bool {
        !matches!(self, Self::ReadOnly(_))
    }

    /// Returns `true` if writes reach a file.
    pub(crate) fn is_persistent(&self) -> bool {
        matches!(self, Self::Shared { .. })
    }

    /// Synchronously writes modified pages back to the file.
    pub(crate) fn flush(&self) -> io::Result<()> {
        match self {
            Self::Shared { map, .. } => map.flush(),
            Self::ReadOnly(_) | Self::Private(_) | Self::Anonymous(_) => Ok(()),
        }
    }

    /// Changes the length of the region to `len` bytes and remaps it.
    ///
    /// Bytes beyond the old length are zero. A private mapping is detached
    /// from its file and becomes anonymous.
    pub(crate) fn resize(&mut self, len: usize) -> io::Result<()> {
        let resized = match self {
            Self::ReadOnly(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "cannot resize a read-only mapping",
                ));
            }
            Self::Shared { file, map } => {
                map.flush()?;
                file.set_len(len as u64)?;
                *map = unsafe { MmapMut::map_mut(&*file)? };
                return Ok(());
            }
            Self::Private(map) | Self::Anonymous(map) => {
                let mut resized = MmapMut::map_anon(len)?;
                let keep = map.len().min(len);
                resized[..keep].copy_from_slice(&map[..keep]);
                resized
            }
        };
        *self = Self::Anonymous(resized);
        Ok(())
    }

    /// Flushes a shared mapping, then unmaps.
    pub(crate) fn close(self) -> io::Result<()> {
        self.flush()
    }
}

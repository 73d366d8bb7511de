//! Shared-ownership byte sequences.
//!
//! A [`Blob`] is a byte range plus a shared handle to its backing storage.
//! The backing is either an in-process allocation or a read-only memory map
//! of a file written for cross-process sharing with a remote worker. The
//! storage is freed when the last blob referencing it is dropped.

use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

enum BlobStorage {
    Bytes(Vec<u8>),
    MappedFile { map: Mmap, path: PathBuf },
}

impl BlobStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::MappedFile { map, .. } => map,
        }
    }
}

/// An opaque byte sequence with shared ownership of its backing storage.
///
/// Cloning a blob is cheap: clones share the backing and may view different
/// sub-ranges of it. Two blobs compare equal iff their byte ranges are
/// bytewise equal, regardless of backing.
#[derive(Clone)]
pub struct Blob {
    storage: Arc<BlobStorage>,
    range: Range<usize>,
}

impl Blob {
    /// Creates an empty blob.
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Creates a blob owning the given bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len();
        Self {
            storage: Arc::new(BlobStorage::Bytes(bytes)),
            range: 0..len,
        }
    }

    /// Opens a file as a read-only memory-mapped blob.
    ///
    /// This is the receiving half of cross-process blob sharing: a remote
    /// worker writes the file, this process maps it without copying.
    pub fn open_mapped(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // Safety: the map is read-only and the file is owned by the runtime's
        // shared-blob protocol, which does not truncate files while mapped.
        let map = unsafe { Mmap::map(&file)? };
        let len = map.len();
        Ok(Self {
            storage: Arc::new(BlobStorage::MappedFile { map, path }),
            range: 0..len,
        })
    }

    /// Writes `bytes` to `path` and returns a mapped blob over the result.
    ///
    /// This is the sending half of cross-process blob sharing.
    pub fn create_shared_file(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<Self> {
        std::fs::write(path.as_ref(), bytes)?;
        Self::open_mapped(path)
    }

    /// The byte range this blob views.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage.as_slice()[self.range.clone()]
    }

    /// Length of the byte range in bytes.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the byte range is empty.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Returns a blob viewing a sub-range of this blob's bytes.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(range.end <= self.len(), "blob slice out of bounds");
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        Self {
            storage: Arc::clone(&self.storage),
            range: start..end,
        }
    }

    /// Path of the backing file, if this blob is file-mapped.
    pub fn mapped_path(&self) -> Option<&Path> {
        match &*self.storage {
            BlobStorage::MappedFile { path, .. } => Some(path),
            BlobStorage::Bytes(_) => None,
        }
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Blob) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Blob {}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &*self.storage {
            BlobStorage::Bytes(_) => "bytes",
            BlobStorage::MappedFile { .. } => "mapped",
        };
        write!(f, "Blob({} bytes, {})", self.len(), backing)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes.to_vec())
    }
}

//! Open file descriptors.
use super::{FileError, FileResult};
use crate::FS_OPEN_MAX_COUNT;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
/// Handle to an open file, valid until it is closed.
pub struct Handle {
    id: usize,
}

impl Handle {
    #[must_use]
    #[inline]
    /// Creates a handle from a raw descriptor number.
    ///
    /// Nothing is checked here: an unknown number is reported by the
    /// operation it is used with.
    pub const fn from_raw(id: usize) -> Self {
        Self { id }
    }

    #[must_use]
    #[inline]
    pub const fn id(&self) -> usize {
        self.id
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What a descriptor points to.
pub struct OpenFile {
    /// Root directory slot of the file
    slot: usize,
    /// Generation of the slot when the file was opened
    generation: u32,
    /// Byte offset of the next read or write
    cursor: usize,
}

impl OpenFile {
    #[must_use]
    #[inline]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    #[inline]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Fixed-size descriptor table. Handles are table indices and get reused after `close`.
#[derive(Debug, Clone)]
pub struct FdTable {
    files: [Option<OpenFile>; FS_OPEN_MAX_COUNT],
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FdTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            files: [None; FS_OPEN_MAX_COUNT],
        }
    }

    /// Binds the lowest free handle to the given root directory slot, cursor at 0.
    pub fn open(&mut self, slot: usize, generation: u32) -> FileResult<Handle> {
        let id = self
            .files
            .iter()
            .position(Option::is_none)
            .ok_or(FileError::TooManyOpenFiles)?;
        self.files[id] = Some(OpenFile {
            slot,
            generation,
            cursor: 0,
        });
        Ok(Handle::from_raw(id))
    }

    pub fn close(&mut self, handle: Handle) -> FileResult<OpenFile> {
        self.files
            .get_mut(handle.id())
            .and_then(Option::take)
            .ok_or(FileError::InvalidHandle)
    }

    pub fn get(&self, handle: Handle) -> FileResult<&OpenFile> {
        self.files
            .get(handle.id())
            .and_then(Option::as_ref)
            .ok_or(FileError::InvalidHandle)
    }

    pub fn set_cursor(&mut self, handle: Handle, cursor: usize) -> FileResult<()> {
        let file = self
            .files
            .get_mut(handle.id())
            .and_then(Option::as_mut)
            .ok_or(FileError::InvalidHandle)?;
        file.cursor = cursor;
        Ok(())
    }

    #[must_use]
    /// Returns the number of open descriptors.
    pub fn open_count(&self) -> usize {
        self.files.iter().filter(|file| file.is_some()).count()
    }
}

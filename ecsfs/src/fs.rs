//! ECS150-FS volume engine.
//!
//! On-disk layout, block by block:
//!
//! | Block                        | Content                              |
//! |------------------------------|--------------------------------------|
//! | 0                            | Superblock                           |
//! | 1 ..= `fat_blocks`           | File Allocation Table                |
//! | `root_block`                 | Root directory (128 entries)         |
//! | `data_start` ..              | Data region (`data_blocks` blocks)   |
use crate::BlockDeviceError;
use thiserror::Error;

pub mod dir;
pub mod fat;
pub mod fd;
pub mod io;
pub mod mkfs;
pub mod sb;
pub mod volume;

pub use fd::Handle;
pub use io::WriteOutcome;
pub use volume::{FileInfo, Volume, VolumeInfo};

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum FileError {
    #[error("No volume is mounted")]
    NotMounted,
    #[error("A volume is already mounted")]
    AlreadyMounted,
    #[error("Invalid file name")]
    InvalidName,
    #[error("Invalid handle")]
    InvalidHandle,
    #[error("Handle refers to a deleted file")]
    StaleHandle,
    #[error("Offset is past the end of the file")]
    InvalidOffset,
    #[error("File not found")]
    NotFound,
    #[error("File already exists")]
    AlreadyExists,
    #[error("Too many open files")]
    TooManyOpenFiles,
    #[error("Root directory is full")]
    DirectoryFull,
    #[error("File system is full")]
    NotEnoughSpace,
    #[error("Invalid superblock signature")]
    InvalidSignature,
    #[error("Superblock records {recorded} blocks but the device has {actual}")]
    BlockCountMismatch { recorded: usize, actual: usize },
    #[error("Device size cannot hold a volume")]
    InvalidGeometry,
    #[error("File system is corrupted")]
    CorruptedFs,
    #[error("Device error: {0}")]
    Device(#[from] BlockDeviceError),
}

/// Broad classes of failures, as seen by a caller deciding what to do next.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// The request was malformed or made in the wrong state. Nothing changed.
    Precondition,
    /// No file with the given name. Nothing changed.
    NotFound,
    /// A file with the given name already exists. Nothing changed.
    AlreadyExists,
    /// A fixed-size table or the data region is full.
    Capacity,
    /// The block device failed. The volume should be considered suspect.
    Device,
    /// The on-disk structures are inconsistent.
    Corrupted,
}

impl FileError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotMounted
            | Self::AlreadyMounted
            | Self::InvalidName
            | Self::InvalidHandle
            | Self::StaleHandle
            | Self::InvalidOffset
            | Self::InvalidGeometry => ErrorKind::Precondition,
            Self::NotFound => ErrorKind::NotFound,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::TooManyOpenFiles | Self::DirectoryFull | Self::NotEnoughSpace => {
                ErrorKind::Capacity
            }
            Self::Device(_) => ErrorKind::Device,
            Self::InvalidSignature | Self::BlockCountMismatch { .. } | Self::CorruptedFs => {
                ErrorKind::Corrupted
            }
        }
    }
}

pub type FileResult<T> = Result<T, FileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FileError::NotMounted.kind(), ErrorKind::Precondition);
        assert_eq!(FileError::StaleHandle.kind(), ErrorKind::Precondition);
        assert_eq!(FileError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(FileError::AlreadyExists.kind(), ErrorKind::AlreadyExists);
        assert_eq!(FileError::DirectoryFull.kind(), ErrorKind::Capacity);
        assert_eq!(FileError::TooManyOpenFiles.kind(), ErrorKind::Capacity);
        assert_eq!(
            FileError::from(BlockDeviceError::Io).kind(),
            ErrorKind::Device
        );
        assert_eq!(
            FileError::BlockCountMismatch {
                recorded: 8,
                actual: 9
            }
            .kind(),
            ErrorKind::Corrupted
        );
    }
}

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

extern crate alloc;
pub use ecsfs_core::storage::{BLOCK_SIZE, Block, BlockDevice, BlockDeviceError};

pub mod fs;
pub mod vfs;

/// Maximum number of files in the root directory.
pub const FS_FILE_MAX_COUNT: usize = 128;
/// Maximum number of files open at the same time.
pub const FS_OPEN_MAX_COUNT: usize = 32;
/// Size of the on-disk file name field, terminating NUL included.
pub const FS_FILENAME_LEN: usize = 16;

use crate::storage::{BLOCK_SIZE, Block, BlockDevice, BlockDeviceError};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// A block device backed by a disk image file.
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    block_count: usize,
}

fn io_error(err: &io::Error) -> BlockDeviceError {
    log::error!("disk image I/O failed: {err}");
    BlockDeviceError::Io
}

impl FileDisk {
    /// Opens an existing disk image for reading and writing.
    ///
    /// The image length must be a non-zero multiple of `BLOCK_SIZE`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockDeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| io_error(&err))?;

        let len = file.metadata().map_err(|err| io_error(&err))?.len();
        let len = usize::try_from(len).map_err(|_| BlockDeviceError::InvalidImage)?;
        if len == 0 || len % BLOCK_SIZE != 0 {
            log::error!(
                "{} is not a disk image ({len} bytes is not a multiple of {BLOCK_SIZE})",
                path.display()
            );
            return Err(BlockDeviceError::InvalidImage);
        }

        log::debug!("opened {} ({} blocks)", path.display(), len / BLOCK_SIZE);
        Ok(Self {
            file,
            block_count: len / BLOCK_SIZE,
        })
    }

    /// Creates (or truncates) a zero-filled disk image of `block_count` blocks.
    pub fn create(path: impl AsRef<Path>, block_count: usize) -> Result<Self, BlockDeviceError> {
        if block_count == 0 {
            return Err(BlockDeviceError::InvalidImage);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| io_error(&err))?;
        let len = u64::try_from(block_count * BLOCK_SIZE)
            .map_err(|_| BlockDeviceError::InvalidImage)?;
        file.set_len(len).map_err(|err| io_error(&err))?;
        Ok(Self { file, block_count })
    }

    fn seek_to(&mut self, block: usize) -> Result<(), BlockDeviceError> {
        if block >= self.block_count {
            return Err(BlockDeviceError::OutOfBounds);
        }
        let pos = u64::try_from(block * BLOCK_SIZE).map_err(|_| BlockDeviceError::OutOfBounds)?;
        self.file
            .seek(SeekFrom::Start(pos))
            .map_err(|err| io_error(&err))?;
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    #[inline]
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read(&mut self, dst: &mut Block, block: usize) -> Result<(), BlockDeviceError> {
        self.seek_to(block)?;
        self.file.read_exact(dst).map_err(|err| io_error(&err))
    }

    fn write(&mut self, src: &Block, block: usize) -> Result<(), BlockDeviceError> {
        self.seek_to(block)?;
        self.file.write_all(src).map_err(|err| io_error(&err))
    }

    fn close(mut self) -> Result<(), BlockDeviceError> {
        self.file.flush().map_err(|err| io_error(&err))?;
        self.file.sync_all().map_err(|err| io_error(&err))
    }
}

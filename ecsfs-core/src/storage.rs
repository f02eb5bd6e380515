use thiserror::Error;

/// Size of a single block, in bytes.
///
/// This is the unit of every transfer between the volume and its device.
pub const BLOCK_SIZE: usize = 4096;

/// One block worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
/// An error that can occur when performing block device operations.
pub enum BlockDeviceError {
    #[error("I/O error")]
    Io,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Invalid disk image")]
    InvalidImage,
}

/// A trait for block devices.
///
/// These are fixed-size arrays of `BLOCK_SIZE`-byte blocks, addressed by index
/// `0..block_count()`. Every call transfers exactly one block.
pub trait BlockDevice {
    /// Returns the number of blocks on the device.
    fn block_count(&self) -> usize;

    /// Read the block at index `block` into `dst`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the read operation failed
    /// or if `block` is not smaller than `block_count()`.
    fn read(&mut self, dst: &mut Block, block: usize) -> Result<(), BlockDeviceError>;

    /// Write `src` to the block at index `block`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the write operation failed
    /// or if `block` is not smaller than `block_count()`.
    fn write(&mut self, src: &Block, block: usize) -> Result<(), BlockDeviceError>;

    /// Releases the device, making sure everything written so far reached it.
    fn close(self) -> Result<(), BlockDeviceError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    #[inline]
    fn block_count(&self) -> usize {
        (**self).block_count()
    }

    #[inline]
    fn read(&mut self, dst: &mut Block, block: usize) -> Result<(), BlockDeviceError> {
        (**self).read(dst, block)
    }

    #[inline]
    fn write(&mut self, src: &Block, block: usize) -> Result<(), BlockDeviceError> {
        (**self).write(src, block)
    }
}

use crate::storage::{BLOCK_SIZE, Block, BlockDevice, BlockDeviceError};
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A block device backed by memory.
pub struct RamDisk {
    blocks: Vec<Block>,
}

impl RamDisk {
    #[must_use]
    /// Creates a zero-filled disk of `block_count` blocks.
    pub fn new(block_count: usize) -> Self {
        Self {
            blocks: alloc::vec![[0; BLOCK_SIZE]; block_count],
        }
    }

    /// Builds a disk from a raw image.
    ///
    /// The image length must be a non-zero multiple of `BLOCK_SIZE`.
    pub fn from_bytes(image: &[u8]) -> Result<Self, BlockDeviceError> {
        if image.is_empty() || image.len() % BLOCK_SIZE != 0 {
            return Err(BlockDeviceError::InvalidImage);
        }

        let mut blocks = Vec::with_capacity(image.len() / BLOCK_SIZE);
        for chunk in image.chunks_exact(BLOCK_SIZE) {
            let mut block = [0; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            blocks.push(block);
        }
        Ok(Self { blocks })
    }

    #[must_use]
    #[inline]
    /// Returns the content of a block, if it exists.
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    #[must_use]
    /// Returns the whole disk as one contiguous image.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.blocks.concat()
    }
}

impl BlockDevice for RamDisk {
    #[inline]
    fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn read(&mut self, dst: &mut Block, block: usize) -> Result<(), BlockDeviceError> {
        let src = self.blocks.get(block).ok_or(BlockDeviceError::OutOfBounds)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, src: &Block, block: usize) -> Result<(), BlockDeviceError> {
        let dst = self
            .blocks
            .get_mut(block)
            .ok_or(BlockDeviceError::OutOfBounds)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

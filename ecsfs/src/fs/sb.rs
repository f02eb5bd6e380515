//! Superblock: the volume header stored in block 0.
use super::{FileError, FileResult, fat::FAT_ENTRIES_PER_BLOCK};
use crate::{BLOCK_SIZE, Block, BlockDevice};
use ecsfs_core::static_assert;

/// Block index of the superblock.
pub const SUPERBLOCK_BLOCK: usize = 0;
/// Block index of the first FAT block.
pub const FAT_START_BLOCK: usize = 1;
/// Magic bytes every volume starts with.
pub const SIGNATURE: [u8; 8] = *b"ECS150FS";

const TOTAL_BLOCKS_OFFSET: usize = 8;
const ROOT_BLOCK_OFFSET: usize = 10;
const DATA_START_OFFSET: usize = 12;
const DATA_BLOCKS_OFFSET: usize = 14;
const FAT_BLOCKS_OFFSET: usize = 16;

/// Smallest device a volume fits on: superblock, one FAT block, root directory, one data block.
pub const MIN_TOTAL_BLOCKS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Volume geometry, as recorded in block 0.
pub struct Superblock {
    total_blocks: u16,
    root_block: u16,
    data_start: u16,
    data_blocks: u16,
    fat_blocks: u8,
}

impl Superblock {
    #[must_use]
    #[inline]
    pub const fn new(
        total_blocks: u16,
        root_block: u16,
        data_start: u16,
        data_blocks: u16,
        fat_blocks: u8,
    ) -> Self {
        Self {
            total_blocks,
            root_block,
            data_start,
            data_blocks,
            fat_blocks,
        }
    }

    /// Computes the layout a freshly formatted device of `total_blocks` blocks gets.
    ///
    /// The FAT gets as few blocks as possible while still covering every data block,
    /// and the root directory sits right between the FAT and the data region.
    pub fn layout(total_blocks: usize) -> FileResult<Self> {
        if total_blocks < MIN_TOTAL_BLOCKS {
            return Err(FileError::InvalidGeometry);
        }
        let total = u16::try_from(total_blocks).map_err(|_| FileError::InvalidGeometry)?;

        for fat_blocks in 1..=u8::MAX {
            let Some(data_blocks) = total.checked_sub(2 + u16::from(fat_blocks)) else {
                break;
            };
            if usize::from(data_blocks) <= usize::from(fat_blocks) * FAT_ENTRIES_PER_BLOCK {
                let root_block = 1 + u16::from(fat_blocks);
                let sb = Self::new(total, root_block, root_block + 1, data_blocks, fat_blocks);
                sb.validate(total_blocks).map_err(|_| FileError::InvalidGeometry)?;
                return Ok(sb);
            }
        }

        Err(FileError::InvalidGeometry)
    }

    /// Parses block 0, checking the signature.
    pub fn decode(block: &Block) -> FileResult<Self> {
        if block[..SIGNATURE.len()] != SIGNATURE {
            return Err(FileError::InvalidSignature);
        }

        let read_u16 = |offset: usize| u16::from_le_bytes([block[offset], block[offset + 1]]);
        Ok(Self {
            total_blocks: read_u16(TOTAL_BLOCKS_OFFSET),
            root_block: read_u16(ROOT_BLOCK_OFFSET),
            data_start: read_u16(DATA_START_OFFSET),
            data_blocks: read_u16(DATA_BLOCKS_OFFSET),
            fat_blocks: block[FAT_BLOCKS_OFFSET],
        })
    }

    /// Serializes the superblock. Padding is zeroed.
    pub fn encode(&self, block: &mut Block) {
        block.fill(0);
        block[..SIGNATURE.len()].copy_from_slice(&SIGNATURE);
        let mut write_u16 = |offset: usize, value: u16| {
            block[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        };
        write_u16(TOTAL_BLOCKS_OFFSET, self.total_blocks);
        write_u16(ROOT_BLOCK_OFFSET, self.root_block);
        write_u16(DATA_START_OFFSET, self.data_start);
        write_u16(DATA_BLOCKS_OFFSET, self.data_blocks);
        block[FAT_BLOCKS_OFFSET] = self.fat_blocks;
    }

    /// Checks the geometry against itself and against the device it was read from.
    pub fn validate(&self, device_blocks: usize) -> FileResult<()> {
        let total = self.total_blocks();
        if total != device_blocks {
            return Err(FileError::BlockCountMismatch {
                recorded: total,
                actual: device_blocks,
            });
        }

        let fat_end = FAT_START_BLOCK + self.fat_blocks();
        let data_end = self.data_start() + self.data_blocks();
        let root = self.root_block();

        let valid = self.fat_blocks != 0
            && self.data_blocks != 0
            // Block indices must stay below the end-of-chain marker.
            && self.data_blocks != u16::MAX
            && self.data_blocks() <= self.fat_blocks() * FAT_ENTRIES_PER_BLOCK
            && root >= fat_end
            && root < total
            && self.data_start() >= fat_end
            && data_end <= total
            && !(self.data_start()..data_end).contains(&root);

        if valid {
            Ok(())
        } else {
            log::error!("inconsistent superblock: {self:?}");
            Err(FileError::CorruptedFs)
        }
    }

    /// Reads and validates the superblock of `device`.
    pub fn load<D: BlockDevice>(device: &mut D, bounce: &mut Block) -> FileResult<Self> {
        device.read(bounce, SUPERBLOCK_BLOCK)?;
        let sb = Self::decode(bounce)?;
        sb.validate(device.block_count())?;
        Ok(sb)
    }

    pub fn flush<D: BlockDevice>(&self, device: &mut D, bounce: &mut Block) -> FileResult<()> {
        self.encode(bounce);
        device.write(bounce, SUPERBLOCK_BLOCK)?;
        Ok(())
    }

    #[must_use]
    #[inline]
    pub fn total_blocks(&self) -> usize {
        usize::from(self.total_blocks)
    }

    #[must_use]
    #[inline]
    pub fn root_block(&self) -> usize {
        usize::from(self.root_block)
    }

    #[must_use]
    #[inline]
    /// Returns the device index of data block 0.
    pub fn data_start(&self) -> usize {
        usize::from(self.data_start)
    }

    #[must_use]
    #[inline]
    pub fn data_blocks(&self) -> usize {
        usize::from(self.data_blocks)
    }

    #[must_use]
    #[inline]
    pub fn fat_blocks(&self) -> usize {
        usize::from(self.fat_blocks)
    }
}

static_assert!(FAT_BLOCKS_OFFSET < BLOCK_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let sb = Superblock::layout(65).unwrap();
        assert_eq!(sb.total_blocks(), 65);
        assert_eq!(sb.fat_blocks(), 1);
        assert_eq!(sb.root_block(), 2);
        assert_eq!(sb.data_start(), 3);
        assert_eq!(sb.data_blocks(), 62);

        // 2048 data blocks still fit one FAT block, 2049 do not.
        let sb = Superblock::layout(2051).unwrap();
        assert_eq!((sb.fat_blocks(), sb.data_blocks()), (1, 2048));
        let sb = Superblock::layout(2052).unwrap();
        assert_eq!((sb.fat_blocks(), sb.data_blocks()), (2, 2048));
        assert_eq!(sb.root_block(), 3);
        assert_eq!(sb.data_start(), 4);

        let sb = Superblock::layout(8198).unwrap();
        assert_eq!((sb.fat_blocks(), sb.data_blocks()), (4, 8192));

        assert_eq!(
            Superblock::layout(3).unwrap_err(),
            FileError::InvalidGeometry
        );
        assert_eq!(
            Superblock::layout(70_000).unwrap_err(),
            FileError::InvalidGeometry
        );
    }

    #[test]
    fn test_encode_decode() {
        let sb = Superblock::new(8198, 5, 6, 8192, 4);
        let mut block = [0xFF; BLOCK_SIZE];
        sb.encode(&mut block);

        assert_eq!(&block[..8], b"ECS150FS");
        assert_eq!(&block[8..10], &8198u16.to_le_bytes());
        assert_eq!(block[16], 4);
        assert!(block[17..].iter().all(|&b| b == 0));

        assert_eq!(Superblock::decode(&block).unwrap(), sb);

        block[0] = b'X';
        assert_eq!(
            Superblock::decode(&block).unwrap_err(),
            FileError::InvalidSignature
        );
    }

    #[test]
    fn test_validate() {
        let sb = Superblock::new(65, 2, 3, 62, 1);
        assert!(sb.validate(65).is_ok());
        assert_eq!(
            sb.validate(64).unwrap_err(),
            FileError::BlockCountMismatch {
                recorded: 65,
                actual: 64
            }
        );

        // FAT too small for the data region.
        let sb = Superblock::new(4000, 2, 3, 3997, 1);
        assert_eq!(sb.validate(4000).unwrap_err(), FileError::CorruptedFs);

        // Data region runs past the end of the device.
        let sb = Superblock::new(65, 2, 3, 63, 1);
        assert_eq!(sb.validate(65).unwrap_err(), FileError::CorruptedFs);

        // Root directory inside the FAT.
        let sb = Superblock::new(65, 1, 3, 62, 1);
        assert_eq!(sb.validate(65).unwrap_err(), FileError::CorruptedFs);

        // Root directory inside the data region.
        let sb = Superblock::new(65, 10, 3, 62, 1);
        assert_eq!(sb.validate(65).unwrap_err(), FileError::CorruptedFs);

        let sb = Superblock::new(65, 2, 3, 0, 1);
        assert_eq!(sb.validate(65).unwrap_err(), FileError::CorruptedFs);
    }
}

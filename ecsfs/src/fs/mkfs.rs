//! Volume formatting.
use super::{FileResult, dir::RootDir, fat::FatTable, sb::Superblock};
use crate::{BLOCK_SIZE, Block, BlockDevice};
use alloc::boxed::Box;

/// Lays out an empty volume over the whole device.
///
/// Writes the superblock, every FAT segment and an empty root directory.
/// The data region is left untouched.
pub fn format<D: BlockDevice>(device: &mut D) -> FileResult<Superblock> {
    let sb = Superblock::layout(device.block_count())?;
    let mut bounce: Box<Block> = Box::new([0; BLOCK_SIZE]);

    sb.flush(device, &mut bounce)?;
    FatTable::formatted(&sb).flush(device, &mut bounce)?;
    RootDir::new().flush(device, &sb, &mut bounce)?;

    log::info!(
        "formatted {} blocks: {} FAT block(s), root at {}, {} data blocks from {}",
        sb.total_blocks(),
        sb.fat_blocks(),
        sb.root_block(),
        sb.data_blocks(),
        sb.data_start()
    );
    Ok(sb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileError, fat::FAT_EOC, sb::SIGNATURE};
    use ecsfs_core::disk::RamDisk;

    #[test]
    fn test_format_small() {
        let mut disk = RamDisk::new(65);
        let sb = format(&mut disk).unwrap();
        assert_eq!(sb, Superblock::new(65, 2, 3, 62, 1));

        let block0 = disk.block(0).unwrap();
        assert_eq!(&block0[..8], &SIGNATURE);
        assert!(block0[17..].iter().all(|&b| b == 0));

        let fat = disk.block(1).unwrap();
        assert_eq!(u16::from_le_bytes([fat[0], fat[1]]), FAT_EOC);
        assert!(fat[2..].iter().all(|&b| b == 0));

        let root = RootDir::decode(disk.block(2).unwrap());
        assert_eq!(root.free_count(), crate::FS_FILE_MAX_COUNT);
        assert_eq!(root.iter().count(), 0);
    }

    #[test]
    fn test_format_multi_segment() {
        // 2 + 1 + 2048 blocks fit one FAT block, one more needs a second.
        let mut disk = RamDisk::new(2 + 1 + 2048 + 1);
        let sb = format(&mut disk).unwrap();
        assert_eq!(sb.fat_blocks(), 2);
        assert_eq!(sb.root_block(), 3);
        assert_eq!(sb.data_start(), 4);
        assert_eq!(sb.data_blocks(), 2048);
    }

    #[test]
    fn test_format_too_small() {
        let mut disk = RamDisk::new(3);
        assert_eq!(format(&mut disk).unwrap_err(), FileError::InvalidGeometry);
    }
}

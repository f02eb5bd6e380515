//! Byte-range transfers over a FAT chain.
//!
//! A transfer is cut into [`Extent`]s, one per block it touches. Reads and writes both
//! walk the extents in order while a chain walker follows the file's chain to the
//! matching data block. Whole-block extents move straight between the caller's buffer
//! and the device, partial ones go through a bounce block.
use super::{
    FileError, FileResult,
    fat::{DataBlock, FatEntry, FatTable},
};
use crate::{BLOCK_SIZE, Block, BlockDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Part of a transfer that falls in a single block.
pub struct Extent {
    /// Index of the block within the file
    pub file_block: usize,
    /// Offset within the block
    pub start: usize,
    /// Number of bytes
    pub len: usize,
}

#[derive(Debug, Clone)]
/// Iterator over the extents of the byte range `offset..offset + len`.
pub struct Extents {
    offset: usize,
    remaining: usize,
}

impl Extents {
    #[must_use]
    #[inline]
    pub const fn new(offset: usize, len: usize) -> Self {
        Self {
            offset,
            remaining: len,
        }
    }
}

impl Iterator for Extents {
    type Item = Extent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let start = self.offset % BLOCK_SIZE;
        let extent = Extent {
            file_block: self.offset / BLOCK_SIZE,
            start,
            len: self.remaining.min(BLOCK_SIZE - start),
        };
        self.offset += extent.len;
        self.remaining -= extent.len;
        Some(extent)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = if self.remaining == 0 {
            0
        } else {
            let first_block = self.offset / BLOCK_SIZE;
            let last_block = (self.offset + self.remaining - 1) / BLOCK_SIZE;
            last_block - first_block + 1
        };
        (count, Some(count))
    }
}

impl ExactSizeIterator for Extents {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a transfer lines up with block boundaries.
pub enum TransferShape {
    /// Exactly one whole block
    Aligned,
    /// Within a single block
    SubBlock,
    /// Crosses at least one block boundary
    MultiBlock,
}

impl TransferShape {
    #[must_use]
    pub const fn classify(offset: usize, len: usize) -> Self {
        let start = offset % BLOCK_SIZE;
        if start == 0 && len == BLOCK_SIZE {
            Self::Aligned
        } else if start + len <= BLOCK_SIZE {
            Self::SubBlock
        } else {
            Self::MultiBlock
        }
    }
}

/// Result of a write that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every byte was written.
    Complete(usize),
    /// The volume ran out of free blocks after this many bytes.
    Short(usize),
}

impl WriteOutcome {
    #[must_use]
    #[inline]
    /// Returns how many bytes were written
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Complete(bytes) | Self::Short(bytes) => *bytes,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_short(&self) -> bool {
        matches!(self, Self::Short(_))
    }
}

/// Follows a chain forward, one block at a time.
struct ChainWalker {
    current: DataBlock,
    position: usize,
}

impl ChainWalker {
    const fn new(first: DataBlock) -> Self {
        Self {
            current: first,
            position: 0,
        }
    }

    /// Moves to the `file_block`-th block of the chain.
    ///
    /// The chain must already be long enough.
    fn seek(&mut self, fat: &FatTable, file_block: usize) -> FileResult<DataBlock> {
        debug_assert!(file_block >= self.position);
        while self.position < file_block {
            match fat.get(self.current)? {
                FatEntry::Next(next) => self.current = next,
                FatEntry::EndOfChain | FatEntry::Free => {
                    log::error!(
                        "chain ends at block {} of the file, expected at least {}",
                        self.position,
                        file_block + 1
                    );
                    return Err(FileError::CorruptedFs);
                }
            }
            self.position += 1;
        }
        Ok(self.current)
    }

    /// Moves to the `file_block`-th block of the chain, growing the chain as needed.
    ///
    /// The first `file_blocks` blocks hold the file's bytes and must already be linked.
    /// Only the chain past them may grow.
    fn seek_or_grow(
        &mut self,
        fat: &mut FatTable,
        file_block: usize,
        file_blocks: usize,
    ) -> FileResult<DataBlock> {
        debug_assert!(file_block >= self.position);
        while self.position < file_block {
            self.current = match fat.get(self.current)? {
                FatEntry::Next(next) => next,
                FatEntry::EndOfChain if self.position + 1 >= file_blocks => {
                    fat.extend(self.current)?
                }
                FatEntry::EndOfChain | FatEntry::Free => {
                    log::error!(
                        "chain ends at block {} of the file, size needs {file_blocks}",
                        self.position
                    );
                    return Err(FileError::CorruptedFs);
                }
            };
            self.position += 1;
        }
        Ok(self.current)
    }
}

/// Everything a transfer needs besides the file itself.
pub struct Engine<'a, D: BlockDevice> {
    pub device: &'a mut D,
    pub fat: &'a mut FatTable,
    /// Device index of data block 0
    pub data_start: usize,
    pub bounce: &'a mut Block,
}

/// How far a write got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteProgress {
    /// First block of the file, which the write may have allocated
    pub first: Option<DataBlock>,
    /// Bytes written
    pub written: usize,
    /// Set if the data region filled up
    pub out_of_space: bool,
    /// Set if the write stopped on an error
    pub error: Option<FileError>,
}

impl<D: BlockDevice> Engine<'_, D> {
    #[inline]
    fn device_index(&self, block: DataBlock) -> usize {
        self.data_start + block.index()
    }

    /// Reads `buf.len()` bytes starting at byte `offset` of the chain starting at `first`.
    ///
    /// The caller clips the request to the file size.
    pub fn read(&mut self, first: DataBlock, offset: usize, buf: &mut [u8]) -> FileResult<usize> {
        log::trace!(
            "read {} bytes at {offset} ({:?})",
            buf.len(),
            TransferShape::classify(offset, buf.len())
        );

        let mut walker = ChainWalker::new(first);
        let mut done = 0;
        for extent in Extents::new(offset, buf.len()) {
            let block = walker.seek(self.fat, extent.file_block)?;
            let index = self.device_index(block);
            let dst = &mut buf[done..done + extent.len];

            if let Ok(dst) = <&mut Block>::try_from(&mut *dst) {
                self.device.read(dst, index)?;
            } else {
                self.device.read(self.bounce, index)?;
                dst.copy_from_slice(&self.bounce[extent.start..extent.start + extent.len]);
            }
            done += extent.len;
        }
        Ok(done)
    }

    /// Writes `buf` starting at byte `offset` of the file whose chain starts at `first`
    /// and whose size is `size` bytes.
    ///
    /// A file without blocks gets its first one here. Stops early when the data region
    /// is full or the device fails. Blocks already written stay written; blocks this
    /// call linked in but could not fill are released again.
    pub fn write(
        &mut self,
        first: Option<DataBlock>,
        size: usize,
        offset: usize,
        buf: &[u8],
    ) -> WriteProgress {
        log::trace!(
            "write {} bytes at {offset} ({:?})",
            buf.len(),
            TransferShape::classify(offset, buf.len())
        );

        let mut progress = WriteProgress {
            first,
            written: 0,
            out_of_space: false,
            error: None,
        };
        let file_blocks = size.div_ceil(BLOCK_SIZE);

        let head = match first {
            Some(head) => head,
            None if file_blocks != 0 => {
                log::error!("file of {size} bytes has no data block");
                progress.stop(FileError::CorruptedFs);
                return progress;
            }
            None => match self.fat.alloc() {
                Ok(head) => {
                    progress.first = Some(head);
                    head
                }
                Err(err) => {
                    progress.stop(err);
                    return progress;
                }
            },
        };

        let mut walker = ChainWalker::new(head);
        for extent in Extents::new(offset, buf.len()) {
            let src = &buf[progress.written..progress.written + extent.len];
            match self.write_extent(&mut walker, &extent, src, file_blocks) {
                Ok(()) => progress.written += extent.len,
                Err(err) => {
                    progress.stop(err);
                    break;
                }
            }
        }

        if matches!(progress.error, Some(FileError::Device(_))) {
            let keep = file_blocks.max((offset + progress.written).div_ceil(BLOCK_SIZE));
            if let Err(err) = self.release_tail(&mut progress, keep) {
                log::error!("could not release blocks after a failed write: {err}");
            }
        }
        progress
    }

    /// Cuts the chain of a failed write down to its first `keep` blocks.
    fn release_tail(&mut self, progress: &mut WriteProgress, keep: usize) -> FileResult<()> {
        let Some(head) = progress.first else {
            return Ok(());
        };

        let freed = if keep == 0 {
            let freed = self.fat.free_chain(head)?;
            progress.first = None;
            freed
        } else {
            let tail = ChainWalker::new(head).seek(self.fat, keep - 1)?;
            self.fat.truncate(tail)?
        };
        if freed != 0 {
            log::debug!("released {freed} unwritten block(s)");
        }
        Ok(())
    }

    fn write_extent(
        &mut self,
        walker: &mut ChainWalker,
        extent: &Extent,
        src: &[u8],
        file_blocks: usize,
    ) -> FileResult<()> {
        let block = walker.seek_or_grow(self.fat, extent.file_block, file_blocks)?;
        let index = self.device_index(block);

        if let Ok(src) = <&Block>::try_from(src) {
            self.device.write(src, index)?;
        } else {
            // Keep the bytes of the block this write does not cover.
            self.device.read(self.bounce, index)?;
            self.bounce[extent.start..extent.start + extent.len].copy_from_slice(src);
            self.device.write(self.bounce, index)?;
        }
        Ok(())
    }
}

impl WriteProgress {
    fn stop(&mut self, err: FileError) {
        if err == FileError::NotEnoughSpace {
            self.out_of_space = true;
        } else {
            self.error = Some(err);
        }
    }
}

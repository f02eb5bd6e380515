//! File Allocation Table.
//!
//! On disk the table is split in `fat_blocks` segments of `FAT_ENTRIES_PER_BLOCK`
//! little-endian 16-bit entries. In memory all segments live in one flat array:
//! logical entry `i` sits in segment `i / FAT_ENTRIES_PER_BLOCK`, slot
//! `i % FAT_ENTRIES_PER_BLOCK`.
//!
//! Entry `i` describes data block `i` (data-region relative):
//! `0` means free, `0xFFFF` ends a chain and any other value is the next block of the file.
use super::{FileError, FileResult, sb::FAT_START_BLOCK, sb::Superblock};
use crate::{BLOCK_SIZE, Block, BlockDevice};
use alloc::vec::Vec;

/// Number of FAT entries stored in one block.
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u16>();
/// Raw end-of-chain marker.
pub const FAT_EOC: u16 = 0xFFFF;
const FAT_FREE: u16 = 0;

/// Data block 0 is reserved by the formatter and never handed out,
/// as `0` cannot be used as a "next block" value.
const FIRST_ALLOCATABLE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Index of a block in the data region.
pub struct DataBlock(u16);

impl DataBlock {
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    #[must_use]
    #[inline]
    pub const fn value(&self) -> u16 {
        self.0
    }

    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }

    #[must_use]
    #[inline]
    /// Decodes a stored block pointer, where `FAT_EOC` stands for "no block".
    pub const fn from_pointer(raw: u16) -> Option<Self> {
        if raw == FAT_EOC { None } else { Some(Self(raw)) }
    }

    #[must_use]
    #[inline]
    /// Encodes an optional block pointer, the inverse of [`Self::from_pointer`].
    pub const fn to_pointer(block: Option<Self>) -> u16 {
        match block {
            Some(block) => block.0,
            None => FAT_EOC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Decoded FAT entry
pub enum FatEntry {
    /// Free block
    Free,
    /// Used block, pointing to the next block in the chain
    Next(DataBlock),
    /// Last block in the chain
    EndOfChain,
}

impl FatEntry {
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            FAT_FREE => Self::Free,
            FAT_EOC => Self::EndOfChain,
            next => Self::Next(DataBlock::new(next)),
        }
    }

    #[must_use]
    #[inline]
    pub const fn to_raw(self) -> u16 {
        match self {
            Self::Free => FAT_FREE,
            Self::Next(next) => next.value(),
            Self::EndOfChain => FAT_EOC,
        }
    }
}

/// In-memory FAT.
///
/// The free counter is only ever touched by [`FatTable::set`], so it always matches
/// the number of free allocatable entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    /// All segments, back to back. Entries past `data_blocks` are padding.
    entries: Vec<u16>,
    data_blocks: usize,
    free_count: usize,
}

impl FatTable {
    fn from_entries(entries: Vec<u16>, data_blocks: usize) -> Self {
        debug_assert!(data_blocks <= entries.len());
        let free_count = entries[FIRST_ALLOCATABLE.min(data_blocks)..data_blocks]
            .iter()
            .filter(|&&raw| raw == FAT_FREE)
            .count();
        Self {
            entries,
            data_blocks,
            free_count,
        }
    }

    #[must_use]
    /// Creates the table of a freshly formatted volume: everything free but block 0.
    pub fn formatted(sb: &Superblock) -> Self {
        let mut entries = alloc::vec![FAT_FREE; sb.fat_blocks() * FAT_ENTRIES_PER_BLOCK];
        entries[0] = FAT_EOC;
        Self::from_entries(entries, sb.data_blocks())
    }

    /// Reads every FAT segment of the volume.
    pub fn load<D: BlockDevice>(
        device: &mut D,
        sb: &Superblock,
        bounce: &mut Block,
    ) -> FileResult<Self> {
        let mut entries = Vec::with_capacity(sb.fat_blocks() * FAT_ENTRIES_PER_BLOCK);
        for segment in 0..sb.fat_blocks() {
            device.read(bounce, FAT_START_BLOCK + segment)?;
            entries.extend(
                bounce
                    .chunks_exact(2)
                    .map(|raw| u16::from_le_bytes([raw[0], raw[1]])),
            );
        }
        Ok(Self::from_entries(entries, sb.data_blocks()))
    }

    /// Writes every FAT segment back, in block order.
    pub fn flush<D: BlockDevice>(&self, device: &mut D, bounce: &mut Block) -> FileResult<()> {
        for (segment, entries) in self.entries.chunks_exact(FAT_ENTRIES_PER_BLOCK).enumerate() {
            for (raw, entry) in bounce.chunks_exact_mut(2).zip(entries) {
                raw.copy_from_slice(&entry.to_le_bytes());
            }
            device.write(bounce, FAT_START_BLOCK + segment)?;
        }
        Ok(())
    }

    #[must_use]
    #[inline]
    /// Returns the number of free data blocks.
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    #[must_use]
    #[inline]
    /// Returns the number of entries backed by a real data block.
    pub const fn data_blocks(&self) -> usize {
        self.data_blocks
    }

    /// Returns the entry value for the given block
    pub fn get(&self, block: DataBlock) -> FileResult<FatEntry> {
        if block.index() >= self.data_blocks {
            return Err(FileError::CorruptedFs);
        }

        let entry = FatEntry::from_raw(self.entries[block.index()]);
        match entry {
            FatEntry::Next(next) if next.index() >= self.data_blocks => {
                log::error!("FAT entry {} points past the data region", block.value());
                Err(FileError::CorruptedFs)
            }
            entry => Ok(entry),
        }
    }

    /// Sets the entry value for the given block
    fn set(&mut self, block: DataBlock, entry: FatEntry) -> FileResult<()> {
        let old = self.get(block)?;
        if block.index() >= FIRST_ALLOCATABLE {
            if old == FatEntry::Free && entry != FatEntry::Free {
                self.free_count -= 1;
            } else if old != FatEntry::Free && entry == FatEntry::Free {
                self.free_count += 1;
            }
        }
        self.entries[block.index()] = entry.to_raw();
        Ok(())
    }

    /// Allocates a block, first fit, and marks it as the end of a new chain.
    pub fn alloc(&mut self) -> FileResult<DataBlock> {
        if self.free_count == 0 {
            return Err(FileError::NotEnoughSpace);
        }

        let index = self.entries[FIRST_ALLOCATABLE..self.data_blocks]
            .iter()
            .position(|&raw| raw == FAT_FREE)
            .map(|pos| pos + FIRST_ALLOCATABLE)
            .ok_or(FileError::NotEnoughSpace)?;

        let block = DataBlock::new(u16::try_from(index).map_err(|_| FileError::CorruptedFs)?);
        self.set(block, FatEntry::EndOfChain)?;
        Ok(block)
    }

    /// Allocates a block and links it after `tail`, which must end its chain.
    pub fn extend(&mut self, tail: DataBlock) -> FileResult<DataBlock> {
        if self.get(tail)? != FatEntry::EndOfChain {
            return Err(FileError::CorruptedFs);
        }
        let next = self.alloc()?;
        self.set(tail, FatEntry::Next(next))?;
        Ok(next)
    }

    /// Frees a whole chain, returning how many blocks were released.
    ///
    /// The chain is checked first: a broken one is left exactly as it was.
    pub fn free_chain(&mut self, start: DataBlock) -> FileResult<usize> {
        let blocks = self
            .chain_iter(start)
            .collect::<FileResult<Vec<_>>>()
            .inspect_err(|_| log::error!("chain starting at {} is broken", start.value()))?;

        for &block in &blocks {
            self.set(block, FatEntry::Free)?;
        }
        Ok(blocks.len())
    }

    /// Frees everything after `tail` and makes it the end of its chain.
    pub fn truncate(&mut self, tail: DataBlock) -> FileResult<usize> {
        match self.get(tail)? {
            FatEntry::EndOfChain => Ok(0),
            FatEntry::Next(next) => {
                let freed = self.free_chain(next)?;
                self.set(tail, FatEntry::EndOfChain)?;
                Ok(freed)
            }
            FatEntry::Free => Err(FileError::CorruptedFs),
        }
    }

    #[must_use]
    /// Returns an iterator over all blocks in a chain starting from the given block
    pub const fn chain_iter(&self, start: DataBlock) -> FatChainIter<'_> {
        FatChainIter {
            fat: self,
            next: Some(start),
            remaining: self.data_blocks,
        }
    }
}

/// Iterator over a chain of blocks.
///
/// Yields an error and stops when the chain is broken or longer than the data region.
pub struct FatChainIter<'a> {
    fat: &'a FatTable,
    next: Option<DataBlock>,
    remaining: usize,
}

impl Iterator for FatChainIter<'_> {
    type Item = FileResult<DataBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        if self.remaining == 0 {
            return Some(Err(FileError::CorruptedFs));
        }
        self.remaining -= 1;

        match self.fat.get(current) {
            Ok(FatEntry::Next(next)) => self.next = Some(next),
            Ok(FatEntry::EndOfChain) => {}
            Ok(FatEntry::Free) => return Some(Err(FileError::CorruptedFs)),
            Err(err) => return Some(Err(err)),
        }

        Some(Ok(current))
    }
}

//! Root directory: a single block of fixed-size file entries.
use super::{FileError, FileResult, fat::DataBlock, sb::Superblock};
use crate::{BLOCK_SIZE, Block, BlockDevice, FS_FILE_MAX_COUNT, FS_FILENAME_LEN};
use alloc::{borrow::Cow, boxed::Box, string::String};
use ecsfs_core::static_assert;

/// Size of a root directory entry in bytes
pub const ROOT_ENTRY_SIZE: usize = 32;

const SIZE_OFFSET: usize = FS_FILENAME_LEN;
const FIRST_BLOCK_OFFSET: usize = SIZE_OFFSET + 4;
const PADDING_OFFSET: usize = FIRST_BLOCK_OFFSET + 2;
const PADDING_LEN: usize = ROOT_ENTRY_SIZE - PADDING_OFFSET;

static_assert!(ROOT_ENTRY_SIZE * FS_FILE_MAX_COUNT == BLOCK_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Root directory entry
pub struct RootEntry {
    /// NUL-padded file name, empty for a free entry
    name: [u8; FS_FILENAME_LEN],
    /// File size in bytes
    size: u32,
    /// First data block, `FAT_EOC` if the file has none
    first_block: u16,
    /// Reserved, kept as found on disk
    padding: [u8; PADDING_LEN],
}

impl RootEntry {
    pub const EMPTY: Self = Self {
        name: [0; FS_FILENAME_LEN],
        size: 0,
        first_block: DataBlock::to_pointer(None),
        padding: [0; PADDING_LEN],
    };

    #[must_use]
    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0; FS_FILENAME_LEN];
        name.copy_from_slice(&raw[..FS_FILENAME_LEN]);
        let mut padding = [0; PADDING_LEN];
        padding.copy_from_slice(&raw[PADDING_OFFSET..ROOT_ENTRY_SIZE]);
        Self {
            name,
            size: u32::from_le_bytes([
                raw[SIZE_OFFSET],
                raw[SIZE_OFFSET + 1],
                raw[SIZE_OFFSET + 2],
                raw[SIZE_OFFSET + 3],
            ]),
            first_block: u16::from_le_bytes([raw[FIRST_BLOCK_OFFSET], raw[FIRST_BLOCK_OFFSET + 1]]),
            padding,
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..FS_FILENAME_LEN].copy_from_slice(&self.name);
        raw[SIZE_OFFSET..FIRST_BLOCK_OFFSET].copy_from_slice(&self.size.to_le_bytes());
        raw[FIRST_BLOCK_OFFSET..PADDING_OFFSET].copy_from_slice(&self.first_block.to_le_bytes());
        raw[PADDING_OFFSET..ROOT_ENTRY_SIZE].copy_from_slice(&self.padding);
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is free (unused)
    pub const fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    #[must_use]
    /// Returns the raw name, without its NUL padding
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FS_FILENAME_LEN);
        &self.name[..len]
    }

    #[must_use]
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    #[must_use]
    #[inline]
    /// Returns the file size
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    #[inline]
    /// Returns the first data block, if the file has any
    pub const fn first_block(&self) -> Option<DataBlock> {
        DataBlock::from_pointer(self.first_block)
    }
}

/// Validates a file name and returns its on-disk form.
///
/// Names are non-empty and must leave room for the NUL terminator.
pub fn encode_name(name: &str) -> FileResult<[u8; FS_FILENAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= FS_FILENAME_LEN || bytes.contains(&0) {
        return Err(FileError::InvalidName);
    }
    let mut raw = [0; FS_FILENAME_LEN];
    raw[..bytes.len()].copy_from_slice(bytes);
    Ok(raw)
}

/// In-memory root directory.
///
/// Every slot carries a generation number that changes whenever the slot's file is
/// deleted, so that descriptors opened on the old file can be told apart.
#[derive(Debug, Clone)]
pub struct RootDir {
    entries: Box<[RootEntry; FS_FILE_MAX_COUNT]>,
    generations: [u32; FS_FILE_MAX_COUNT],
    free_count: usize,
}

impl Default for RootDir {
    fn default() -> Self {
        Self::new()
    }
}

impl RootDir {
    #[must_use]
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            entries: Box::new([RootEntry::EMPTY; FS_FILE_MAX_COUNT]),
            generations: [0; FS_FILE_MAX_COUNT],
            free_count: FS_FILE_MAX_COUNT,
        }
    }

    #[must_use]
    pub fn decode(block: &Block) -> Self {
        let mut dir = Self::new();
        for (entry, raw) in dir.entries.iter_mut().zip(block.chunks_exact(ROOT_ENTRY_SIZE)) {
            *entry = RootEntry::decode(raw);
        }
        dir.free_count = dir.entries.iter().filter(|entry| entry.is_free()).count();
        dir
    }

    pub fn encode(&self, block: &mut Block) {
        for (entry, raw) in self
            .entries
            .iter()
            .zip(block.chunks_exact_mut(ROOT_ENTRY_SIZE))
        {
            entry.encode(raw);
        }
    }

    pub fn load<D: BlockDevice>(
        device: &mut D,
        sb: &Superblock,
        bounce: &mut Block,
    ) -> FileResult<Self> {
        device.read(bounce, sb.root_block())?;
        Ok(Self::decode(bounce))
    }

    pub fn flush<D: BlockDevice>(
        &self,
        device: &mut D,
        sb: &Superblock,
        bounce: &mut Block,
    ) -> FileResult<()> {
        self.encode(bounce);
        device.write(bounce, sb.root_block())?;
        Ok(())
    }

    #[must_use]
    #[inline]
    /// Returns the number of free entries.
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    #[must_use]
    #[inline]
    pub fn entry(&self, slot: usize) -> &RootEntry {
        &self.entries[slot]
    }

    #[must_use]
    #[inline]
    pub const fn generation(&self, slot: usize) -> u32 {
        self.generations[slot]
    }

    /// Returns the slot holding the file called `name`.
    pub fn lookup(&self, name: &str) -> FileResult<usize> {
        let raw = encode_name(name)?;
        self.entries
            .iter()
            .position(|entry| !entry.is_free() && entry.name == raw)
            .ok_or(FileError::NotFound)
    }

    /// Claims the first free slot for a new, empty file.
    pub fn create(&mut self, name: &str) -> FileResult<usize> {
        let raw = encode_name(name)?;
        if self
            .entries
            .iter()
            .any(|entry| !entry.is_free() && entry.name == raw)
        {
            return Err(FileError::AlreadyExists);
        }

        let slot = self
            .entries
            .iter()
            .position(RootEntry::is_free)
            .ok_or(FileError::DirectoryFull)?;
        self.entries[slot] = RootEntry {
            name: raw,
            ..RootEntry::EMPTY
        };
        self.free_count -= 1;
        Ok(slot)
    }

    /// Clears a slot and returns what it held.
    ///
    /// The caller is responsible for releasing the file's blocks.
    pub fn remove(&mut self, slot: usize) -> RootEntry {
        let entry = core::mem::replace(&mut self.entries[slot], RootEntry::EMPTY);
        if !entry.is_free() {
            self.free_count += 1;
            self.generations[slot] = self.generations[slot].wrapping_add(1);
        }
        entry
    }

    #[inline]
    pub const fn set_size(&mut self, slot: usize, size: u32) {
        self.entries[slot].size = size;
    }

    #[inline]
    pub const fn set_first_block(&mut self, slot: usize, block: Option<DataBlock>) {
        self.entries[slot].first_block = DataBlock::to_pointer(block);
    }

    /// Returns every used slot with its entry, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RootEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.is_free())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_layout() {
        let mut raw = [0u8; ROOT_ENTRY_SIZE];
        raw[..5].copy_from_slice(b"a.txt");
        raw[16..20].copy_from_slice(&5000u32.to_le_bytes());
        raw[20..22].copy_from_slice(&7u16.to_le_bytes());
        raw[31] = 0xAA;

        let entry = RootEntry::decode(&raw);
        assert!(!entry.is_free());
        assert_eq!(entry.name(), "a.txt");
        assert_eq!(entry.size(), 5000);
        assert_eq!(entry.first_block(), Some(DataBlock::new(7)));

        let mut out = [0u8; ROOT_ENTRY_SIZE];
        entry.encode(&mut out);
        assert_eq!(out, raw);

        assert!(RootEntry::EMPTY.is_free());
        assert_eq!(RootEntry::EMPTY.first_block(), None);
    }

    #[test]
    fn test_names() {
        assert!(encode_name("a").is_ok());
        assert!(encode_name("fifteen_chars__").is_ok());
        assert_eq!(
            encode_name("sixteen_chars___").unwrap_err(),
            FileError::InvalidName
        );
        assert_eq!(encode_name("").unwrap_err(), FileError::InvalidName);
        assert_eq!(encode_name("a\0b").unwrap_err(), FileError::InvalidName);
    }

    #[test]
    fn test_create_lookup_remove() {
        let mut dir = RootDir::new();
        assert_eq!(dir.free_count(), FS_FILE_MAX_COUNT);

        assert_eq!(dir.create("a").unwrap(), 0);
        assert_eq!(dir.create("b").unwrap(), 1);
        assert_eq!(dir.create("a").unwrap_err(), FileError::AlreadyExists);
        assert_eq!(dir.free_count(), FS_FILE_MAX_COUNT - 2);

        assert_eq!(dir.lookup("b").unwrap(), 1);
        assert_eq!(dir.lookup("c").unwrap_err(), FileError::NotFound);
        assert_eq!(dir.entry(1).first_block(), None);
        assert_eq!(dir.entry(1).size(), 0);

        let generation = dir.generation(0);
        let removed = dir.remove(0);
        assert_eq!(removed.name(), "a");
        assert_ne!(dir.generation(0), generation);
        assert_eq!(dir.free_count(), FS_FILE_MAX_COUNT - 1);

        // The first free slot is reused.
        assert_eq!(dir.create("c").unwrap(), 0);
        let names: Vec<_> = dir.iter().map(|(_, entry)| entry.name().into_owned()).collect();
        assert_eq!(names, ["c", "b"]);
    }

    #[test]
    fn test_full_directory() {
        let mut dir = RootDir::new();
        for i in 0..FS_FILE_MAX_COUNT {
            dir.create(&format!("file{i}")).unwrap();
        }
        assert_eq!(dir.free_count(), 0);
        assert_eq!(dir.create("extra").unwrap_err(), FileError::DirectoryFull);
        // Duplicates are reported before fullness.
        assert_eq!(dir.create("file3").unwrap_err(), FileError::AlreadyExists);
    }

    #[test]
    fn test_block_roundtrip() {
        let mut dir = RootDir::new();
        let slot = dir.create("data.bin").unwrap();
        dir.set_size(slot, 12);
        dir.set_first_block(slot, Some(DataBlock::new(3)));

        let mut block = [0xFF; BLOCK_SIZE];
        dir.encode(&mut block);
        let loaded = RootDir::decode(&block);
        assert_eq!(loaded.free_count(), FS_FILE_MAX_COUNT - 1);
        assert_eq!(loaded.entry(slot), dir.entry(slot));
        assert!(loaded.entry(slot + 1).is_free());
    }
}

//! A mounted volume.
use super::{
    FileError, FileResult,
    dir::RootDir,
    fat::{DataBlock, FatTable},
    fd::{FdTable, Handle},
    io::{Engine, WriteOutcome},
    sb::Superblock,
};
use crate::{BLOCK_SIZE, Block, BlockDevice, FS_FILE_MAX_COUNT};
use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt;

/// Geometry and free space of a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub total_blocks: usize,
    pub fat_blocks: usize,
    pub root_block: usize,
    pub data_start: usize,
    pub data_blocks: usize,
    pub free_fat: usize,
    pub free_root: usize,
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FS Info:")?;
        writeln!(f, "total_blk_count={}", self.total_blocks)?;
        writeln!(f, "fat_blk_count={}", self.fat_blocks)?;
        writeln!(f, "rdir_blk={}", self.root_block)?;
        writeln!(f, "data_blk={}", self.data_start)?;
        writeln!(f, "data_blk_count={}", self.data_blocks)?;
        writeln!(f, "fat_free_ratio={}/{}", self.free_fat, self.data_blocks)?;
        writeln!(f, "rdir_free_ratio={}/{FS_FILE_MAX_COUNT}", self.free_root)
    }
}

/// A file, as listed by [`Volume::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: usize,
    pub first_block: Option<DataBlock>,
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file: {}, size: {}, data_blk: {}",
            self.name,
            self.size,
            DataBlock::to_pointer(self.first_block)
        )
    }
}

/// A volume mounted from a block device.
///
/// All metadata lives in memory while mounted and only reaches the device
/// on [`Volume::unmount`]. File data is written through immediately.
pub struct Volume<D: BlockDevice> {
    device: D,
    sb: Superblock,
    fat: FatTable,
    root: RootDir,
    fds: FdTable,
    bounce: Box<Block>,
}

impl<D: BlockDevice> Volume<D> {
    /// Mounts the volume stored on `device`.
    ///
    /// Loads the superblock, the FAT and the root directory, in that order.
    /// Nothing is kept if any of them is invalid.
    pub fn mount(mut device: D) -> FileResult<Self> {
        let mut bounce: Box<Block> = Box::new([0; BLOCK_SIZE]);

        let sb = Superblock::load(&mut device, &mut bounce)?;
        let fat = FatTable::load(&mut device, &sb, &mut bounce)?;
        let root = RootDir::load(&mut device, &sb, &mut bounce)?;

        log::info!(
            "mounted volume: {} blocks, {}/{} data blocks free, {}/{} files free",
            sb.total_blocks(),
            fat.free_count(),
            sb.data_blocks(),
            root.free_count(),
            FS_FILE_MAX_COUNT
        );
        log::debug!("geometry: {sb:?}");

        Ok(Self {
            device,
            sb,
            fat,
            root,
            fds: FdTable::new(),
            bounce,
        })
    }

    /// Writes the superblock, the FAT and the root directory back, then closes the device.
    pub fn unmount(mut self) -> FileResult<()> {
        let open = self.fds.open_count();
        if open != 0 {
            log::warn!("unmounting with {open} open file(s)");
        }

        self.sync()?;
        self.device.close()?;
        log::info!("unmounted volume");
        Ok(())
    }

    /// Writes the superblock, the FAT and the root directory back, in that order.
    pub fn sync(&mut self) -> FileResult<()> {
        self.sb.flush(&mut self.device, &mut self.bounce)?;
        self.fat.flush(&mut self.device, &mut self.bounce)?;
        self.root.flush(&mut self.device, &self.sb, &mut self.bounce)?;
        Ok(())
    }

    #[must_use]
    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            total_blocks: self.sb.total_blocks(),
            fat_blocks: self.sb.fat_blocks(),
            root_block: self.sb.root_block(),
            data_start: self.sb.data_start(),
            data_blocks: self.sb.data_blocks(),
            free_fat: self.fat.free_count(),
            free_root: self.root.free_count(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn fat(&self) -> &FatTable {
        &self.fat
    }

    /// Creates an empty file. No data block is allocated until the first write.
    pub fn create(&mut self, name: &str) -> FileResult<()> {
        let slot = self.root.create(name)?;
        log::debug!("created {name} in slot {slot}");
        Ok(())
    }

    /// Deletes a file and frees its blocks.
    ///
    /// Descriptors still open on the file become stale.
    pub fn delete(&mut self, name: &str) -> FileResult<()> {
        let slot = self.root.lookup(name)?;
        let freed = match self.root.entry(slot).first_block() {
            Some(first) => self.fat.free_chain(first)?,
            None => 0,
        };
        self.root.remove(slot);
        log::debug!("deleted {name}, {freed} block(s) freed");
        Ok(())
    }

    #[must_use]
    /// Returns every file, in directory order.
    pub fn list(&self) -> Vec<FileInfo> {
        self.root
            .iter()
            .map(|(_, entry)| FileInfo {
                name: entry.name().into_owned(),
                size: entry.size() as usize,
                first_block: entry.first_block(),
            })
            .collect()
    }

    pub fn open(&mut self, name: &str) -> FileResult<Handle> {
        let slot = self.root.lookup(name)?;
        let handle = self.fds.open(slot, self.root.generation(slot))?;
        log::debug!("opened {name} as {handle}");
        Ok(handle)
    }

    pub fn close(&mut self, handle: Handle) -> FileResult<()> {
        self.fds.close(handle)?;
        log::debug!("closed {handle}");
        Ok(())
    }

    /// Returns the root directory slot and the cursor behind a handle.
    fn resolve(&self, handle: Handle) -> FileResult<(usize, usize)> {
        let file = self.fds.get(handle)?;
        if self.root.generation(file.slot()) != file.generation() {
            return Err(FileError::StaleHandle);
        }
        Ok((file.slot(), file.cursor()))
    }

    /// Returns the size of the file behind `handle`.
    pub fn stat(&self, handle: Handle) -> FileResult<usize> {
        let (slot, _) = self.resolve(handle)?;
        Ok(self.root.entry(slot).size() as usize)
    }

    /// Returns the cursor of `handle`.
    pub fn tell(&self, handle: Handle) -> FileResult<usize> {
        self.resolve(handle).map(|(_, cursor)| cursor)
    }

    /// Moves the cursor of `handle`. The cursor cannot go past the end of the file.
    pub fn seek(&mut self, handle: Handle, offset: usize) -> FileResult<()> {
        let (slot, _) = self.resolve(handle)?;
        if offset > self.root.entry(slot).size() as usize {
            return Err(FileError::InvalidOffset);
        }
        self.fds.set_cursor(handle, offset)
    }

    /// Reads from the cursor of `handle` into `buf`, returning how many bytes were read.
    ///
    /// Never reads past the end of the file, so this may return less than `buf.len()`.
    pub fn read(&mut self, handle: Handle, buf: &mut [u8]) -> FileResult<usize> {
        let (slot, cursor) = self.resolve(handle)?;
        let entry = self.root.entry(slot);
        let len = buf.len().min((entry.size() as usize).saturating_sub(cursor));
        if len == 0 {
            return Ok(0);
        }
        let first = entry.first_block().ok_or(FileError::CorruptedFs)?;

        let mut engine = Engine {
            device: &mut self.device,
            fat: &mut self.fat,
            data_start: self.sb.data_start(),
            bounce: &mut self.bounce,
        };
        let read = engine.read(first, cursor, &mut buf[..len])?;
        self.fds.set_cursor(handle, cursor + read)?;
        Ok(read)
    }

    /// Writes `buf` at the cursor of `handle`, growing the file as needed.
    ///
    /// Running out of data blocks is not an error: the bytes that fit are written
    /// and [`WriteOutcome::Short`] says how many. On a device error, the file keeps
    /// the bytes written before the failure, blocks it gained but never filled are
    /// freed again, and the error is returned.
    pub fn write(&mut self, handle: Handle, buf: &[u8]) -> FileResult<WriteOutcome> {
        let (slot, cursor) = self.resolve(handle)?;
        if buf.is_empty() {
            return Ok(WriteOutcome::Complete(0));
        }
        let requested = buf.len();
        // Sizes are stored on 32 bits.
        let max_len = usize::try_from(u32::MAX).map_or(usize::MAX, |max| max.saturating_sub(cursor));
        let buf = &buf[..requested.min(max_len)];

        let entry = self.root.entry(slot);
        let (first, size) = (entry.first_block(), entry.size() as usize);
        let mut engine = Engine {
            device: &mut self.device,
            fat: &mut self.fat,
            data_start: self.sb.data_start(),
            bounce: &mut self.bounce,
        };
        let progress = engine.write(first, size, cursor, buf);

        if progress.first != first {
            self.root.set_first_block(slot, progress.first);
        }
        let end = cursor + progress.written;
        if end > size {
            self.root
                .set_size(slot, u32::try_from(end).map_err(|_| FileError::CorruptedFs)?);
        }
        self.fds.set_cursor(handle, end)?;

        if let Some(err) = progress.error {
            return Err(err);
        }
        if progress.written < requested {
            log::warn!(
                "short write on {handle}: {} of {requested} bytes",
                progress.written
            );
            return Ok(WriteOutcome::Short(progress.written));
        }
        Ok(WriteOutcome::Complete(progress.written))
    }
}

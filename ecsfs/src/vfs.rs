//! Mount session.
//!
//! A [`MountPoint`] holds at most one mounted [`Volume`] and forwards every file
//! operation to it, failing with [`FileError::NotMounted`] when it is empty.
use crate::{
    BlockDevice,
    fs::{FileError, FileInfo, FileResult, Handle, Volume, VolumeInfo, WriteOutcome},
};
use alloc::vec::Vec;

/// Slot for the single mounted volume.
pub struct MountPoint<D: BlockDevice> {
    volume: Option<Volume<D>>,
}

impl<D: BlockDevice> Default for MountPoint<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: BlockDevice> MountPoint<D> {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { volume: None }
    }

    #[must_use]
    #[inline]
    pub const fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    #[must_use]
    #[inline]
    /// Returns the mounted volume, if any.
    pub const fn volume(&self) -> Option<&Volume<D>> {
        self.volume.as_ref()
    }

    fn get(&self) -> FileResult<&Volume<D>> {
        self.volume.as_ref().ok_or(FileError::NotMounted)
    }

    fn get_mut(&mut self) -> FileResult<&mut Volume<D>> {
        self.volume.as_mut().ok_or(FileError::NotMounted)
    }

    /// Mounts the volume on `device`.
    ///
    /// On failure nothing is mounted and the device is dropped.
    pub fn mount(&mut self, device: D) -> FileResult<()> {
        if self.is_mounted() {
            return Err(FileError::AlreadyMounted);
        }
        self.volume = Some(Volume::mount(device)?);
        Ok(())
    }

    /// Flushes and unmounts the volume.
    ///
    /// The mount point is empty afterwards, even if flushing failed.
    pub fn unmount(&mut self) -> FileResult<()> {
        self.volume.take().ok_or(FileError::NotMounted)?.unmount()
    }

    pub fn info(&self) -> FileResult<VolumeInfo> {
        self.get().map(Volume::info)
    }

    #[inline]
    pub fn create(&mut self, name: &str) -> FileResult<()> {
        self.get_mut()?.create(name)
    }

    #[inline]
    pub fn delete(&mut self, name: &str) -> FileResult<()> {
        self.get_mut()?.delete(name)
    }

    pub fn list(&self) -> FileResult<Vec<FileInfo>> {
        self.get().map(Volume::list)
    }

    #[inline]
    pub fn open(&mut self, name: &str) -> FileResult<Handle> {
        self.get_mut()?.open(name)
    }

    #[inline]
    pub fn close(&mut self, handle: Handle) -> FileResult<()> {
        self.get_mut()?.close(handle)
    }

    #[inline]
    pub fn stat(&self, handle: Handle) -> FileResult<usize> {
        self.get()?.stat(handle)
    }

    #[inline]
    pub fn tell(&self, handle: Handle) -> FileResult<usize> {
        self.get()?.tell(handle)
    }

    #[inline]
    pub fn seek(&mut self, handle: Handle, offset: usize) -> FileResult<()> {
        self.get_mut()?.seek(handle, offset)
    }

    #[inline]
    pub fn read(&mut self, handle: Handle, buf: &mut [u8]) -> FileResult<usize> {
        self.get_mut()?.read(handle, buf)
    }

    #[inline]
    pub fn write(&mut self, handle: Handle, buf: &[u8]) -> FileResult<WriteOutcome> {
        self.get_mut()?.write(handle, buf)
    }
}

#[cfg(feature = "std")]
impl MountPoint<ecsfs_core::disk::FileDisk> {
    /// Opens the disk image at `path` and mounts it.
    pub fn mount_path(&mut self, path: impl AsRef<std::path::Path>) -> FileResult<()> {
        if self.is_mounted() {
            return Err(FileError::AlreadyMounted);
        }
        let device = ecsfs_core::disk::FileDisk::open(path)?;
        self.mount(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mkfs::format;
    use ecsfs_core::disk::RamDisk;

    #[test]
    fn test_not_mounted() {
        let mut mp = MountPoint::<RamDisk>::new();
        let handle = Handle::from_raw(0);
        assert_eq!(mp.info().unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.create("a").unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.delete("a").unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.list().unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.open("a").unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.close(handle).unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.stat(handle).unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.tell(handle).unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.seek(handle, 0).unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.read(handle, &mut [0; 4]).unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.write(handle, b"x").unwrap_err(), FileError::NotMounted);
        assert_eq!(mp.unmount().unwrap_err(), FileError::NotMounted);
    }

    #[test]
    fn test_mount_twice() {
        let mut disk = RamDisk::new(16);
        format(&mut disk).unwrap();

        let mut mp = MountPoint::new();
        mp.mount(disk.clone()).unwrap();
        assert!(mp.is_mounted());
        assert_eq!(mp.mount(disk).unwrap_err(), FileError::AlreadyMounted);

        mp.unmount().unwrap();
        assert!(!mp.is_mounted());
        assert!(mp.volume().is_none());
    }

    #[test]
    fn test_failed_mount_leaves_nothing() {
        let mut mp = MountPoint::new();
        assert_eq!(
            mp.mount(RamDisk::new(16)).unwrap_err(),
            FileError::InvalidSignature
        );
        assert!(!mp.is_mounted());
    }
}

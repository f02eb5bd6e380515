//! Concrete block devices.

#[cfg(feature = "std")]
mod file;
mod ram;

#[cfg(feature = "std")]
pub use file::FileDisk;
pub use ram::RamDisk;

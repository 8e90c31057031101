//! firmware.rs — the seam between boot logic and platform firmware
//!
//! Every firmware interaction the stage performs is expressed through the
//! two traits here. The production implementation lives in [`crate::efi`];
//! tests substitute scripted doubles. Nothing else in the crate touches
//! firmware tables directly.

use crate::error::BootError;

/// Opaque freshness token issued with each memory map snapshot.
///
/// Stale the moment any later firmware call mutates the memory map; exiting
/// boot services demands the key of the current map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapKey(usize);

impl MapKey {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

/// What a memory map call reports alongside the descriptor bytes.
#[derive(Debug, Clone, Copy)]
pub struct MapMeta {
    /// Bytes of the caller's buffer actually filled.
    pub bytes_used: usize,
    pub key: MapKey,
    /// Stride between records. May exceed the known descriptor prefix.
    pub descriptor_size: usize,
    pub descriptor_version: u32,
}

/// Open disposition for boot volume files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Existing file, read-only.
    Read,
    /// Create if absent, then read and write.
    CreateReadWrite,
}

/// One open handle on the boot volume, directory or file.
///
/// Handles are closed by value so a relinquished handle cannot be reused;
/// all of them die wholesale when boot services exit.
pub trait VolumeFile: Sized {
    /// Opens `path` relative to this handle.
    fn open(&mut self, path: &'static str, mode: FileMode) -> Result<Self, BootError>;

    /// Reads up to `buf.len()` bytes, returning the count delivered.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BootError>;

    /// Writes `buf`, returning the count accepted (may be short).
    fn write(&mut self, buf: &[u8]) -> Result<usize, BootError>;

    /// Exact byte length from file metadata.
    fn byte_size(&mut self) -> Result<u64, BootError>;

    fn close(self);
}

/// The boot services the stage consumes, as one injectable context.
pub trait Firmware {
    type File: VolumeFile;

    /// Fills `buffer` with the current memory map. Each call issues a fresh
    /// map key and invalidates every earlier one.
    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<MapMeta, BootError>;

    /// Root directory of the volume this image was loaded from.
    fn open_boot_volume(&mut self) -> Result<Self::File, BootError>;

    /// Reserves `pages` pages at exactly `base`. There is no fallback
    /// placement; refusal is fatal to the boot.
    fn reserve_fixed_pages(
        &mut self,
        base: u64,
        pages: usize,
        page_size: usize,
    ) -> Result<&'static mut [u8], BootError>;

    /// The one-way exit. On success every firmware service, including the
    /// methods of this trait, is dead.
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), BootError>;
}

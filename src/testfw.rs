//! testfw.rs — scripted firmware double for unit tests
//!
//! Serves a prepared descriptor image, issues monotonically fresh map
//! keys, and fails on cue. The integration suite carries its own richer
//! double with a file volume; this one stays minimal.

use std::collections::VecDeque;

use crate::error::BootError;
use crate::firmware::{FileMode, Firmware, MapKey, MapMeta, VolumeFile};

pub(crate) struct ScriptedFirmware {
    pub map_image: Vec<u8>,
    pub descriptor_size: usize,
    /// One entry consumed per `memory_map` call; `Some` fails the call.
    pub map_script: VecDeque<Option<BootError>>,
    pub map_calls: usize,
    pub issued_keys: Vec<usize>,
    next_key: usize,
    /// One entry consumed per `exit_boot_services` call; `true` refuses it.
    pub exit_script: VecDeque<bool>,
    pub exit_calls: usize,
    pub exit_keys: Vec<usize>,
    pub reservations: Vec<(u64, usize, usize)>,
}

impl ScriptedFirmware {
    pub fn new() -> Self {
        Self::with_map(48, Vec::new())
    }

    pub fn with_map(descriptor_size: usize, map_image: Vec<u8>) -> Self {
        Self {
            map_image,
            descriptor_size,
            map_script: VecDeque::new(),
            map_calls: 0,
            issued_keys: Vec::new(),
            next_key: 0x1000,
            exit_script: VecDeque::new(),
            exit_calls: 0,
            exit_keys: Vec::new(),
            reservations: Vec::new(),
        }
    }
}

impl Firmware for ScriptedFirmware {
    type File = NullFile;

    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<MapMeta, BootError> {
        self.map_calls += 1;
        if let Some(Some(err)) = self.map_script.pop_front() {
            return Err(err);
        }
        if buffer.len() < self.map_image.len() {
            return Err(BootError::FirmwareCallFailed(0x8000_0000_0000_0005));
        }
        buffer[..self.map_image.len()].copy_from_slice(&self.map_image);
        self.next_key += 1;
        self.issued_keys.push(self.next_key);
        Ok(MapMeta {
            bytes_used: self.map_image.len(),
            key: MapKey::new(self.next_key),
            descriptor_size: self.descriptor_size,
            descriptor_version: 1,
        })
    }

    fn open_boot_volume(&mut self) -> Result<NullFile, BootError> {
        Ok(NullFile)
    }

    fn reserve_fixed_pages(
        &mut self,
        base: u64,
        pages: usize,
        page_size: usize,
    ) -> Result<&'static mut [u8], BootError> {
        self.reservations.push((base, pages, page_size));
        Ok(Box::leak(vec![0u8; pages * page_size].into_boxed_slice()))
    }

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), BootError> {
        self.exit_calls += 1;
        self.exit_keys.push(key.raw());
        if self.exit_script.pop_front() == Some(true) {
            return Err(BootError::TerminationFailed(0x8000_0000_0000_0002));
        }
        Ok(())
    }
}

/// File handle for tests that never touch the volume.
pub(crate) struct NullFile;

impl VolumeFile for NullFile {
    fn open(&mut self, path: &'static str, _mode: FileMode) -> Result<Self, BootError> {
        Err(BootError::FileNotFound(path))
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, BootError> {
        Ok(0)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize, BootError> {
        Err(BootError::WriteFailed(0))
    }

    fn byte_size(&mut self) -> Result<u64, BootError> {
        Err(BootError::MetadataUnavailable)
    }

    fn close(self) {}
}

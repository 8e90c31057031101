//! efi.rs — production firmware bindings
//!
//! The one module that talks to UEFI directly, besides the final jump.
//! Raw `r-efi` calls against the boot services table; the rest of the
//! crate only ever sees the [`Firmware`] and [`VolumeFile`] traits.

use core::ffi::c_void;
use core::ptr;

use r_efi::efi;
use r_efi::protocols::{file, loaded_image, simple_file_system};

use crate::config::MAX_PATH;
use crate::error::BootError;
use crate::firmware::{FileMode, Firmware, MapKey, MapMeta, VolumeFile};

// EFI_FILE_INFO fixed fields: size, file size, physical size, three
// 16-byte timestamps, attribute. The name field follows.
const FILE_INFO_FIXED_SIZE: usize = 8 * 3 + 16 * 3 + 8;
const FILE_INFO_BUFFER_SIZE: usize = FILE_INFO_FIXED_SIZE + 2 * MAX_PATH;

/// Boot services context of the running image.
pub struct EfiFirmware {
    image_handle: efi::Handle,
    system_table: *mut efi::SystemTable,
}

impl EfiFirmware {
    /// # Safety
    /// `image_handle` and `system_table` must be the values the firmware
    /// passed to `efi_main`, with boot services still active.
    pub unsafe fn new(image_handle: efi::Handle, system_table: *mut efi::SystemTable) -> Self {
        Self {
            image_handle,
            system_table,
        }
    }

    fn boot_services(&self) -> *mut efi::BootServices {
        unsafe { (*self.system_table).boot_services }
    }

    fn open_protocol(
        &self,
        handle: efi::Handle,
        guid: &efi::Guid,
        which: &'static str,
    ) -> Result<*mut c_void, BootError> {
        let bs = self.boot_services();
        let mut guid = *guid;
        let mut interface: *mut c_void = ptr::null_mut();
        let status = unsafe {
            ((*bs).open_protocol)(
                handle,
                &mut guid,
                &mut interface,
                self.image_handle,
                ptr::null_mut(),
                efi::OPEN_PROTOCOL_BY_HANDLE_PROTOCOL,
            )
        };
        if status.is_error() || interface.is_null() {
            return Err(BootError::ProtocolUnavailable(which));
        }
        Ok(interface)
    }
}

impl Firmware for EfiFirmware {
    type File = EfiFile;

    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<MapMeta, BootError> {
        let bs = self.boot_services();
        let mut map_size = buffer.len();
        let mut map_key: usize = 0;
        let mut descriptor_size: usize = 0;
        let mut descriptor_version: u32 = 0;
        let status = unsafe {
            ((*bs).get_memory_map)(
                &mut map_size,
                buffer.as_mut_ptr().cast::<efi::MemoryDescriptor>(),
                &mut map_key,
                &mut descriptor_size,
                &mut descriptor_version,
            )
        };
        if status.is_error() {
            return Err(BootError::FirmwareCallFailed(status.as_usize()));
        }
        Ok(MapMeta {
            bytes_used: map_size,
            key: MapKey::new(map_key),
            descriptor_size,
            descriptor_version,
        })
    }

    fn open_boot_volume(&mut self) -> Result<EfiFile, BootError> {
        let loaded = self
            .open_protocol(self.image_handle, &loaded_image::PROTOCOL_GUID, "loaded-image")?
            .cast::<loaded_image::Protocol>();
        let device = unsafe { (*loaded).device_handle };

        let fs = self
            .open_protocol(device, &simple_file_system::PROTOCOL_GUID, "simple-file-system")?
            .cast::<simple_file_system::Protocol>();

        let mut root: *mut file::Protocol = ptr::null_mut();
        let status = unsafe { ((*fs).open_volume)(fs, &mut root) };
        if status.is_error() || root.is_null() {
            return Err(BootError::ProtocolUnavailable("volume root"));
        }
        Ok(EfiFile { handle: root })
    }

    fn reserve_fixed_pages(
        &mut self,
        base: u64,
        pages: usize,
        page_size: usize,
    ) -> Result<&'static mut [u8], BootError> {
        let bs = self.boot_services();
        let mut address: efi::PhysicalAddress = base;
        let status = unsafe {
            ((*bs).allocate_pages)(efi::ALLOCATE_ADDRESS, efi::LOADER_DATA, pages, &mut address)
        };
        if status.is_error() {
            return Err(BootError::AllocationFailed(status.as_usize()));
        }
        // Identity-mapped while boot services are active.
        Ok(unsafe { core::slice::from_raw_parts_mut(address as *mut u8, pages * page_size) })
    }

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), BootError> {
        let bs = self.boot_services();
        let status = unsafe { ((*bs).exit_boot_services)(self.image_handle, key.raw()) };
        if status.is_error() {
            return Err(BootError::TerminationFailed(status.as_usize()));
        }
        Ok(())
    }
}

/// Open handle on the boot volume.
pub struct EfiFile {
    handle: *mut file::Protocol,
}

impl VolumeFile for EfiFile {
    fn open(&mut self, path: &'static str, mode: FileMode) -> Result<EfiFile, BootError> {
        let mut encoded = [0u16; MAX_PATH];
        encode_path(path, &mut encoded)?;
        let open_mode = match mode {
            FileMode::Read => file::MODE_READ,
            FileMode::CreateReadWrite => file::MODE_READ | file::MODE_WRITE | file::MODE_CREATE,
        };
        let mut opened: *mut file::Protocol = ptr::null_mut();
        let status = unsafe {
            ((*self.handle).open)(self.handle, &mut opened, encoded.as_mut_ptr(), open_mode, 0)
        };
        if status == efi::Status::NOT_FOUND {
            return Err(BootError::FileNotFound(path));
        }
        if status.is_error() || opened.is_null() {
            return Err(BootError::FileOpenFailed(status.as_usize()));
        }
        Ok(EfiFile { handle: opened })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BootError> {
        let mut len = buf.len();
        let status = unsafe {
            ((*self.handle).read)(self.handle, &mut len, buf.as_mut_ptr().cast::<c_void>())
        };
        if status.is_error() {
            return Err(BootError::FirmwareCallFailed(status.as_usize()));
        }
        Ok(len)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, BootError> {
        let mut len = buf.len();
        let status = unsafe {
            ((*self.handle).write)(self.handle, &mut len, buf.as_ptr() as *mut c_void)
        };
        if status.is_error() {
            return Err(BootError::WriteFailed(status.as_usize()));
        }
        Ok(len)
    }

    fn byte_size(&mut self) -> Result<u64, BootError> {
        let mut info = [0u8; FILE_INFO_BUFFER_SIZE];
        let mut len = info.len();
        let mut guid = file::INFO_ID;
        let status = unsafe {
            ((*self.handle).get_info)(
                self.handle,
                &mut guid,
                &mut len,
                info.as_mut_ptr().cast::<c_void>(),
            )
        };
        if status.is_error() || len < 16 {
            return Err(BootError::MetadataUnavailable);
        }
        // FileSize sits right after the record's own size field.
        let mut size = [0u8; 8];
        size.copy_from_slice(&info[8..16]);
        Ok(u64::from_ne_bytes(size))
    }

    fn close(self) {
        let _ = unsafe { ((*self.handle).close)(self.handle) };
    }
}

/// Encodes an ASCII volume path as NUL-terminated UCS-2.
fn encode_path(path: &'static str, out: &mut [u16]) -> Result<(), BootError> {
    let bytes = path.as_bytes();
    if bytes.len() + 1 > out.len() {
        return Err(BootError::FileOpenFailed(
            efi::Status::INVALID_PARAMETER.as_usize(),
        ));
    }
    for (slot, &byte) in out.iter_mut().zip(bytes.iter()) {
        if byte == 0 || !byte.is_ascii() {
            return Err(BootError::FileOpenFailed(
                efi::Status::INVALID_PARAMETER.as_usize(),
            ));
        }
        *slot = u16::from(byte);
    }
    out[bytes.len()] = 0;
    Ok(())
}

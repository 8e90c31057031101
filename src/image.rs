//! image.rs — kernel image staging
//!
//! - opens the kernel by its configured path and sizes it from metadata
//! - reserves pages at the configured physical base, rounded up to cover
//!   the whole file
//! - copies the file in one read, then validates the header before
//!   trusting the entry-point field it carries

use zerocopy::byteorder::{LittleEndian, U16, U32, U64};
use zerocopy::{FromBytes, Unaligned};

use crate::config::LoadConfig;
use crate::error::BootError;
use crate::firmware::{FileMode, Firmware, VolumeFile};

/// Identification magic at the start of a kernel image.
pub const HEADER_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Fixed header length; also the minimum loadable file size.
pub const HEADER_SIZE: usize = 64;

const CLASS_64BIT: u8 = 2;
const DATA_LITTLE_ENDIAN: u8 = 1;

/// ELF64 file header as it sits on disk, little-endian.
///
/// Only the identification bytes, the declared header size and the entry
/// point are consumed; the rest is carried for layout fidelity. The image
/// is linked at its load base, so program headers are never walked.
#[derive(FromBytes, Unaligned, Clone, Copy)]
#[repr(C)]
pub struct ImageHeader {
    ident: [u8; 16],
    object_type: U16<LittleEndian>,
    machine: U16<LittleEndian>,
    version: U32<LittleEndian>,
    entry: U64<LittleEndian>,
    program_header_offset: U64<LittleEndian>,
    section_header_offset: U64<LittleEndian>,
    flags: U32<LittleEndian>,
    header_size: U16<LittleEndian>,
    program_entry_size: U16<LittleEndian>,
    program_entry_count: U16<LittleEndian>,
    section_entry_size: U16<LittleEndian>,
    section_entry_count: U16<LittleEndian>,
    section_name_index: U16<LittleEndian>,
}

impl ImageHeader {
    /// Decodes and validates the header at the start of `image`.
    pub fn parse(image: &[u8]) -> Result<Self, BootError> {
        if image.len() < HEADER_SIZE {
            return Err(BootError::MalformedImage("shorter than its own header"));
        }
        let header = Self::read_from(&image[..HEADER_SIZE])
            .ok_or(BootError::MalformedImage("undecodable header"))?;
        if header.ident[..4] != HEADER_MAGIC {
            return Err(BootError::MalformedImage("bad magic"));
        }
        if header.ident[4] != CLASS_64BIT {
            return Err(BootError::MalformedImage("not a 64-bit image"));
        }
        if header.ident[5] != DATA_LITTLE_ENDIAN {
            return Err(BootError::MalformedImage("not little-endian"));
        }
        if header.header_size.get() as usize != HEADER_SIZE {
            return Err(BootError::MalformedImage("declared header size mismatch"));
        }
        Ok(header)
    }

    /// Physical address the kernel begins executing at, byte offset 24.
    pub fn entry_point(&self) -> u64 {
        self.entry.get()
    }
}

/// Pages needed to cover `size` bytes at `page_size` granularity.
pub const fn pages_for(size: u64, page_size: usize) -> usize {
    ((size + page_size as u64 - 1) / page_size as u64) as usize
}

/// A kernel staged at its fixed physical base.
#[derive(Debug, Clone, Copy)]
pub struct LoadedImage {
    pub base: u64,
    pub size: u64,
    pub entry_point: u64,
}

/// Opens, sizes, stages and validates the kernel image.
///
/// The image is linked against `config.load_address`, so a refused
/// reservation there is fatal: there is no alternative placement.
pub fn load<F: Firmware>(
    fw: &mut F,
    root: &mut F::File,
    config: &LoadConfig,
) -> Result<LoadedImage, BootError> {
    let mut file = root.open(config.kernel_path, FileMode::Read)?;
    let staged = reserve_and_copy(fw, &mut file, config);
    file.close();
    let (size, pages, region) = staged?;

    let header = ImageHeader::parse(region)?;
    let entry_point = header.entry_point();
    log::info!(
        "kernel staged at {:#x} ({} bytes, {} pages), entry {:#x}",
        config.load_address,
        size,
        pages,
        entry_point,
    );

    Ok(LoadedImage {
        base: config.load_address,
        size,
        entry_point,
    })
}

/// Sizes the file, reserves its pages at the fixed base and copies it in
/// whole. The handle stays with the caller so it is closed on every path.
fn reserve_and_copy<F: Firmware>(
    fw: &mut F,
    file: &mut F::File,
    config: &LoadConfig,
) -> Result<(u64, usize, &'static mut [u8]), BootError> {
    let size = file.byte_size()?;
    if size < HEADER_SIZE as u64 {
        return Err(BootError::MalformedImage("shorter than its own header"));
    }

    let pages = pages_for(size, config.page_size);
    let region = fw.reserve_fixed_pages(config.load_address, pages, config.page_size)?;

    let delivered = file.read(&mut region[..size as usize])?;
    if delivered != size as usize {
        return Err(BootError::ShortRead {
            expected: size as usize,
            got: delivered,
        });
    }
    Ok((size, pages, region))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(entry: u64) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&HEADER_MAGIC);
        bytes[4] = CLASS_64BIT;
        bytes[5] = DATA_LITTLE_ENDIAN;
        bytes[24..32].copy_from_slice(&entry.to_le_bytes());
        bytes[52..54].copy_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
        bytes
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(pages_for(4096, 4096), 1);
        assert_eq!(pages_for(4097, 4096), 2);
        assert_eq!(pages_for(8192, 4096), 2);
        assert_eq!(pages_for(1, 4096), 1);
        assert_eq!(pages_for(0, 4096), 0);
    }

    #[test]
    fn entry_point_reads_little_endian_at_offset_24() {
        let mut bytes = header_bytes(0);
        bytes[24..32].copy_from_slice(&[0x18, 0, 0, 0, 0x10, 0, 0, 0]);
        let header = ImageHeader::parse(&bytes).unwrap();

        assert_eq!(header.entry_point(), 0x0000_0010_0000_0018);
    }

    #[test]
    fn entry_point_round_trips() {
        let header = ImageHeader::parse(&header_bytes(0x10_0018)).unwrap();
        assert_eq!(header.entry_point(), 0x10_0018);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = header_bytes(0x1000);
        bytes[0] = 0x7E;
        assert_eq!(
            ImageHeader::parse(&bytes).err(),
            Some(BootError::MalformedImage("bad magic")),
        );
    }

    #[test]
    fn wrong_class_is_rejected() {
        let mut bytes = header_bytes(0x1000);
        bytes[4] = 1;
        assert_eq!(
            ImageHeader::parse(&bytes).err(),
            Some(BootError::MalformedImage("not a 64-bit image")),
        );
    }

    #[test]
    fn wrong_data_encoding_is_rejected() {
        let mut bytes = header_bytes(0x1000);
        bytes[5] = 2;
        assert_eq!(
            ImageHeader::parse(&bytes).err(),
            Some(BootError::MalformedImage("not little-endian")),
        );
    }

    #[test]
    fn declared_header_size_must_match() {
        let mut bytes = header_bytes(0x1000);
        bytes[52..54].copy_from_slice(&52u16.to_le_bytes());
        assert_eq!(
            ImageHeader::parse(&bytes).err(),
            Some(BootError::MalformedImage("declared header size mismatch")),
        );
    }

    #[test]
    fn truncated_image_is_rejected() {
        let bytes = header_bytes(0x1000);
        assert_eq!(
            ImageHeader::parse(&bytes[..32]).err(),
            Some(BootError::MalformedImage("shorter than its own header")),
        );
    }
}

//! memmap.rs — physical memory map snapshot
//!
//! - captures the firmware descriptor array into a caller-owned buffer
//! - iterates records by the firmware-reported stride, never by a local
//!   `size_of`, because records may carry trailing vendor data
//! - maps raw type tags onto their canonical display names

use zerocopy::FromBytes;

use crate::config::PAGE_SIZE;
use crate::error::BootError;
use crate::firmware::{Firmware, MapKey};

/// The layout every firmware version agrees on. Strides larger than this
/// are honored during iteration; the extra bytes are opaque.
#[derive(FromBytes, Clone, Copy)]
#[repr(C)]
struct RawDescriptor {
    tag: u32,
    _reserved: u32,
    physical_start: u64,
    virtual_start: u64,
    page_count: u64,
    attribute: u64,
}

/// One decoded memory region record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDescriptor {
    pub tag: u32,
    pub physical_start: u64,
    pub virtual_start: u64,
    pub page_count: u64,
    pub attribute: u64,
}

impl MemoryDescriptor {
    /// Decodes the known prefix of one descriptor window. `None` if the
    /// window is narrower than the prefix.
    pub fn parse(window: &[u8]) -> Option<Self> {
        let raw = RawDescriptor::read_from_prefix(window)?;
        Some(Self {
            tag: raw.tag,
            physical_start: raw.physical_start,
            virtual_start: raw.virtual_start,
            page_count: raw.page_count,
            attribute: raw.attribute,
        })
    }

    pub fn memory_type(&self) -> MemoryType {
        MemoryType::from_tag(self.tag)
    }

    pub fn attributes(&self) -> MemoryAttribute {
        MemoryAttribute::from_bits_retain(self.attribute)
    }

    /// True for regions the kernel may freely claim after the handoff:
    /// conventional memory with ordinary write-back caching.
    pub fn is_usable(&self) -> bool {
        self.memory_type() == MemoryType::Conventional
            && self.attributes().contains(MemoryAttribute::WRITE_BACK)
    }
}

/// Closed enumeration of firmware memory region types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Reserved,
    LoaderCode,
    LoaderData,
    BootServicesCode,
    BootServicesData,
    RuntimeServicesCode,
    RuntimeServicesData,
    Conventional,
    Unusable,
    AcpiReclaim,
    AcpiNvs,
    Mmio,
    MmioPortSpace,
    PalCode,
    Persistent,
    /// Sentinel for tags outside the defined range.
    Invalid,
}

impl MemoryType {
    pub const fn from_tag(tag: u32) -> Self {
        match tag {
            0 => Self::Reserved,
            1 => Self::LoaderCode,
            2 => Self::LoaderData,
            3 => Self::BootServicesCode,
            4 => Self::BootServicesData,
            5 => Self::RuntimeServicesCode,
            6 => Self::RuntimeServicesData,
            7 => Self::Conventional,
            8 => Self::Unusable,
            9 => Self::AcpiReclaim,
            10 => Self::AcpiNvs,
            11 => Self::Mmio,
            12 => Self::MmioPortSpace,
            13 => Self::PalCode,
            14 => Self::Persistent,
            _ => Self::Invalid,
        }
    }

    /// Canonical display name, as written into the memory map report.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reserved => "EfiReservedMemoryType",
            Self::LoaderCode => "EfiLoaderCode",
            Self::LoaderData => "EfiLoaderData",
            Self::BootServicesCode => "EfiBootServicesCode",
            Self::BootServicesData => "EfiBootServicesData",
            Self::RuntimeServicesCode => "EfiRuntimeServicesCode",
            Self::RuntimeServicesData => "EfiRuntimeServicesData",
            Self::Conventional => "EfiConventionalMemory",
            Self::Unusable => "EfiUnusableMemory",
            Self::AcpiReclaim => "EfiACPIReclaimMemory",
            Self::AcpiNvs => "EfiACPIMemoryNVS",
            Self::Mmio => "EfiMemoryMappedIO",
            Self::MmioPortSpace => "EfiMemoryMappedIOPortSpace",
            Self::PalCode => "EfiPalCode",
            Self::Persistent => "EfiPersistentMemory",
            Self::Invalid => "InvalidMemoryType",
        }
    }
}

bitflags::bitflags! {
    /// UEFI memory attribute bits: cacheability in the low nibble,
    /// protection and persistence above.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryAttribute: u64 {
        const UNCACHEABLE        = 1 << 0;
        const WRITE_COMBINING    = 1 << 1;
        const WRITE_THROUGH      = 1 << 2;
        const WRITE_BACK         = 1 << 3;
        const UNCACHEABLE_EXPORT = 1 << 4;
        const WRITE_PROTECT      = 1 << 12;
        const READ_PROTECT       = 1 << 13;
        const EXECUTE_PROTECT    = 1 << 14;
        const NON_VOLATILE       = 1 << 15;
        const MORE_RELIABLE      = 1 << 16;
        const READ_ONLY          = 1 << 17;
        const SPECIFIC_PURPOSE   = 1 << 18;
        const CPU_CRYPTO         = 1 << 19;
        const RUNTIME            = 1 << 63;
    }
}

/// Point-in-time copy of the firmware memory map.
///
/// Owns no storage: the caller lends the buffer, and the termination retry
/// refreshes the map into the same bytes. The embedded map key is valid
/// only until the next map-mutating firmware call.
pub struct MemoryMapSnapshot<'a> {
    buffer: &'a mut [u8],
    bytes_used: usize,
    key: MapKey,
    descriptor_size: usize,
    descriptor_version: u32,
}

impl<'a> MemoryMapSnapshot<'a> {
    /// Captures the current memory map into `buffer`.
    ///
    /// A zero-length buffer fails with [`BootError::BufferTooSmall`] before
    /// any firmware call is made.
    pub fn capture<F: Firmware>(fw: &mut F, buffer: &'a mut [u8]) -> Result<Self, BootError> {
        if buffer.is_empty() {
            return Err(BootError::BufferTooSmall);
        }
        let meta = fw.memory_map(buffer)?;
        let snapshot = Self {
            buffer,
            bytes_used: meta.bytes_used,
            key: meta.key,
            descriptor_size: meta.descriptor_size,
            descriptor_version: meta.descriptor_version,
        };
        log::debug!(
            "memory map: {}/{} bytes used, {} records of {} bytes (v{})",
            snapshot.bytes_used,
            snapshot.buffer.len(),
            snapshot.descriptor_count(),
            snapshot.descriptor_size,
            snapshot.descriptor_version,
        );
        Ok(snapshot)
    }

    /// Re-captures the map into the same buffer. The old key is dead
    /// afterwards regardless of the outcome.
    pub fn refresh<F: Firmware>(&mut self, fw: &mut F) -> Result<(), BootError> {
        let meta = fw.memory_map(self.buffer)?;
        self.bytes_used = meta.bytes_used;
        self.key = meta.key;
        self.descriptor_size = meta.descriptor_size;
        self.descriptor_version = meta.descriptor_version;
        Ok(())
    }

    pub fn key(&self) -> MapKey {
        self.key
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn descriptor_size(&self) -> usize {
        self.descriptor_size
    }

    pub fn descriptor_version(&self) -> u32 {
        self.descriptor_version
    }

    /// Number of complete records in the snapshot.
    pub fn descriptor_count(&self) -> usize {
        if self.descriptor_size == 0 {
            0
        } else {
            self.bytes_used / self.descriptor_size
        }
    }

    /// Iterates complete records, advancing by the reported stride. A
    /// trailing partial window is not yielded.
    pub fn descriptors(&self) -> Descriptors<'_> {
        let end = self.bytes_used.min(self.buffer.len());
        Descriptors {
            data: &self.buffer[..end],
            descriptor_size: self.descriptor_size,
        }
    }

    /// Bytes of kernel-claimable memory in the snapshot.
    pub fn usable_bytes(&self) -> u64 {
        self.descriptors()
            .filter(MemoryDescriptor::is_usable)
            .map(|d| d.page_count * PAGE_SIZE as u64)
            .sum()
    }
}

/// Iterator over the records of one snapshot.
pub struct Descriptors<'m> {
    data: &'m [u8],
    descriptor_size: usize,
}

impl Iterator for Descriptors<'_> {
    type Item = MemoryDescriptor;

    fn next(&mut self) -> Option<MemoryDescriptor> {
        if self.descriptor_size == 0 || self.data.len() < self.descriptor_size {
            return None;
        }
        let (window, rest) = self.data.split_at(self.descriptor_size);
        self.data = rest;
        MemoryDescriptor::parse(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfw::ScriptedFirmware;

    fn encode(tag: u32, start: u64, pages: u64, attr: u64, stride: usize) -> Vec<u8> {
        let mut record = vec![0u8; stride];
        record[..4].copy_from_slice(&tag.to_ne_bytes());
        record[8..16].copy_from_slice(&start.to_ne_bytes());
        record[24..32].copy_from_slice(&pages.to_ne_bytes());
        record[32..40].copy_from_slice(&attr.to_ne_bytes());
        record
    }

    fn capture<'a>(
        fw: &mut ScriptedFirmware,
        buffer: &'a mut [u8],
    ) -> MemoryMapSnapshot<'a> {
        MemoryMapSnapshot::capture(fw, buffer).unwrap()
    }

    #[test]
    fn names_match_tags() {
        assert_eq!(MemoryType::from_tag(1).name(), "EfiLoaderCode");
        assert_eq!(MemoryType::from_tag(7).name(), "EfiConventionalMemory");
        assert_eq!(MemoryType::from_tag(14).name(), "EfiPersistentMemory");
        assert_eq!(MemoryType::from_tag(0xFFFF).name(), "InvalidMemoryType");
        assert_eq!(MemoryType::from_tag(15).name(), "InvalidMemoryType");
    }

    #[test]
    fn every_real_name_differs_from_the_sentinel() {
        for tag in 0..15u32 {
            let ty = MemoryType::from_tag(tag);
            assert_ne!(ty, MemoryType::Invalid, "tag {tag}");
            assert_ne!(ty.name(), MemoryType::Invalid.name(), "tag {tag}");
        }
    }

    #[test]
    fn count_is_bytes_over_stride() {
        let stride = 48;
        let mut image = Vec::new();
        for index in 0..3u32 {
            image.extend(encode(index, u64::from(index) * 0x1000, 1, 0xF, stride));
        }
        let mut fw = ScriptedFirmware::with_map(stride, image);
        let mut buffer = [0u8; 4096];
        let snapshot = capture(&mut fw, &mut buffer);

        assert_eq!(snapshot.descriptor_count(), 3);
        assert_eq!(snapshot.descriptors().count(), 3);
    }

    #[test]
    fn partial_tail_window_is_dropped() {
        let stride = 48;
        let mut image = Vec::new();
        for index in 0..4u32 {
            image.extend(encode(index, 0, 1, 0, stride));
        }
        image.extend([0xAA; 30]);
        let mut fw = ScriptedFirmware::with_map(stride, image);
        let mut buffer = [0u8; 4096];
        let snapshot = capture(&mut fw, &mut buffer);

        assert_eq!(snapshot.bytes_used(), 4 * stride + 30);
        assert_eq!(snapshot.descriptor_count(), 4);
        assert_eq!(snapshot.descriptors().count(), 4);
    }

    #[test]
    fn windows_are_contiguous_and_in_order() {
        let stride = 56;
        let mut image = Vec::new();
        for index in 0..5u64 {
            image.extend(encode(index as u32, index * 0x10_0000, index + 1, index, stride));
        }
        let mut fw = ScriptedFirmware::with_map(stride, image);
        let mut buffer = [0u8; 4096];
        let snapshot = capture(&mut fw, &mut buffer);

        let decoded: Vec<_> = snapshot.descriptors().collect();
        assert_eq!(decoded.len(), 5);
        for (index, descriptor) in decoded.iter().enumerate() {
            let index = index as u64;
            assert_eq!(descriptor.tag, index as u32);
            assert_eq!(descriptor.physical_start, index * 0x10_0000);
            assert_eq!(descriptor.page_count, index + 1);
            assert_eq!(descriptor.attribute, index);
        }
    }

    #[test]
    fn stride_beyond_prefix_keeps_fields_intact() {
        let stride = 64;
        let mut record = encode(7, 0x20_0000, 0x40, 0xF, stride);
        for byte in record[40..].iter_mut() {
            *byte = 0x5A;
        }
        let mut fw = ScriptedFirmware::with_map(stride, record);
        let mut buffer = [0u8; 256];
        let snapshot = capture(&mut fw, &mut buffer);

        let only: Vec<_> = snapshot.descriptors().collect();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].physical_start, 0x20_0000);
        assert_eq!(only[0].page_count, 0x40);
    }

    #[test]
    fn empty_buffer_is_rejected_before_any_call() {
        let mut fw = ScriptedFirmware::new();
        let mut buffer = [0u8; 0];
        let result = MemoryMapSnapshot::capture(&mut fw, &mut buffer);

        assert_eq!(result.err(), Some(BootError::BufferTooSmall));
        assert_eq!(fw.map_calls, 0);
    }

    #[test]
    fn refresh_replaces_the_key() {
        let mut fw = ScriptedFirmware::with_map(48, encode(7, 0, 1, 0xF, 48));
        let mut buffer = [0u8; 256];
        let mut snapshot = capture(&mut fw, &mut buffer);

        let first = snapshot.key();
        snapshot.refresh(&mut fw).unwrap();
        assert_ne!(snapshot.key(), first);
        assert_eq!(fw.map_calls, 2);
    }

    #[test]
    fn usable_memory_requires_write_back_conventional() {
        let stride = 48;
        let mut image = Vec::new();
        image.extend(encode(7, 0x10_0000, 0x10, 0xF, stride));
        image.extend(encode(7, 0x20_0000, 0x10, 0x1, stride));
        image.extend(encode(1, 0x30_0000, 0x10, 0xF, stride));
        let mut fw = ScriptedFirmware::with_map(stride, image);
        let mut buffer = [0u8; 4096];
        let snapshot = capture(&mut fw, &mut buffer);

        assert_eq!(snapshot.usable_bytes(), 0x10 * 4096);
    }
}

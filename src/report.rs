//! report.rs — memory map report file
//!
//! Writes the snapshot as a CSV-shaped table the kernel team has been
//! reading for years: index, raw tag, type name, physical start, page
//! count, masked attributes. Purely diagnostic; the boot goes on if any
//! of this fails.

use core::fmt::{self, Write as _};

use crate::error::BootError;
use crate::firmware::{FileMode, VolumeFile};
use crate::memmap::{MemoryDescriptor, MemoryMapSnapshot};

/// First line of the report file.
pub const REPORT_HEADER: &str = "Index, Type, Type(name), PhysicalStart, NumberOfPages, Attribute\n";

/// Attribute bits shown in the report. Only the low 20 bits carry the
/// cacheability and protection flags worth eyeballing.
pub const ATTRIBUTE_DISPLAY_MASK: u64 = 0xF_FFFF;

const LINE_CAPACITY: usize = 256;

/// Fixed-capacity row buffer; formatting past capacity errors out instead
/// of allocating.
struct ReportLine {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl ReportLine {
    const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for ReportLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > LINE_CAPACITY {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

fn render_row(line: &mut ReportLine, index: usize, descriptor: &MemoryDescriptor) -> fmt::Result {
    line.clear();
    writeln!(
        line,
        "{}, {:x}, {}, {:08x}, {:x}, {:x}",
        index,
        descriptor.tag,
        descriptor.memory_type().name(),
        descriptor.physical_start,
        descriptor.page_count,
        descriptor.attribute & ATTRIBUTE_DISPLAY_MASK,
    )
}

fn write_all<W: VolumeFile>(file: &mut W, mut bytes: &[u8]) -> Result<(), BootError> {
    while !bytes.is_empty() {
        let accepted = file.write(bytes)?;
        if accepted == 0 {
            return Err(BootError::WriteFailed(0));
        }
        bytes = &bytes[accepted..];
    }
    Ok(())
}

fn write_table<W: VolumeFile>(
    snapshot: &MemoryMapSnapshot<'_>,
    file: &mut W,
) -> Result<(), BootError> {
    write_all(file, REPORT_HEADER.as_bytes())?;
    let mut line = ReportLine::new();
    for (index, descriptor) in snapshot.descriptors().enumerate() {
        render_row(&mut line, index, &descriptor).map_err(|_| BootError::WriteFailed(0))?;
        write_all(file, line.as_bytes())?;
    }
    Ok(())
}

/// Writes the snapshot table to `path` on the boot volume.
///
/// The handle is closed before returning, error or not. Callers treat a
/// failure as diagnostic and keep booting.
pub fn save_memory_map<W: VolumeFile>(
    snapshot: &MemoryMapSnapshot<'_>,
    root: &mut W,
    path: &'static str,
) -> Result<(), BootError> {
    let mut file = root.open(path, FileMode::CreateReadWrite)?;
    let outcome = write_table(snapshot, &mut file);
    file.close();
    outcome
}

//! console.rs — firmware text console logging
//!
//! `log` backend over the boot services text output protocol. Lines are
//! converted to UCS-2 with CRLF endings and flushed in small chunks, no
//! allocator involved. Dead the moment boot services exit; nothing in the
//! crate logs after that point.

use core::fmt::{self, Write};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use r_efi::efi;
use r_efi::protocols::simple_text_output;

static CON_OUT: AtomicPtr<simple_text_output::Protocol> = AtomicPtr::new(ptr::null_mut());

static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let out = CON_OUT.load(Ordering::Acquire);
        if out.is_null() {
            return;
        }
        let mut writer = ConsoleWriter { out };
        let _ = writeln!(writer, "[{:>5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

struct ConsoleWriter {
    out: *mut simple_text_output::Protocol,
}

impl ConsoleWriter {
    fn flush_chunk(&mut self, chunk: &mut [u16; 64], used: &mut usize) -> fmt::Result {
        if *used == 0 {
            return Ok(());
        }
        chunk[*used] = 0;
        let status = unsafe { ((*self.out).output_string)(self.out, chunk.as_mut_ptr()) };
        *used = 0;
        if status.is_error() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut chunk = [0u16; 64];
        let mut used = 0;
        for ch in s.chars() {
            // One slot stays free for the terminator.
            if used + 2 >= chunk.len() {
                self.flush_chunk(&mut chunk, &mut used)?;
            }
            if ch == '\n' {
                chunk[used] = u16::from(b'\r');
                used += 1;
            }
            chunk[used] = if (ch as u32) < 0x1_0000 {
                ch as u16
            } else {
                u16::from(b'?')
            };
            used += 1;
        }
        self.flush_chunk(&mut chunk, &mut used)
    }
}

/// Points the logger at the firmware console and installs it.
///
/// # Safety
/// `system_table` must be the table passed to `efi_main`, with boot
/// services still active.
pub unsafe fn init(system_table: *mut efi::SystemTable) {
    if system_table.is_null() {
        return;
    }
    let con_out = unsafe { (*system_table).con_out };
    CON_OUT.store(con_out, Ordering::Release);
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);
}

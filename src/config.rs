//! config.rs — load-time configuration
//!
//! The stage is deliberately free of compiled-in literals: every address,
//! size and path the loader consumes arrives through [`LoadConfig`], so
//! tests can drive it against synthetic values. The constants here are the
//! production defaults shared with the kernel's link step.

/// Physical address the kernel image is linked against and loaded at.
pub const DEFAULT_LOAD_ADDRESS: u64 = 0x10_0000;

/// Page granularity of the firmware allocator.
pub const PAGE_SIZE: usize = 4096;

/// Capacity of the caller-owned memory map buffer. Sized generously; the
/// map on current firmware runs a few KiB.
pub const MEMORY_MAP_BUFFER_SIZE: usize = 4096 * 4;

/// Boot volume path of the kernel image.
pub const KERNEL_PATH: &str = "\\kernel.elf";

/// Boot volume path of the memory map report.
pub const REPORT_PATH: &str = "\\memmap";

/// Longest volume path the stage will encode, in UTF-16 units including
/// the terminator. Bounds the metadata scratch buffer at compile time.
pub const MAX_PATH: usize = 64;

/// Inputs of one boot attempt.
#[derive(Debug, Clone, Copy)]
pub struct LoadConfig {
    /// Where the kernel lands. Must match the image's link base.
    pub load_address: u64,
    /// Must match the firmware page granularity.
    pub page_size: usize,
    pub kernel_path: &'static str,
    pub report_path: &'static str,
}

impl LoadConfig {
    pub const fn new() -> Self {
        Self {
            load_address: DEFAULT_LOAD_ADDRESS,
            page_size: PAGE_SIZE,
            kernel_path: KERNEL_PATH,
            report_path: REPORT_PATH,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self::new()
    }
}

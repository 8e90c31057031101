//! error.rs — boot stage failure conditions

use core::fmt;

/// Everything that can go wrong between firmware entry and the kernel jump.
///
/// Raw firmware status words are carried as `usize` so the console report
/// can show them without depending on any FFI type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// No buffer was supplied for the memory map snapshot.
    BufferTooSmall,
    /// A firmware service call returned an error status.
    FirmwareCallFailed(usize),
    /// A required protocol is missing from the handle it was expected on.
    ProtocolUnavailable(&'static str),
    /// The named file does not exist on the boot volume.
    FileNotFound(&'static str),
    /// The file exists but could not be opened.
    FileOpenFailed(usize),
    /// File metadata could not be queried or did not fit its buffer.
    MetadataUnavailable,
    /// The fixed-address page reservation was refused.
    AllocationFailed(usize),
    /// The firmware refused to exit boot services.
    TerminationFailed(usize),
    /// A write to the diagnostic file failed.
    WriteFailed(usize),
    /// The kernel file delivered fewer bytes than its metadata promised.
    ShortRead { expected: usize, got: usize },
    /// The kernel image failed header validation.
    MalformedImage(&'static str),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "no buffer supplied for the memory map"),
            Self::FirmwareCallFailed(status) => {
                write!(f, "firmware call failed (status {status:#x})")
            }
            Self::ProtocolUnavailable(which) => write!(f, "protocol unavailable: {which}"),
            Self::FileNotFound(path) => write!(f, "file not found: {path}"),
            Self::FileOpenFailed(status) => write!(f, "file open failed (status {status:#x})"),
            Self::MetadataUnavailable => write!(f, "file metadata query failed"),
            Self::AllocationFailed(status) => {
                write!(f, "fixed-address reservation refused (status {status:#x})")
            }
            Self::TerminationFailed(status) => {
                write!(f, "boot services exit refused (status {status:#x})")
            }
            Self::WriteFailed(status) => write!(f, "file write failed (status {status:#x})"),
            Self::ShortRead { expected, got } => {
                write!(f, "short read: expected {expected} bytes, got {got}")
            }
            Self::MalformedImage(reason) => write!(f, "malformed kernel image: {reason}"),
        }
    }
}

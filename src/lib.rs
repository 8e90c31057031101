//! slipway-boot — UEFI pre-kernel boot stage
//!
//! Captures the firmware memory map, stages the kernel image at a fixed
//! physical address, writes a memory-map report back to the boot volume,
//! and leaves boot services with a proof of termination in hand.
//!
//! Firmware access goes through the [`firmware::Firmware`] and
//! [`firmware::VolumeFile`] traits; [`efi::EfiFirmware`] is the real
//! UEFI backing and everything above it runs on the host under test.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod console;
pub mod efi;
pub mod error;
pub mod firmware;
pub mod handoff;
pub mod image;
pub mod memmap;
pub mod report;
pub mod stage;
pub mod termination;

#[cfg(test)]
mod testfw;

pub use config::LoadConfig;
pub use error::BootError;

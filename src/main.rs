//! main.rs — UEFI entry
//!
//! Thin shell around [`slipway_boot::stage::run`]: bring up the console
//! logger, run the staging sequence, then either jump to the kernel or
//! halt on a fatal error.

#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

use r_efi::efi;

use slipway_boot::config::{LoadConfig, MEMORY_MAP_BUFFER_SIZE};
use slipway_boot::efi::EfiFirmware;
use slipway_boot::{console, handoff, stage};

#[export_name = "efi_main"]
pub extern "efiapi" fn efi_main(
    image_handle: efi::Handle,
    system_table: *mut efi::SystemTable,
) -> efi::Status {
    unsafe { console::init(system_table) };
    log::info!("slipway-boot {}", env!("CARGO_PKG_VERSION"));

    let mut firmware = unsafe { EfiFirmware::new(image_handle, system_table) };
    let config = LoadConfig::new();
    let mut map_buffer = [0u8; MEMORY_MAP_BUFFER_SIZE];

    match stage::run(&mut firmware, &config, &mut map_buffer) {
        Ok(handoff) => unsafe { handoff::enter(handoff) },
        Err(err) => {
            // Boot services may already be gone; the logger stops
            // printing once the console pointer is dead anyway.
            log::error!("boot failed: {}", err);
            handoff::halt()
        }
    }
}

#[cfg(target_os = "uefi")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("panic: {}", info);
    handoff::halt()
}

#[cfg(not(target_os = "uefi"))]
fn main() {}

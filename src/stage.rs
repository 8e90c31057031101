//! stage.rs — the boot sequence
//!
//! Strict order: snapshot, volume, report, kernel, exit. Only the report
//! step may fail without ending the boot; everything else is fatal because
//! there is nothing to hand off to without it.

use crate::config::LoadConfig;
use crate::error::BootError;
use crate::firmware::{Firmware, VolumeFile};
use crate::image::{self, LoadedImage};
use crate::memmap::MemoryMapSnapshot;
use crate::report;
use crate::termination::{Terminated, Termination};

/// Everything the jump needs once firmware is gone.
pub struct Handoff {
    pub image: LoadedImage,
    pub terminated: Terminated,
}

/// Runs the stage through the boot services exit.
///
/// On `Ok` the platform has no firmware services left; the caller must
/// jump to the entry point without touching anything else. On `Err` boot
/// services may or may not survive, and the only sane reaction is to
/// report and halt.
pub fn run<F: Firmware>(
    fw: &mut F,
    config: &LoadConfig,
    map_buffer: &mut [u8],
) -> Result<Handoff, BootError> {
    let mut snapshot = MemoryMapSnapshot::capture(fw, map_buffer)?;
    log::info!(
        "memory map captured: {} regions, {} MiB usable",
        snapshot.descriptor_count(),
        snapshot.usable_bytes() >> 20,
    );

    let mut root = fw.open_boot_volume()?;

    match report::save_memory_map(&snapshot, &mut root, config.report_path) {
        Ok(()) => log::info!("memory map saved to {}", config.report_path),
        Err(err) => log::warn!("memory map report skipped: {err}"),
    }

    let loaded = image::load(fw, &mut root, config);
    root.close();
    let image = loaded?;

    log::info!("exiting boot services");
    let terminated = Termination::new().run(fw, &mut snapshot)?;

    Ok(Handoff { image, terminated })
}

//! handoff.rs — entry transfer
//!
//! Nothing here may call firmware: everything past [`Terminated`] runs on
//! bare metal. The halt loops below are the only unbounded loops in the
//! crate, and only the entry binary reaches them.

use crate::stage::Handoff;

/// Kernel entry: no arguments, and by contract it never returns.
pub type EntryFn = extern "C" fn();

/// Jumps to the staged kernel.
///
/// Consumes the [`Terminated`](crate::termination::Terminated) proof inside
/// `handoff`. Should the kernel ever return, the CPU is halted; there is no
/// caller left to fall back to.
///
/// # Safety
/// `handoff.image.entry_point` must be the entry of an image staged at its
/// link base, and the platform must be in the post-exit state the kernel
/// expects.
pub unsafe fn enter(handoff: Handoff) -> ! {
    let entry: EntryFn = unsafe { core::mem::transmute(handoff.image.entry_point as usize) };
    entry();
    halt()
}

/// Stops the CPU permanently.
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(target_arch = "x86_64"))]
        core::hint::spin_loop();
    }
}

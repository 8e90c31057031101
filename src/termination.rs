//! termination.rs — boot services exit with bounded retry
//!
//! - the first attempt spends the snapshot's existing map key
//! - a stale key buys exactly one refresh and one retry
//! - two refusals end the boot; a third attempt is never made, since it
//!   would need yet another snapshot that could go stale the same way

use crate::error::BootError;
use crate::firmware::Firmware;
use crate::memmap::MemoryMapSnapshot;

/// Progress of the exit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    /// Boot services still usable.
    Active,
    /// Exit requested, outcome pending.
    Terminating,
    /// Boot services are gone. The irreversible side.
    Terminated,
    /// Both attempts refused. Nothing left but to halt.
    Fatal,
}

/// Proof that boot services have been exited.
///
/// Only [`Termination::run`] mints one, and the kernel handoff demands it,
/// so a jump cannot be written ahead of the exit.
pub struct Terminated(());

/// Bounded-retry driver for the exit call.
#[derive(Debug)]
pub struct Termination {
    state: TerminationState,
    attempts: u8,
}

impl Termination {
    pub const fn new() -> Self {
        Self {
            state: TerminationState::Active,
            attempts: 0,
        }
    }

    pub fn state(&self) -> TerminationState {
        self.state
    }

    /// Exit calls made so far. Never exceeds two.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Drives the exit to `Terminated` or `Fatal`.
    ///
    /// The snapshot is refreshed in place between the attempts: any
    /// allocation since the capture (the kernel reservation in particular)
    /// stales the key the firmware will accept.
    pub fn run<F: Firmware>(
        &mut self,
        fw: &mut F,
        snapshot: &mut MemoryMapSnapshot<'_>,
    ) -> Result<Terminated, BootError> {
        self.state = TerminationState::Terminating;

        self.attempts = 1;
        let refusal = match fw.exit_boot_services(snapshot.key()) {
            Ok(()) => {
                self.state = TerminationState::Terminated;
                return Ok(Terminated(()));
            }
            Err(err) => err,
        };
        log::warn!("exit refused ({refusal}), refreshing map key");

        if let Err(err) = snapshot.refresh(fw) {
            self.state = TerminationState::Fatal;
            return Err(err);
        }

        self.attempts = 2;
        match fw.exit_boot_services(snapshot.key()) {
            Ok(()) => {
                self.state = TerminationState::Terminated;
                Ok(Terminated(()))
            }
            Err(err) => {
                self.state = TerminationState::Fatal;
                Err(err)
            }
        }
    }
}

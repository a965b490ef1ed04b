//! Ties the machine state, loader, and device surface together and drives
//! the execution loop to completion. This is the one public entry point a
//! shell (out of scope for this crate) would actually call: load a
//! program, run it, read back the device surface it left behind.

use log::warn;

use crate::device::DeviceSurface;
use crate::error::{CoreError, Fault};
use crate::exec::{self, StepOutcome};
use crate::loader::Loader;
use crate::machine::Machine;

/// Terminal state of one [`Emulator::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `HALT` was reached.
    Halted,
    /// A decoder-bounds violation or unknown opcode ended the program.
    Faulted(Fault),
    /// The device surface's shutdown flag was observed at a suspension
    /// point; the program was abandoned, not faulted.
    Cancelled,
}

/// Owns one [`Machine`] for the duration of a single program run. Create a
/// fresh `Emulator` per `run()` — machine state is not meant to survive
/// past `Halted`/`Faulted`/`Cancelled` (the device surface is the one
/// thing that does, by design).
pub struct Emulator {
    machine: Machine,
    loader: Loader,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Emulator {
    pub fn new() -> Self {
        Emulator {
            machine: Machine::new(),
            loader: Loader::new(),
        }
    }

    /// Installs `program` at address 0 and resets machine state. Leaves
    /// the device surface untouched — whatever a previous run left on
    /// screen stays there until the new program clears it.
    pub fn load(&mut self, program: &[u8]) -> Result<(), CoreError> {
        self.loader.load(&mut self.machine, program)
    }

    /// Runs the loaded program to completion against `device`.
    pub fn run(&mut self, device: &mut dyn DeviceSurface) -> RunOutcome {
        loop {
            match exec::step(&mut self.machine, device) {
                Ok(StepOutcome::Continue) => continue,
                Ok(StepOutcome::Halted) => {
                    self.machine.stop();
                    return RunOutcome::Halted;
                }
                Ok(StepOutcome::Cancelled) => {
                    self.machine.stop();
                    return RunOutcome::Cancelled;
                }
                Err(fault) => {
                    warn!("{fault}");
                    for b in fault.to_string().into_bytes() {
                        device.putchar(b);
                    }
                    self.machine.stop();
                    return RunOutcome::Faulted(fault);
                }
            }
        }
    }

    /// Read-only access to the machine state left behind by the last run
    /// (registers, flags, RAM) — useful for tests and embedders that want
    /// to inspect results without going through the device surface.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }
}

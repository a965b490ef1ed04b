//! Loader (C5): accepts a byte blob from the (out-of-scope) file store,
//! installs it at address 0 of RAM, resets the machine, and marks it
//! running. One [`Machine`] is constructed per `run()`; nothing persists
//! across loads.

use log::debug;

use crate::error::CoreError;
use crate::machine::{Machine, MEM_SIZE};

#[derive(Default)]
pub struct Loader;

impl Loader {
    pub fn new() -> Self {
        Loader
    }

    /// Rejects oversized programs outright, without touching `machine`.
    /// On success, `machine`'s RAM is zeroed, the program copied in at
    /// address 0, and `pc`/`sp`/registers/flags reset.
    pub fn load(&self, machine: &mut Machine, program: &[u8]) -> Result<(), CoreError> {
        if program.len() > MEM_SIZE {
            return Err(CoreError::ProgramTooLarge {
                size: program.len(),
                max: MEM_SIZE,
            });
        }
        debug!("loading {}-byte program", program.len());
        machine.reset_and_load(program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_program_larger_than_ram() {
        let loader = Loader::new();
        let mut m = Machine::new();
        let too_big = vec![0u8; MEM_SIZE + 1];
        let err = loader.load(&mut m, &too_big).unwrap_err();
        assert_eq!(
            err,
            CoreError::ProgramTooLarge {
                size: MEM_SIZE + 1,
                max: MEM_SIZE
            }
        );
        assert!(!m.is_running());
    }

    #[test]
    fn accepts_a_program_exactly_mem_size() {
        let loader = Loader::new();
        let mut m = Machine::new();
        let full = vec![0u8; MEM_SIZE];
        assert!(loader.load(&mut m, &full).is_ok());
        assert!(m.is_running());
    }

    #[test]
    fn load_resets_pc_sp_and_zeroes_ram() {
        let loader = Loader::new();
        let mut m = Machine::new();
        m.write_u8(10, 0xFF);
        m.set_pc(1234);
        loader.load(&mut m, &[1, 2, 3]).unwrap();
        assert_eq!(m.pc(), 0);
        assert_eq!(m.sp(), crate::machine::SP_INIT);
        assert_eq!(m.read_u8(10), Some(0));
        assert_eq!(m.read_u8(0), Some(1));
    }
}

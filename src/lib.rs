//! Core of a fantasy-computer emulator: a small virtual machine that
//! executes bytecode programs against an in-memory RAM image, a
//! character-cell text display, and a pixel graphics buffer.
//!
//! This crate is the instruction decoder, execution loop, and
//! register/memory/flag model — the hard part. The windowing back end,
//! the host-backed file store, and the interactive shell that would sit
//! on top of [`device::DeviceSurface`] and [`loader::Loader`] are out of
//! scope; [`device::HeadlessSurface`] stands in for them in tests and the
//! bundled demo binary.
//!
//! Start at [`emulator::Emulator`] for the whole-program entry point:
//!
//! ```
//! use tinycomp::device::{DeviceSurface, HeadlessSurface};
//! use tinycomp::emulator::{Emulator, RunOutcome};
//! use tinycomp::opcode::byte;
//!
//! let mut emu = Emulator::new();
//! emu.load(&[byte::PRINT_STR, b'h', b'i', 0, byte::HALT]).unwrap();
//!
//! let mut screen = HeadlessSurface::new();
//! assert_eq!(emu.run(&mut screen), RunOutcome::Halted);
//! assert_eq!(screen.get_cursor(), (2, 0));
//! ```

pub mod decode;
pub mod device;
pub mod emulator;
pub mod error;
pub mod exec;
pub mod loader;
pub mod machine;
pub mod opcode;

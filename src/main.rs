//! Minimal demo harness: loads a `.bin` program from a path on disk and
//! runs it against the in-tree headless device surface, printing the
//! final text plane to stdout once the program halts.
//!
//! This is not the interactive shell (file-store browsing, hexdump, a
//! `run` command among others) — that, and the
//! real windowing back end, are out of scope for this crate. This binary
//! exists so the core can be smoke-tested by hand without either one.

use std::io::Read;
use std::path::PathBuf;

use log::{error, info};

use tinycomp::device::HeadlessSurface;
use tinycomp::emulator::{Emulator, RunOutcome};

struct Args {
    program_path: PathBuf,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let help_msg = "\
USAGE:
    tinycomp <PROGRAM.bin>

Loads a raw bytecode program and runs it headlessly against an in-memory
text/pixel surface, printing the text plane to stdout once it halts.

OPTIONS:
    -h, --help    Print this help message.";

    let mut program_path = None;
    let mut parser = lexopt::Parser::from_env();

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                println!("{help_msg}");
                std::process::exit(0);
            }
            Value(path) if program_path.is_none() => {
                program_path = Some(PathBuf::from(path));
            }
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Args {
        program_path: program_path.ok_or("missing argument <PROGRAM.bin>")?,
    })
}

/// Feeds stdin bytes into the surface's keyboard mailbox on a background
/// thread, the way a real input pump would, minus any actual windowing.
fn spawn_stdin_pump(device: &HeadlessSurface) {
    let mailbox = device.mailbox();
    let shutdown = device.shutdown_handle();
    std::thread::spawn(move || {
        let mut byte = [0u8; 1];
        let mut stdin = std::io::stdin();
        loop {
            match stdin.read(&mut byte) {
                Ok(0) | Err(_) => {
                    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
                    return;
                }
                Ok(_) => mailbox.deliver(byte[0]),
            }
        }
    });
}

fn print_text_plane(device: &HeadlessSurface) {
    use tinycomp::device::{COLS, ROWS};
    let cells = device.text_cells();
    for row in 0..ROWS {
        let line: String = cells[row * COLS..(row + 1) * COLS]
            .iter()
            .map(|cell| cell.ch as char)
            .collect();
        println!("{}", line.trim_end());
    }
}

fn main() {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\nRefer to --help for more information");
            std::process::exit(2);
        }
    };

    let program = match std::fs::read(&args.program_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to read {}: {e}", args.program_path.display());
            std::process::exit(1);
        }
    };

    let mut emu = Emulator::new();
    if let Err(e) = emu.load(&program) {
        error!("{e}");
        std::process::exit(1);
    }

    let mut device = HeadlessSurface::new();
    spawn_stdin_pump(&device);

    info!("running {}", args.program_path.display());
    match emu.run(&mut device) {
        RunOutcome::Halted => info!("halted"),
        RunOutcome::Faulted(fault) => error!("faulted: {fault}"),
        RunOutcome::Cancelled => info!("cancelled"),
    }

    print_text_plane(&device);
}

//! Execution loop (C4): fetches one opcode at `pc`, dispatches on it,
//! performs register/memory arithmetic, drives control transfers, and
//! applies every device-surface side effect. [`step`] applies exactly one
//! instruction; [`crate::emulator::Emulator::run`] drives `step` in a loop
//! until halt, fault, or external cancellation.

use log::{trace, warn};

use crate::decode::Decoder;
use crate::device::DeviceSurface;
use crate::error::Fault;
use crate::machine::Machine;
use crate::opcode::{Arith3, Instruction};

/// What happened after dispatching one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep fetching.
    Continue,
    /// `HALT` was dispatched.
    Halted,
    /// A suspension point (`SLEEP_MS`, `READ_CHAR`, `BEEP`) observed the
    /// device surface's shutdown flag; the program is abandoned, not
    /// faulted.
    Cancelled,
}

/// Fetches and applies exactly one instruction. `Err(Fault)` means the
/// program halted abnormally (`OutOfRangeDecode`/`UnknownOpcode`); every
/// other error condition is handled inline by clamping, skipping, or
/// leaving state unchanged, and reported here as
/// `Ok(StepOutcome::Continue)`.
pub fn step(machine: &mut Machine, device: &mut dyn DeviceSurface) -> Result<StepOutcome, Fault> {
    let start_pc = machine.pc();
    let instr = {
        let mut decoder = Decoder::new(machine);
        match decoder.decode_next()? {
            Ok(instr) => instr,
            Err(byte) => return Err(Fault::UnknownOpcode(byte)),
        }
    };
    trace!("pc={start_pc:#06x} {instr:?}");
    apply(machine, device, instr)
}

fn apply(
    machine: &mut Machine,
    device: &mut dyn DeviceSurface,
    instr: Instruction,
) -> Result<StepOutcome, Fault> {
    use Instruction::*;

    match instr {
        Halt => return Ok(StepOutcome::Halted),

        PrintChar(c) => device.putchar(c),
        PrintStr(bytes) => bytes.iter().for_each(|&c| device.putchar(c)),
        ClearScreen => device.clear_text(),
        SetColor(idx) => device.set_color(idx),
        GetCursor { rx, ry } => {
            let (x, y) = device.get_cursor();
            machine.reg_write(rx, x as u16);
            machine.reg_write(ry, y as u16);
        }
        SetCursor { x, y } => device.set_cursor(x, y),
        DrawLine { x0, y0, x1, y1 } => device.draw_line(x0, y0, x1, y1),
        DrawRect { x0, y0, x1, y1 } => device.draw_rect(x0, y0, x1, y1),
        FillRect { x0, y0, x1, y1 } => device.fill_rect(x0, y0, x1, y1),
        DrawCircle { cx, cy, r } => device.draw_circle(cx, cy, r),

        SleepMs(ms) => {
            device.sleep(ms);
            if device.shutdown_requested() {
                return Ok(StepOutcome::Cancelled);
            }
        }
        Beep { freq, dur_ms } => {
            device.beep(freq, dur_ms);
            if device.shutdown_requested() {
                return Ok(StepOutcome::Cancelled);
            }
        }
        GetTime(r) => machine.reg_write(r, device.now_lo16()),
        Random { dst, max } => {
            let v = device.rand_mod(max);
            machine.reg_write(dst, v);
        }

        SetPixel { x, y, v } => device.set_pixel(x, y, v),
        ClearPixels => device.clear_pixels(),

        LoadReg { r, imm } => machine.reg_write(r, imm),
        StoreReg { r, addr } => {
            if !machine.write_u16_le(addr, machine.reg_read(r)) {
                return Err(Fault::OutOfRangeDecode);
            }
        }
        Push(r) => machine.push_u16_le(machine.reg_read(r)),
        Pop(r) => {
            let v = machine.pop_u16_le();
            machine.reg_write(r, v);
        }

        Add(a) => arith(machine, a, u16::wrapping_add),
        Sub(a) => arith(machine, a, u16::wrapping_sub),
        Mul(a) => arith(machine, a, u16::wrapping_mul),
        Div(a) => arith_checked(machine, a, |x, y| x.checked_div(y)),
        Mod(a) => arith_checked(machine, a, |x, y| x.checked_rem(y)),
        And(a) => arith(machine, a, |x, y| x & y),
        Or(a) => arith(machine, a, |x, y| x | y),
        Xor(a) => arith(machine, a, |x, y| x ^ y),
        Not { dst, src } => {
            let v = !machine.reg_read(src);
            machine.reg_write(dst, v);
        }
        Shl { dst, amt_reg } => {
            let count = machine.reg_read(amt_reg) % 16;
            let v = machine.reg_read(dst).wrapping_shl(count as u32);
            machine.reg_write(dst, v);
        }
        Shr { dst, amt_reg } => {
            let count = machine.reg_read(amt_reg) % 16;
            let v = machine.reg_read(dst).wrapping_shr(count as u32);
            machine.reg_write(dst, v);
        }
        Cmp { s1, s2 } => {
            let (a, b) = (machine.reg_read(s1), machine.reg_read(s2));
            machine.flags_mut().set_from_cmp(a, b);
        }

        Jmp(target) => machine.set_pc(target),
        Jz(target) => {
            if machine.flags().zero() {
                machine.set_pc(target);
            }
        }
        Jnz(target) => {
            if !machine.flags().zero() {
                machine.set_pc(target);
            }
        }
        Jg(target) => {
            if machine.flags().greater() {
                machine.set_pc(target);
            }
        }
        Jl(target) => {
            if machine.flags().less() {
                machine.set_pc(target);
            }
        }
        Call(target) => {
            let ret_addr = machine.pc();
            machine.push_u16_le(ret_addr);
            machine.set_pc(target);
        }
        Ret => {
            let ret_addr = machine.pop_u16_le();
            machine.set_pc(ret_addr);
        }

        ReadChar(r) => {
            let c = device.read_char();
            if device.shutdown_requested() {
                return Ok(StepOutcome::Cancelled);
            }
            machine.reg_write(r, c as u16);
        }

        LoadMem { r, addr } => match machine.read_u16_le(addr) {
            Some(v) => machine.reg_write(r, v),
            None => return Err(Fault::OutOfRangeDecode),
        },
        StoreMem { addr, r } => {
            if !machine.write_u16_le(addr, machine.reg_read(r)) {
                return Err(Fault::OutOfRangeDecode);
            }
        }
        CopyMem { src, dst, len } => {
            if !machine.copy_mem(src, dst, len) {
                return Err(Fault::OutOfRangeDecode);
            }
        }
    }

    Ok(StepOutcome::Continue)
}

/// Applies a total (never-failing) binary op to `s1`/`s2` and writes the
/// result to `dst`. Arithmetic is modulo 2^16 by construction: every op
/// passed here is either a wrapping op or a bitwise op, both already total
/// over `u16`.
fn arith(machine: &mut Machine, a: Arith3, op: impl Fn(u16, u16) -> u16) {
    let (x, y) = (machine.reg_read(a.s1), machine.reg_read(a.s2));
    machine.reg_write(a.dst, op(x, y));
}

/// `DIV`/`MOD`: divisor zero leaves `dst` untouched rather than faulting
/// or wrapping to a sentinel.
fn arith_checked(machine: &mut Machine, a: Arith3, op: impl Fn(u16, u16) -> Option<u16>) {
    let (x, y) = (machine.reg_read(a.s1), machine.reg_read(a.s2));
    match op(x, y) {
        Some(result) => machine.reg_write(a.dst, result),
        None => warn!("division by zero: r{} left unchanged", a.dst),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessSurface;

    fn run_to_halt(program: &[u8]) -> (Machine, HeadlessSurface) {
        let mut m = Machine::new();
        m.reset_and_load(program);
        let mut d = HeadlessSurface::new();
        loop {
            match step(&mut m, &mut d) {
                Ok(StepOutcome::Continue) => continue,
                Ok(_) => break,
                Err(_) => break,
            }
        }
        (m, d)
    }

    #[test]
    fn hello_world_scenario() {
        use crate::opcode::byte;
        let (m, d) = run_to_halt(&[
            byte::PRINT_STR,
            b'H',
            b'e',
            b'l',
            b'l',
            b'o',
            0,
            byte::HALT,
        ]);
        assert_eq!(d.get_cursor(), (5, 0));
        let _ = &m; // `step` doesn't flip `running`; that's `Emulator::run`'s job
        for (i, c) in b"Hello".iter().enumerate() {
            assert_eq!(d.text_cells()[i].ch, *c);
        }
    }

    #[test]
    fn loop_countdown_scenario() {
        use crate::opcode::byte;
        #[rustfmt::skip]
        let program = [
            byte::LOAD_REG, 0, 0x0A, 0x00, // R0 = 10
            byte::LOAD_REG, 1, 0x01, 0x00, // R1 = 1
            byte::LOAD_REG, 2, 0x00, 0x00, // R2 = 0
            byte::SUB, 0, 0, 1,            // R0 -= R1
            byte::CMP, 0, 2,               // compare R0, R2
            byte::JNZ, 0x08, 0x00,         // loop to the SUB if R0 != 0
            byte::HALT,
        ];
        let (m, _d) = run_to_halt(&program);
        assert_eq!(m.reg_read(0), 0);
        assert_eq!(m.reg_read(1), 1);
        assert_eq!(m.reg_read(2), 0);
        assert!(m.flags().zero());
    }

    #[test]
    fn call_ret_round_trip_scenario() {
        use crate::opcode::byte;
        #[rustfmt::skip]
        let program = [
            byte::CALL, 0x07, 0x00, // call offset 7
            byte::HALT,
            byte::LOAD_REG, 0, 0x2A, 0x00, // R0 = 42
            byte::RET,
        ];
        let (m, _d) = run_to_halt(&program);
        assert_eq!(m.reg_read(0), 42);
        assert_eq!(m.sp(), crate::machine::SP_INIT);
    }

    #[test]
    fn division_by_zero_leaves_dst_unchanged() {
        use crate::opcode::byte;
        #[rustfmt::skip]
        let program = [
            byte::LOAD_REG, 0, 0x0A, 0x00, // R0 = 10
            byte::LOAD_REG, 1, 0x00, 0x00, // R1 = 0
            byte::DIV, 2, 0, 1,            // R2 = R0 / R1 (divisor 0)
            byte::HALT,
        ];
        let (m, _d) = run_to_halt(&program);
        assert_eq!(m.reg_read(2), 0);
    }

    #[test]
    fn pixel_out_of_bounds_sets_pixel_mode_without_fault() {
        use crate::opcode::byte;
        #[rustfmt::skip]
        let program = [
            byte::SET_PIXEL, 0x90, 0x01, 0x2C, 0x01, 1, // (400, 300)
            byte::HALT,
        ];
        let (_m, d) = run_to_halt(&program);
        assert!(d.pixel_mode());
        assert!(!d.pixels().any());
    }

    #[test]
    fn unknown_opcode_faults() {
        let mut m = Machine::new();
        m.reset_and_load(&[0xFE]);
        let mut d = HeadlessSurface::new();
        assert_eq!(step(&mut m, &mut d), Err(Fault::UnknownOpcode(0xFE)));
    }

    #[test]
    fn shl_shr_mask_count_to_four_bits() {
        use crate::opcode::byte;
        #[rustfmt::skip]
        let program = [
            byte::LOAD_REG, 0, 0x01, 0x00, // R0 = 1
            byte::LOAD_REG, 1, 0x14, 0x00, // R1 = 20 (masked to 4)
            byte::SHL, 0, 1,               // R0 <<= (R1 mod 16) == 4
            byte::HALT,
        ];
        let (m, _d) = run_to_halt(&program);
        assert_eq!(m.reg_read(0), 1 << 4);
    }

    #[test]
    fn copy_mem_is_overlap_safe() {
        use crate::opcode::byte;
        let mut m = Machine::new();
        #[rustfmt::skip]
        let program = [
            byte::COPY_MEM, 0x10, 0x00, 0x12, 0x00, 0x05, 0x00,
            byte::HALT,
        ];
        m.reset_and_load(&program);
        for (i, b) in [1u8, 2, 3, 4, 5].iter().enumerate() {
            m.write_u8(0x10 + i as u16, *b);
        }
        let mut d = HeadlessSurface::new();
        loop {
            match step(&mut m, &mut d) {
                Ok(StepOutcome::Continue) => continue,
                _ => break,
            }
        }
        let out: Vec<u8> = (0x12..0x17).map(|a| m.read_u8(a).unwrap()).collect();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }
}

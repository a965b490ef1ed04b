//! Operand decoder (C2): reads bytes starting at `pc`, advancing it, to
//! materialize the operands of one instruction. Every read is bounds
//! checked against [`crate::machine::MEM_SIZE`]; a violation is the only
//! way [`Fault::OutOfRangeDecode`] is produced.

use crate::error::Fault;
use crate::machine::Machine;
use crate::opcode::{byte, Arith3, Instruction};

/// Borrows a [`Machine`] mutably for the duration of decoding one
/// instruction. Exists as its own type (rather than inherent methods on
/// `Machine`) so the fetch/decode responsibility reads as a distinct step
/// from register/memory ownership.
pub struct Decoder<'m> {
    machine: &'m mut Machine,
}

impl<'m> Decoder<'m> {
    pub fn new(machine: &'m mut Machine) -> Self {
        Decoder { machine }
    }

    /// Reads the byte at `pc`, advancing `pc` by one.
    pub fn fetch_u8(&mut self) -> Result<u8, Fault> {
        let pc = self.machine.pc();
        let byte = self.machine.read_u8(pc).ok_or(Fault::OutOfRangeDecode)?;
        self.machine.set_pc(pc.wrapping_add(1));
        Ok(byte)
    }

    /// Reads a little-endian 16-bit immediate at `pc`, advancing `pc` by
    /// two.
    pub fn fetch_u16_le(&mut self) -> Result<u16, Fault> {
        let pc = self.machine.pc();
        let word = self
            .machine
            .read_u16_le(pc)
            .ok_or(Fault::OutOfRangeDecode)?;
        self.machine.set_pc(pc.wrapping_add(2));
        Ok(word)
    }

    /// Consumes bytes until (and including) a `0` terminator, per
    /// `PRINT_STR`'s operand shape. The terminator is not included in the
    /// returned buffer.
    pub fn fetch_cstr(&mut self) -> Result<Vec<u8>, Fault> {
        let mut bytes = Vec::new();
        loop {
            let b = self.fetch_u8()?;
            if b == 0 {
                return Ok(bytes);
            }
            bytes.push(b);
        }
    }

    fn fetch_arith3(&mut self) -> Result<Arith3, Fault> {
        Ok(Arith3 {
            dst: self.fetch_u8()?,
            s1: self.fetch_u8()?,
            s2: self.fetch_u8()?,
        })
    }

    /// Fetches one opcode byte and its operands, producing the next
    /// [`Instruction`] to execute. `Err` only on an out-of-range operand
    /// read; an opcode byte with no table entry is reported as
    /// `Ok(Err)`-shaped at the call site instead, since the opcode byte
    /// itself was successfully read — see [`crate::exec::step`].
    pub fn decode_next(&mut self) -> Result<Result<Instruction, u8>, Fault> {
        let op = self.fetch_u8()?;
        let instr = match op {
            byte::HALT => Instruction::Halt,
            byte::PRINT_CHAR => Instruction::PrintChar(self.fetch_u8()?),
            byte::PRINT_STR => Instruction::PrintStr(self.fetch_cstr()?),
            byte::CLEAR_SCREEN => Instruction::ClearScreen,
            byte::SET_COLOR => Instruction::SetColor(self.fetch_u8()?),
            byte::GET_CURSOR => Instruction::GetCursor {
                rx: self.fetch_u8()?,
                ry: self.fetch_u8()?,
            },
            byte::SET_CURSOR => Instruction::SetCursor {
                x: self.fetch_u8()?,
                y: self.fetch_u8()?,
            },
            byte::DRAW_LINE => Instruction::DrawLine {
                x0: self.fetch_u16_le()?,
                y0: self.fetch_u16_le()?,
                x1: self.fetch_u16_le()?,
                y1: self.fetch_u16_le()?,
            },
            byte::DRAW_RECT => Instruction::DrawRect {
                x0: self.fetch_u16_le()?,
                y0: self.fetch_u16_le()?,
                x1: self.fetch_u16_le()?,
                y1: self.fetch_u16_le()?,
            },
            byte::FILL_RECT => Instruction::FillRect {
                x0: self.fetch_u16_le()?,
                y0: self.fetch_u16_le()?,
                x1: self.fetch_u16_le()?,
                y1: self.fetch_u16_le()?,
            },
            byte::DRAW_CIRCLE => Instruction::DrawCircle {
                cx: self.fetch_u16_le()?,
                cy: self.fetch_u16_le()?,
                r: self.fetch_u16_le()?,
            },

            byte::SLEEP_MS => Instruction::SleepMs(self.fetch_u16_le()?),
            byte::BEEP => Instruction::Beep {
                freq: self.fetch_u16_le()?,
                dur_ms: self.fetch_u16_le()?,
            },
            byte::GET_TIME => Instruction::GetTime(self.fetch_u8()?),
            byte::RANDOM => Instruction::Random {
                dst: self.fetch_u8()?,
                max: self.fetch_u16_le()?,
            },

            byte::SET_PIXEL => Instruction::SetPixel {
                x: self.fetch_u16_le()?,
                y: self.fetch_u16_le()?,
                v: self.fetch_u8()?,
            },
            byte::CLEAR_PIXELS => Instruction::ClearPixels,

            byte::LOAD_REG => Instruction::LoadReg {
                r: self.fetch_u8()?,
                imm: self.fetch_u16_le()?,
            },
            byte::STORE_REG => Instruction::StoreReg {
                r: self.fetch_u8()?,
                addr: self.fetch_u16_le()?,
            },
            byte::PUSH => Instruction::Push(self.fetch_u8()?),
            byte::POP => Instruction::Pop(self.fetch_u8()?),

            byte::ADD => Instruction::Add(self.fetch_arith3()?),
            byte::SUB => Instruction::Sub(self.fetch_arith3()?),
            byte::MUL => Instruction::Mul(self.fetch_arith3()?),
            byte::DIV => Instruction::Div(self.fetch_arith3()?),
            byte::MOD => Instruction::Mod(self.fetch_arith3()?),
            byte::AND => Instruction::And(self.fetch_arith3()?),
            byte::OR => Instruction::Or(self.fetch_arith3()?),
            byte::XOR => Instruction::Xor(self.fetch_arith3()?),
            byte::NOT => Instruction::Not {
                dst: self.fetch_u8()?,
                src: self.fetch_u8()?,
            },
            byte::SHL => Instruction::Shl {
                dst: self.fetch_u8()?,
                amt_reg: self.fetch_u8()?,
            },
            byte::SHR => Instruction::Shr {
                dst: self.fetch_u8()?,
                amt_reg: self.fetch_u8()?,
            },
            byte::CMP => Instruction::Cmp {
                s1: self.fetch_u8()?,
                s2: self.fetch_u8()?,
            },

            byte::JMP => Instruction::Jmp(self.fetch_u16_le()?),
            byte::JZ => Instruction::Jz(self.fetch_u16_le()?),
            byte::JNZ => Instruction::Jnz(self.fetch_u16_le()?),
            byte::JG => Instruction::Jg(self.fetch_u16_le()?),
            byte::JL => Instruction::Jl(self.fetch_u16_le()?),
            byte::CALL => Instruction::Call(self.fetch_u16_le()?),
            byte::RET => Instruction::Ret,

            byte::READ_CHAR => Instruction::ReadChar(self.fetch_u8()?),

            byte::LOAD_MEM => Instruction::LoadMem {
                r: self.fetch_u8()?,
                addr: self.fetch_u16_le()?,
            },
            byte::STORE_MEM => Instruction::StoreMem {
                addr: self.fetch_u16_le()?,
                r: self.fetch_u8()?,
            },
            byte::COPY_MEM => Instruction::CopyMem {
                src: self.fetch_u16_le()?,
                dst: self.fetch_u16_le()?,
                len: self.fetch_u16_le()?,
            },

            unknown => return Ok(Err(unknown)),
        };
        Ok(Ok(instr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_u8_advances_pc() {
        let mut m = Machine::new();
        m.reset_and_load(&[0x11, 0x22]);
        let mut d = Decoder::new(&mut m);
        assert_eq!(d.fetch_u8(), Ok(0x11));
        assert_eq!(d.fetch_u8(), Ok(0x22));
        assert_eq!(m.pc(), 2);
    }

    #[test]
    fn fetch_u16_le_reads_low_byte_first() {
        let mut m = Machine::new();
        m.reset_and_load(&[0xEF, 0xBE]);
        let mut d = Decoder::new(&mut m);
        assert_eq!(d.fetch_u16_le(), Ok(0xBEEF));
        assert_eq!(m.pc(), 2);
    }

    #[test]
    fn fetch_cstr_stops_at_nul_and_consumes_it() {
        let mut m = Machine::new();
        m.reset_and_load(b"Hi\0\x01");
        let mut d = Decoder::new(&mut m);
        assert_eq!(d.fetch_cstr().unwrap(), b"Hi");
        assert_eq!(m.pc(), 3);
    }

    #[test]
    fn fetch_past_end_of_ram_faults() {
        let mut m = Machine::new();
        m.reset_and_load(&[]);
        m.set_pc(u16::MAX);
        let mut d = Decoder::new(&mut m);
        assert_eq!(d.fetch_u16_le(), Err(Fault::OutOfRangeDecode));
    }

    #[test]
    fn decode_next_reads_fixed_width_arith3() {
        let mut m = Machine::new();
        m.reset_and_load(&[byte::ADD, 0, 1, 2]);
        let mut d = Decoder::new(&mut m);
        assert_eq!(
            d.decode_next().unwrap().unwrap(),
            Instruction::Add(Arith3 { dst: 0, s1: 1, s2: 2 })
        );
    }

    #[test]
    fn decode_next_reports_unknown_opcode_without_faulting() {
        let mut m = Machine::new();
        m.reset_and_load(&[0xFE]);
        let mut d = Decoder::new(&mut m);
        assert_eq!(d.decode_next().unwrap(), Err(0xFE));
    }
}

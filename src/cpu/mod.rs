//! MOS6510 interpreter.
//!
//! Executes tune code one instruction at a time against a [`SidBus`].
//! Subroutines are entered directly (no real reset or interrupt) and run
//! until they return through a sentinel address on the stack, see
//! [`Cpu::run_subroutine`].
//!
//! A few behaviours differ from silicon:
//!
//! - the stack pointer clamps at 0 and 255 instead of wrapping
//! - ADC/SBC set V to `C ^ N` of the result
//! - BRK halts the current subroutine (PC = 0) without touching the stack
//! - RTI is executed as RTS, the status register is not restored
//! - decimal mode is ignored by ADC/SBC

pub mod opcodes;


use crate::memory::{SidBus, RESET_VECTOR, STACK_BASE};
use opcodes::{AddrMode, Mnemonic};

// Status register flags
pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

/// Instruction budget for [`Cpu::run_subroutine`].
pub const DEFAULT_STEP_LIMIT: u32 = 2_000_000;

#[derive(Debug, Clone)]
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer, addresses `$0100 + s`.
    pub s: u8,
    /// Status register.
    pub p: u8,
    pub pc: u16,

    // Cycles charged to the instruction currently executing.
    cycles: u32,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFF,
            p: 0,
            pc: 0,
            cycles: 0,
        }
    }

    /// Power-on style reset: registers cleared, PC from the reset vector.
    pub fn reset(&mut self, bus: &SidBus<'_>) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.p = 0;
        self.s = 0xFF;
        self.pc = bus.memory().read_u16(RESET_VECTOR);
    }

    /// Enter code at `pc` with `a` in the accumulator.
    pub fn reset_to(&mut self, pc: u16, a: u8) {
        self.a = a;
        self.x = 0;
        self.y = 0;
        self.p = 0;
        self.s = 0xFF;
        self.pc = pc;
    }

    pub fn flag(&self, flag: u8) -> bool {
        self.p & flag != 0
    }

    /// Call the routine at `entry` and run it until it returns.
    ///
    /// Two zero bytes are pushed as the return address, so the routine's
    /// final RTS lands on PC = 1 and the loop stops once `pc <= 1`.
    /// Returns the total cycle count.
    pub fn run_subroutine(&mut self, bus: &mut SidBus<'_>, entry: u16, a: u8) -> u64 {
        self.run_subroutine_limited(bus, entry, a, DEFAULT_STEP_LIMIT)
    }

    /// [`Cpu::run_subroutine`] that gives up after `max_steps` instructions.
    pub fn run_subroutine_limited(
        &mut self,
        bus: &mut SidBus<'_>,
        entry: u16,
        a: u8,
        max_steps: u32,
    ) -> u64 {
        self.reset_to(entry, a);
        self.push(bus, 0);
        self.push(bus, 0);

        let mut total: u64 = 0;
        let mut steps: u32 = 0;
        while self.pc > 1 {
            if steps >= max_steps {
                log::warn!(
                    "routine at ${entry:04X} still running after {max_steps} instructions \
                     (PC=${:04X}), abandoning it",
                    self.pc
                );
                break;
            }
            total += self.step(bus) as u64;
            steps += 1;
        }
        total
    }

    // ── Fetch helpers ────────────────────────────────────────────────────

    #[inline]
    fn fetch(&mut self, bus: &SidBus<'_>) -> u8 {
        let v = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_word(&mut self, bus: &SidBus<'_>) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        (hi << 8) | lo
    }

    /// Fetch the operand bytes of a memory mode and compute the effective
    /// address. Second value: the index carried into the high byte.
    fn effective_address(&mut self, bus: &SidBus<'_>, mode: AddrMode) -> (u16, bool) {
        match mode {
            AddrMode::ZeroPage => (self.fetch(bus) as u16, false),
            AddrMode::ZeroPageX => (self.fetch(bus).wrapping_add(self.x) as u16, false),
            AddrMode::ZeroPageY => (self.fetch(bus).wrapping_add(self.y) as u16, false),
            AddrMode::Absolute => (self.fetch_word(bus), false),
            AddrMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.x as u16);
                (addr, page_crossed(base, addr))
            }
            AddrMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.y as u16);
                (addr, page_crossed(base, addr))
            }
            AddrMode::IndirectX => {
                let zp = self.fetch(bus).wrapping_add(self.x);
                (zp_pointer(bus, zp), false)
            }
            AddrMode::IndirectY => {
                let zp = self.fetch(bus);
                let base = zp_pointer(bus, zp);
                let addr = base.wrapping_add(self.y as u16);
                (addr, page_crossed(base, addr))
            }
            AddrMode::Indirect => {
                let ptr = self.fetch_word(bus);
                (bus.memory().read_u16(ptr), false)
            }
            AddrMode::Implied | AddrMode::Immediate | AddrMode::Accumulator | AddrMode::Relative => {
                log::trace!("no effective address for {mode:?}");
                (0, false)
            }
        }
    }

    // ── Operand access ───────────────────────────────────────────────────

    /// Read the operand of `mode`, advancing PC past it.
    fn get(&mut self, bus: &SidBus<'_>, mode: AddrMode) -> u8 {
        self.cycles += mode.base_cycles();
        match mode {
            AddrMode::Implied => 0,
            AddrMode::Immediate | AddrMode::Relative => self.fetch(bus),
            AddrMode::Accumulator => self.a,
            _ => {
                let (addr, crossed) = self.effective_address(bus, mode);
                if crossed && mode.has_page_penalty() {
                    self.cycles += 1;
                }
                bus.read(addr)
            }
        }
    }

    /// Store `value` through `mode` (STA/STX/STY), advancing PC.
    /// Indexed stores always pay the extra cycle.
    fn put(&mut self, bus: &mut SidBus<'_>, mode: AddrMode, value: u8) {
        self.cycles += mode.base_cycles();
        match mode {
            AddrMode::Accumulator => self.a = value,
            AddrMode::Implied | AddrMode::Immediate | AddrMode::Relative => {
                log::trace!("store through {mode:?} ignored");
            }
            _ => {
                let (addr, _) = self.effective_address(bus, mode);
                if mode.has_page_penalty() {
                    self.cycles += 1;
                }
                bus.write(addr, value);
            }
        }
    }

    /// Write a read-modify-write result back. The address is rebuilt from
    /// the operand bytes just behind PC, which `get` already consumed.
    fn set(&mut self, bus: &mut SidBus<'_>, mode: AddrMode, value: u8) {
        match mode {
            AddrMode::Accumulator => self.a = value,
            AddrMode::ZeroPage => {
                self.cycles += 2;
                let addr = bus.read(self.pc.wrapping_sub(1)) as u16;
                bus.write(addr, value);
            }
            AddrMode::ZeroPageX => {
                self.cycles += 2;
                let addr = bus.read(self.pc.wrapping_sub(1)).wrapping_add(self.x) as u16;
                bus.write(addr, value);
            }
            AddrMode::Absolute => {
                self.cycles += 2;
                let addr = self.operand_word_behind_pc(bus);
                bus.write(addr, value);
            }
            AddrMode::AbsoluteX => {
                // RMW,X always takes 7 cycles; cancel the penalty `get` charged.
                self.cycles += 3;
                let base = self.operand_word_behind_pc(bus);
                let addr = base.wrapping_add(self.x as u16);
                if page_crossed(base, addr) {
                    self.cycles -= 1;
                }
                bus.write(addr, value);
            }
            _ => log::trace!("write-back through {mode:?} ignored"),
        }
    }

    fn operand_word_behind_pc(&self, bus: &SidBus<'_>) -> u16 {
        let lo = bus.read(self.pc.wrapping_sub(2)) as u16;
        let hi = bus.read(self.pc.wrapping_sub(1)) as u16;
        (hi << 8) | lo
    }

    // ── Stack ────────────────────────────────────────────────────────────

    /// Push; S stops at 0 instead of wrapping.
    fn push(&mut self, bus: &mut SidBus<'_>, value: u8) {
        bus.write(STACK_BASE | self.s as u16, value);
        if self.s > 0 {
            self.s -= 1;
        }
    }

    /// Pop; S stops at 255 instead of wrapping.
    fn pop(&mut self, bus: &SidBus<'_>) -> u8 {
        if self.s < 0xFF {
            self.s += 1;
        }
        bus.read(STACK_BASE | self.s as u16)
    }

    // ── Flags ────────────────────────────────────────────────────────────

    #[inline]
    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
    }

    #[inline]
    fn set_zn(&mut self, value: u8) {
        self.set_flag(FLAG_Z, value == 0);
        self.set_flag(FLAG_N, value & 0x80 != 0);
    }

    fn branch(&mut self, bus: &SidBus<'_>, taken: bool) {
        let offset = self.get(bus, AddrMode::Relative) as i8;
        let target = self.pc.wrapping_add(offset as i16 as u16);
        if taken {
            self.cycles += if page_crossed(self.pc, target) { 2 } else { 1 };
            self.pc = target;
        }
    }

    /// Shared by ADC and SBC (SBC passes the inverted operand).
    fn add_with_carry(&mut self, value: u8) {
        let sum = self.a as u16 + value as u16 + (self.p & FLAG_C) as u16;
        self.set_flag(FLAG_C, sum & 0x100 != 0);
        self.a = sum as u8;
        self.set_zn(self.a);
        let v = self.flag(FLAG_C) ^ self.flag(FLAG_N);
        self.set_flag(FLAG_V, v);
    }

    fn compare(&mut self, reg: u8, value: u8) {
        let diff = reg.wrapping_sub(value);
        self.set_zn(diff);
        self.set_flag(FLAG_C, reg >= value);
    }

    // ── Execute ──────────────────────────────────────────────────────────

    /// Decode and execute one instruction. Returns its cycle count.
    pub fn step(&mut self, bus: &mut SidBus<'_>) -> u32 {
        self.cycles = 0;

        let opcode = self.fetch(bus);
        let (mnemonic, mode) = opcodes::decode(opcode);

        match mnemonic {
            Mnemonic::Adc => {
                let v = self.get(bus, mode);
                self.add_with_carry(v);
            }
            Mnemonic::Sbc => {
                let v = self.get(bus, mode);
                self.add_with_carry(v ^ 0xFF);
            }
            Mnemonic::And => {
                let v = self.get(bus, mode);
                self.a &= v;
                self.set_zn(self.a);
            }
            Mnemonic::Ora => {
                let v = self.get(bus, mode);
                self.a |= v;
                self.set_zn(self.a);
            }
            Mnemonic::Eor => {
                let v = self.get(bus, mode);
                self.a ^= v;
                self.set_zn(self.a);
            }
            Mnemonic::Asl => {
                let wide = (self.get(bus, mode) as u16) << 1;
                let result = wide as u8;
                self.set(bus, mode, result);
                self.set_zn(result);
                self.set_flag(FLAG_C, wide & 0x100 != 0);
            }
            Mnemonic::Lsr => {
                let v = self.get(bus, mode);
                let result = v >> 1;
                self.set(bus, mode, result);
                self.set_zn(result);
                self.set_flag(FLAG_C, v & 0x01 != 0);
            }
            Mnemonic::Rol => {
                let v = self.get(bus, mode);
                let carry_in = self.p & FLAG_C;
                self.set_flag(FLAG_C, v & 0x80 != 0);
                let result = (v << 1) | carry_in;
                self.set(bus, mode, result);
                self.set_zn(result);
            }
            Mnemonic::Ror => {
                let v = self.get(bus, mode);
                let carry_in = if self.flag(FLAG_C) { 0x80 } else { 0 };
                self.set_flag(FLAG_C, v & 0x01 != 0);
                let result = (v >> 1) | carry_in;
                self.set(bus, mode, result);
                self.set_zn(result);
            }
            Mnemonic::Inc => {
                let result = self.get(bus, mode).wrapping_add(1);
                self.set(bus, mode, result);
                self.set_zn(result);
            }
            Mnemonic::Dec => {
                let result = self.get(bus, mode).wrapping_sub(1);
                self.set(bus, mode, result);
                self.set_zn(result);
            }

            Mnemonic::Bcc => self.branch(bus, !self.flag(FLAG_C)),
            Mnemonic::Bcs => self.branch(bus, self.flag(FLAG_C)),
            Mnemonic::Bne => self.branch(bus, !self.flag(FLAG_Z)),
            Mnemonic::Beq => self.branch(bus, self.flag(FLAG_Z)),
            Mnemonic::Bpl => self.branch(bus, !self.flag(FLAG_N)),
            Mnemonic::Bmi => self.branch(bus, self.flag(FLAG_N)),
            Mnemonic::Bvc => self.branch(bus, !self.flag(FLAG_V)),
            Mnemonic::Bvs => self.branch(bus, self.flag(FLAG_V)),

            Mnemonic::Bit => {
                let v = self.get(bus, mode);
                self.set_flag(FLAG_Z, self.a & v == 0);
                self.set_flag(FLAG_N, v & 0x80 != 0);
                self.set_flag(FLAG_V, v & 0x40 != 0);
            }
            Mnemonic::Brk => {
                self.cycles += 7;
                self.pc = 0;
            }

            Mnemonic::Clc => self.implied_flag(FLAG_C, false),
            Mnemonic::Cld => self.implied_flag(FLAG_D, false),
            Mnemonic::Cli => self.implied_flag(FLAG_I, false),
            Mnemonic::Clv => self.implied_flag(FLAG_V, false),
            Mnemonic::Sec => self.implied_flag(FLAG_C, true),
            Mnemonic::Sed => self.implied_flag(FLAG_D, true),
            Mnemonic::Sei => self.implied_flag(FLAG_I, true),

            Mnemonic::Cmp => {
                let v = self.get(bus, mode);
                self.compare(self.a, v);
            }
            Mnemonic::Cpx => {
                let v = self.get(bus, mode);
                self.compare(self.x, v);
            }
            Mnemonic::Cpy => {
                let v = self.get(bus, mode);
                self.compare(self.y, v);
            }

            Mnemonic::Dex => {
                self.cycles += 2;
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            }
            Mnemonic::Dey => {
                self.cycles += 2;
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            }
            Mnemonic::Inx => {
                self.cycles += 2;
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            }
            Mnemonic::Iny => {
                self.cycles += 2;
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            }

            Mnemonic::Jmp => {
                self.cycles += 3;
                let target = self.fetch_word(bus);
                self.pc = match mode {
                    AddrMode::Indirect => {
                        self.cycles += 2;
                        bus.memory().read_u16(target)
                    }
                    _ => target,
                };
            }
            Mnemonic::Jsr => {
                self.cycles += 6;
                let ret = self.pc.wrapping_add(1);
                self.push(bus, (ret >> 8) as u8);
                self.push(bus, ret as u8);
                self.pc = self.fetch_word(bus);
            }
            Mnemonic::Rts | Mnemonic::Rti => {
                self.cycles += 6;
                let lo = self.pop(bus) as u16;
                let hi = self.pop(bus) as u16;
                self.pc = ((hi << 8) | lo).wrapping_add(1);
            }

            Mnemonic::Lda => {
                self.a = self.get(bus, mode);
                self.set_zn(self.a);
            }
            Mnemonic::Ldx => {
                self.x = self.get(bus, mode);
                self.set_zn(self.x);
            }
            Mnemonic::Ldy => {
                self.y = self.get(bus, mode);
                self.set_zn(self.y);
            }
            Mnemonic::Sta => self.put(bus, mode, self.a),
            Mnemonic::Stx => self.put(bus, mode, self.x),
            Mnemonic::Sty => self.put(bus, mode, self.y),

            Mnemonic::Nop => self.cycles += 2,

            Mnemonic::Pha => {
                self.cycles += 3;
                self.push(bus, self.a);
            }
            Mnemonic::Php => {
                self.cycles += 3;
                self.push(bus, self.p);
            }
            Mnemonic::Pla => {
                self.cycles += 4;
                self.a = self.pop(bus);
                self.set_zn(self.a);
            }
            Mnemonic::Plp => {
                self.cycles += 4;
                self.p = self.pop(bus);
            }

            Mnemonic::Tax => {
                self.cycles += 2;
                self.x = self.a;
                self.set_zn(self.x);
            }
            Mnemonic::Tay => {
                self.cycles += 2;
                self.y = self.a;
                self.set_zn(self.y);
            }
            Mnemonic::Tsx => {
                self.cycles += 2;
                self.x = self.s;
                self.set_zn(self.x);
            }
            Mnemonic::Txa => {
                self.cycles += 2;
                self.a = self.x;
                self.set_zn(self.a);
            }
            Mnemonic::Txs => {
                self.cycles += 2;
                self.s = self.x;
            }
            Mnemonic::Tya => {
                self.cycles += 2;
                self.a = self.y;
                self.set_zn(self.a);
            }

            Mnemonic::Illegal => {
                // No operand fetch: the following bytes decode as opcodes.
                self.cycles += 2;
                log::trace!(
                    "illegal opcode ${opcode:02X} at ${:04X}",
                    self.pc.wrapping_sub(1)
                );
            }
        }

        self.cycles
    }

    fn implied_flag(&mut self, flag: u8, on: bool) {
        self.cycles += 2;
        self.set_flag(flag, on);
    }
}

#[inline]
fn page_crossed(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}

/// 16-bit pointer stored in zero page; the high byte wraps within page 0.
fn zp_pointer(bus: &SidBus<'_>, zp: u8) -> u16 {
    let lo = bus.read(zp as u16) as u16;
    let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
    (hi << 8) | lo
}

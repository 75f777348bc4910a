// Static decode table: one (Mnemonic, AddrMode) pair per opcode byte.
// Undocumented opcodes decode to `Mnemonic::Illegal`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    Illegal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Accumulator,
    Relative,
}

impl AddrMode {
    /// Cycles charged for fetching an operand through this mode, before any
    /// page-crossing penalty.
    pub const fn base_cycles(self) -> u32 {
        match self {
            AddrMode::Implied | AddrMode::Immediate | AddrMode::Accumulator => 2,
            AddrMode::Relative => 2,
            AddrMode::ZeroPage => 3,
            AddrMode::ZeroPageX | AddrMode::ZeroPageY => 4,
            AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY => 4,
            AddrMode::Indirect => 5,
            AddrMode::IndirectX => 6,
            AddrMode::IndirectY => 5,
        }
    }

    /// Whether an indexed access through this mode costs one more cycle when
    /// the index carries into the high byte.
    pub const fn has_page_penalty(self) -> bool {
        matches!(
            self,
            AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::IndirectY
        )
    }
}

pub type Opcode = (Mnemonic, AddrMode);

const XXX: Opcode = (Mnemonic::Illegal, AddrMode::Implied);

use AddrMode::{
    Absolute as ABS, AbsoluteX as ABX, AbsoluteY as ABY, Accumulator as ACC, Immediate as IMM,
    Implied as IMP, Indirect as IND, IndirectX as IZX, IndirectY as IZY, Relative as REL,
    ZeroPage as ZP, ZeroPageX as ZPX, ZeroPageY as ZPY,
};
use Mnemonic::*;

#[rustfmt::skip]
pub static OPCODES: [Opcode; 256] = [
    // 0x00
    (Brk, IMP), (Ora, IZX), XXX,        XXX,        XXX,        (Ora, ZP),  (Asl, ZP),  XXX,
    (Php, IMP), (Ora, IMM), (Asl, ACC), XXX,        XXX,        (Ora, ABS), (Asl, ABS), XXX,
    // 0x10
    (Bpl, REL), (Ora, IZY), XXX,        XXX,        XXX,        (Ora, ZPX), (Asl, ZPX), XXX,
    (Clc, IMP), (Ora, ABY), XXX,        XXX,        XXX,        (Ora, ABX), (Asl, ABX), XXX,
    // 0x20
    (Jsr, ABS), (And, IZX), XXX,        XXX,        (Bit, ZP),  (And, ZP),  (Rol, ZP),  XXX,
    (Plp, IMP), (And, IMM), (Rol, ACC), XXX,        (Bit, ABS), (And, ABS), (Rol, ABS), XXX,
    // 0x30
    (Bmi, REL), (And, IZY), XXX,        XXX,        XXX,        (And, ZPX), (Rol, ZPX), XXX,
    (Sec, IMP), (And, ABY), XXX,        XXX,        XXX,        (And, ABX), (Rol, ABX), XXX,
    // 0x40
    (Rti, IMP), (Eor, IZX), XXX,        XXX,        XXX,        (Eor, ZP),  (Lsr, ZP),  XXX,
    (Pha, IMP), (Eor, IMM), (Lsr, ACC), XXX,        (Jmp, ABS), (Eor, ABS), (Lsr, ABS), XXX,
    // 0x50
    (Bvc, REL), (Eor, IZY), XXX,        XXX,        XXX,        (Eor, ZPX), (Lsr, ZPX), XXX,
    (Cli, IMP), (Eor, ABY), XXX,        XXX,        XXX,        (Eor, ABX), (Lsr, ABX), XXX,
    // 0x60
    (Rts, IMP), (Adc, IZX), XXX,        XXX,        XXX,        (Adc, ZP),  (Ror, ZP),  XXX,
    (Pla, IMP), (Adc, IMM), (Ror, ACC), XXX,        (Jmp, IND), (Adc, ABS), (Ror, ABS), XXX,
    // 0x70
    (Bvs, REL), (Adc, IZY), XXX,        XXX,        XXX,        (Adc, ZPX), (Ror, ZPX), XXX,
    (Sei, IMP), (Adc, ABY), XXX,        XXX,        XXX,        (Adc, ABX), (Ror, ABX), XXX,
    // 0x80
    XXX,        (Sta, IZX), XXX,        XXX,        (Sty, ZP),  (Sta, ZP),  (Stx, ZP),  XXX,
    (Dey, IMP), XXX,        (Txa, IMP), XXX,        (Sty, ABS), (Sta, ABS), (Stx, ABS), XXX,
    // 0x90
    (Bcc, REL), (Sta, IZY), XXX,        XXX,        (Sty, ZPX), (Sta, ZPX), (Stx, ZPY), XXX,
    (Tya, IMP), (Sta, ABY), (Txs, IMP), XXX,        XXX,        (Sta, ABX), XXX,        XXX,
    // 0xA0
    (Ldy, IMM), (Lda, IZX), (Ldx, IMM), XXX,        (Ldy, ZP),  (Lda, ZP),  (Ldx, ZP),  XXX,
    (Tay, IMP), (Lda, IMM), (Tax, IMP), XXX,        (Ldy, ABS), (Lda, ABS), (Ldx, ABS), XXX,
    // 0xB0
    (Bcs, REL), (Lda, IZY), XXX,        XXX,        (Ldy, ZPX), (Lda, ZPX), (Ldx, ZPY), XXX,
    (Clv, IMP), (Lda, ABY), (Tsx, IMP), XXX,        (Ldy, ABX), (Lda, ABX), (Ldx, ABY), XXX,
    // 0xC0
    (Cpy, IMM), (Cmp, IZX), XXX,        XXX,        (Cpy, ZP),  (Cmp, ZP),  (Dec, ZP),  XXX,
    (Iny, IMP), (Cmp, IMM), (Dex, IMP), XXX,        (Cpy, ABS), (Cmp, ABS), (Dec, ABS), XXX,
    // 0xD0
    (Bne, REL), (Cmp, IZY), XXX,        XXX,        XXX,        (Cmp, ZPX), (Dec, ZPX), XXX,
    (Cld, IMP), (Cmp, ABY), XXX,        XXX,        XXX,        (Cmp, ABX), (Dec, ABX), XXX,
    // 0xE0
    (Cpx, IMM), (Sbc, IZX), XXX,        XXX,        (Cpx, ZP),  (Sbc, ZP),  (Inc, ZP),  XXX,
    (Inx, IMP), (Sbc, IMM), (Nop, IMP), XXX,        (Cpx, ABS), (Sbc, ABS), (Inc, ABS), XXX,
    // 0xF0
    (Beq, REL), (Sbc, IZY), XXX,        XXX,        XXX,        (Sbc, ZPX), (Inc, ZPX), XXX,
    (Sed, IMP), (Sbc, ABY), XXX,        XXX,        XXX,        (Sbc, ABX), (Inc, ABX), XXX,
];

/// Decode an opcode byte.
#[inline]
pub fn decode(opcode: u8) -> Opcode {
    OPCODES[opcode as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_opcode_count() {
        let legal = OPCODES
            .iter()
            .filter(|(m, _)| *m != Mnemonic::Illegal)
            .count();
        assert_eq!(legal, 151);
    }

    #[test]
    fn test_decode_samples() {
        assert_eq!(decode(0xA9), (Mnemonic::Lda, AddrMode::Immediate));
        assert_eq!(decode(0x6C), (Mnemonic::Jmp, AddrMode::Indirect));
        assert_eq!(decode(0xBE), (Mnemonic::Ldx, AddrMode::AbsoluteY));
        assert_eq!(decode(0x96), (Mnemonic::Stx, AddrMode::ZeroPageY));
        assert_eq!(decode(0x40), (Mnemonic::Rti, AddrMode::Implied));
        assert_eq!(decode(0x02).0, Mnemonic::Illegal);
        assert_eq!(decode(0xFF).0, Mnemonic::Illegal);
    }
}

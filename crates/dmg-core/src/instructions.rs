// ── SM83 instruction descriptors ────────────────────────────────────────────
//
// One descriptor per opcode, 256 base + 256 extended (0xCB-prefixed). Cycle
// counts are T-cycles. `cycles` is the cost when a conditional branch is not
// taken; `taken` the cost when it is (equal for everything else).

pub const PREFIX_CB: u8 = 0xCB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand { None, Byte, Word }

impl Operand {
    pub const fn len(self) -> u16 { match self { Operand::None => 0, Operand::Byte => 1, Operand::Word => 2 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub opcode: u8,
    pub extended: bool,
    pub operand: Operand,
    pub cycles: u8,
    pub taken: u8,
}

#[rustfmt::skip]
const BASE_CYCLES: [u8; 256] = [
//  0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
    4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4, // 0x
    4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 1x
    8, 12,  8,  8,  4,  4,  8,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 2x
    8, 12,  8,  8, 12, 12, 12,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 3x
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 4x
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 5x
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 6x
    8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4, // 7x
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 8x
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 9x
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // Ax
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // Bx
    8, 12, 12, 16, 12, 16,  8, 16,  8, 16, 12,  4, 12, 24,  8, 16, // Cx
    8, 12, 12,  4, 12, 16,  8, 16,  8, 16, 12,  4, 12,  4,  8, 16, // Dx
   12, 12,  8,  4,  4, 16,  8, 16, 16,  4, 16,  4,  4,  4,  8, 16, // Ex
   12, 12,  8,  4,  4, 16,  8, 16, 12,  8, 16,  4,  4,  4,  8, 16, // Fx
];

const fn base_operand(op: u8) -> Operand {
    match op {
        0x01 | 0x11 | 0x21 | 0x31 | 0x08 | 0xC2 | 0xC3 | 0xCA | 0xD2 | 0xDA
        | 0xC4 | 0xCC | 0xCD | 0xD4 | 0xDC | 0xEA | 0xFA => Operand::Word,
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E | 0x10
        | 0x18 | 0x20 | 0x28 | 0x30 | 0x38
        | 0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE
        | 0xE0 | 0xF0 | 0xE8 | 0xF8 => Operand::Byte,
        _ => Operand::None,
    }
}

const fn base_taken(op: u8) -> u8 {
    match op {
        0x20 | 0x28 | 0x30 | 0x38 => 12,
        0xC0 | 0xC8 | 0xD0 | 0xD8 => 20,
        0xC2 | 0xCA | 0xD2 | 0xDA => 16,
        0xC4 | 0xCC | 0xD4 | 0xDC => 24,
        _ => BASE_CYCLES[op as usize],
    }
}

const fn extended_cycles(op: u8) -> u8 {
    if op & 0x07 != 6 { 8 }
    else if op >> 6 == 1 { 12 } // BIT b,(HL)
    else { 16 }
}

const fn build_base() -> [Instr; 256] {
    let mut t = [Instr { opcode: 0, extended: false, operand: Operand::None, cycles: 0, taken: 0 }; 256];
    let mut i = 0;
    while i < 256 {
        let op = i as u8;
        t[i] = Instr { opcode: op, extended: false, operand: base_operand(op), cycles: BASE_CYCLES[i], taken: base_taken(op) };
        i += 1;
    }
    t
}

const fn build_extended() -> [Instr; 256] {
    let mut t = [Instr { opcode: 0, extended: true, operand: Operand::None, cycles: 0, taken: 0 }; 256];
    let mut i = 0;
    while i < 256 {
        let op = i as u8;
        let c = extended_cycles(op);
        t[i] = Instr { opcode: op, extended: true, operand: Operand::None, cycles: c, taken: c };
        i += 1;
    }
    t
}

pub static BASE: [Instr; 256] = build_base();
pub static EXTENDED: [Instr; 256] = build_extended();

/// Opcodes with no defined behaviour; executed as 4-cycle no-ops.
pub fn is_illegal(op: u8) -> bool {
    matches!(op, 0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_indexed_by_opcode() {
        for i in 0..256 {
            assert_eq!(BASE[i].opcode as usize, i);
            assert_eq!(EXTENDED[i].opcode as usize, i);
            assert!(!BASE[i].extended && EXTENDED[i].extended);
            assert!(BASE[i].taken >= BASE[i].cycles);
        }
    }

    #[test]
    fn branch_costs() {
        assert_eq!((BASE[0x20].cycles, BASE[0x20].taken), (8, 12));
        assert_eq!((BASE[0xC0].cycles, BASE[0xC0].taken), (8, 20));
        assert_eq!((BASE[0xC2].cycles, BASE[0xC2].taken), (12, 16));
        assert_eq!((BASE[0xC4].cycles, BASE[0xC4].taken), (12, 24));
        assert_eq!(BASE[0xCD].cycles, 24);
        assert_eq!(BASE[0xC9].cycles, 16);
    }

    #[test]
    fn operand_classes() {
        assert_eq!(BASE[0x00].operand, Operand::None);
        assert_eq!(BASE[0x3E].operand, Operand::Byte);
        assert_eq!(BASE[0xC3].operand, Operand::Word);
        assert_eq!(BASE[0x10].operand.len(), 1);
        assert!(EXTENDED.iter().all(|d| d.operand == Operand::None));
    }

    #[test]
    fn extended_costs() {
        assert_eq!(EXTENDED[0x00].cycles, 8);
        assert_eq!(EXTENDED[0x06].cycles, 16);
        assert_eq!(EXTENDED[0x46].cycles, 12);
        assert_eq!(EXTENDED[0xC6].cycles, 16);
    }
}

// ── Register file ────────────────────────────────────────────────────────────

use bitflags::bitflags;
use dmg_debug_abi::REGISTER_COUNT;

bitflags! {
    /// Flag register (low byte of AF). The low nibble does not exist in hardware.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const ZERO       = 0x80;
        const SUBTRACT   = 0x40;
        const HALF_CARRY = 0x20;
        const CARRY      = 0x10;
    }
}

impl Flags {
    pub fn from_raw(v: u8) -> Self { Flags::from_bits_truncate(v) }
    pub fn raw(self) -> u8 { self.bits() }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    pub a: u8, pub f: Flags, pub b: u8, pub c: u8,
    pub d: u8, pub e: u8, pub h: u8, pub l: u8,
    pub sp: u16, pub pc: u16,
}

impl Registers {
    /// Register values the boot ROM leaves behind on a DMG.
    pub fn post_boot() -> Self {
        let mut r = Registers::default();
        r.set_af(0x01B0); r.set_bc(0x0013); r.set_de(0x00D8); r.set_hl(0x014D);
        r.sp = 0xFFFE; r.pc = 0x0100;
        r
    }
    pub fn af(&self) -> u16 { ((self.a as u16) << 8) | (self.f.raw() as u16) }
    pub fn bc(&self) -> u16 { ((self.b as u16) << 8) | (self.c as u16) }
    pub fn de(&self) -> u16 { ((self.d as u16) << 8) | (self.e as u16) }
    pub fn hl(&self) -> u16 { ((self.h as u16) << 8) | (self.l as u16) }
    pub fn set_af(&mut self, v: u16) { self.a = (v >> 8) as u8; self.f = Flags::from_raw(v as u8); }
    pub fn set_bc(&mut self, v: u16) { self.b = (v >> 8) as u8; self.c = v as u8; }
    pub fn set_de(&mut self, v: u16) { self.d = (v >> 8) as u8; self.e = v as u8; }
    pub fn set_hl(&mut self, v: u16) { self.h = (v >> 8) as u8; self.l = v as u8; }

    pub fn flag_z(&self) -> bool { self.f.contains(Flags::ZERO) }
    pub fn flag_n(&self) -> bool { self.f.contains(Flags::SUBTRACT) }
    pub fn flag_h(&self) -> bool { self.f.contains(Flags::HALF_CARRY) }
    pub fn flag_c(&self) -> bool { self.f.contains(Flags::CARRY) }
    pub fn set_flag_z(&mut self, v: bool) { self.f.set(Flags::ZERO, v) }
    pub fn set_flag_n(&mut self, v: bool) { self.f.set(Flags::SUBTRACT, v) }
    pub fn set_flag_h(&mut self, v: bool) { self.f.set(Flags::HALF_CARRY, v) }
    pub fn set_flag_c(&mut self, v: bool) { self.f.set(Flags::CARRY, v) }

    /// Set all four flags at once, in Z N H C order.
    pub fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.set_flag_z(z); self.set_flag_n(n); self.set_flag_h(h); self.set_flag_c(c);
    }
}

// ── Interrupt-enable latency ────────────────────────────────────────────────

/// EI/DI take effect one instruction late. `Pending` is armed by the
/// instruction itself, becomes `Set` at the end of that step, and the master
/// enable flag flips when `Set` retires at the end of the following step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImeTransition { #[default] None, Pending, Set }

impl ImeTransition {
    pub fn raw(self) -> u8 { match self { ImeTransition::None => 0, ImeTransition::Pending => 1, ImeTransition::Set => 2 } }
    pub fn from_raw(v: u8) -> Option<Self> {
        match v { 0 => Some(ImeTransition::None), 1 => Some(ImeTransition::Pending), 2 => Some(ImeTransition::Set), _ => None }
    }
    pub fn is_armed(self) -> bool { self != ImeTransition::None }
}

// ── Symbolic register ids (debug surface) ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId { A, F, B, C, D, E, H, L, AF, BC, DE, HL, PC, SP, IME, IE, IF, HALT, STOP }

impl RegisterId {
    pub const ALL: [RegisterId; REGISTER_COUNT as usize] = [
        RegisterId::A, RegisterId::F, RegisterId::B, RegisterId::C, RegisterId::D, RegisterId::E,
        RegisterId::H, RegisterId::L, RegisterId::AF, RegisterId::BC, RegisterId::DE, RegisterId::HL,
        RegisterId::PC, RegisterId::SP, RegisterId::IME, RegisterId::IE, RegisterId::IF,
        RegisterId::HALT, RegisterId::STOP,
    ];

    pub fn from_index(idx: u32) -> Option<Self> { Self::ALL.get(idx as usize).copied() }
    pub fn index(self) -> u32 { self as u32 }

    /// Largest value the register can hold.
    pub fn max_value(self) -> u32 {
        match self {
            RegisterId::AF | RegisterId::BC | RegisterId::DE | RegisterId::HL
            | RegisterId::PC | RegisterId::SP => 0xFFFF,
            RegisterId::IME | RegisterId::HALT | RegisterId::STOP => 1,
            _ => 0xFF,
        }
    }
}

//! dmg-core — cycle-accurate DMG (original Game Boy) emulation engine
//!
//! SM83 interpreter, bus with MBC1/2/3/5 banking, and a scheduler that fans
//! each instruction's cycle cost out to audio, joypad, serial, timer and the
//! display state machine. One [`Engine`] owns one console; nothing is global.

use std::fmt;

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod engine;
pub mod host;
pub mod instructions;
pub mod interrupts;
pub mod joypad;
pub mod mbc;
pub mod ppu;
pub mod registers;
pub mod serial;
pub mod snapshot;
pub mod timer;

pub use cartridge::{header_checksum, Cartridge, Header, MapperKind};
pub use config::EngineConfig;
pub use cpu::{Cpu, CpuState, Memory};
pub use engine::{Engine, SavePaths};
pub use host::{Buttons, Host, NullHost};
pub use interrupts::{InterruptController, Interrupts};
pub use registers::{Flags, RegisterId, Registers};
pub use dmg_debug_abi::{DebugKind, DebugRequest, DebugResponse, Status, REGISTER_SPACE};

// ── Hardware constants ──────────────────────────────────────────────────────
pub const CPU_HZ: u64 = 4_194_304;
pub const SCANLINES: u32 = 154;
pub const DOTS_PER_LINE: u32 = 456;
pub const CYCLES_PER_FRAME: u64 = (SCANLINES as u64) * (DOTS_PER_LINE as u64);
pub const LCD_WIDTH: usize = 160;
pub const LCD_HEIGHT: usize = 144;
pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
pub const BOOT_ROM_SIZE: usize = 0x100;

// ── Clock ───────────────────────────────────────────────────────────────────
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Clock { pub t_cycles: u64 }
impl Clock {
    pub fn tick(&mut self, c: u32) { self.t_cycles = self.t_cycles.wrapping_add(c as u64); }
    pub fn frame_count(&self) -> u64 { self.t_cycles / CYCLES_PER_FRAME }
    pub fn current_scanline(&self) -> u32 { ((self.t_cycles % CYCLES_PER_FRAME) / DOTS_PER_LINE as u64) as u32 }
}

// ── Error ───────────────────────────────────────────────────────────────────
#[derive(Debug)]
pub enum CoreError {
    ImageTooShort(usize),
    HeaderChecksum { expected: u8, actual: u8 },
    UnsupportedMapper(u8),
    UnsupportedRomSize(u8),
    UnsupportedRamSize(u8),
    LengthMismatch { expected: usize, actual: usize },
    ColorOnly,
    BootRomSize(usize),
    NotLoaded,
    BadSnapshot(String),
    Io(std::io::Error),
    Config(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::ImageTooShort(n) => write!(f, "ImageTooShort: {n} bytes, need at least {ROM_BANK_SIZE}"),
            CoreError::HeaderChecksum { expected, actual } =>
                write!(f, "HeaderChecksum: header says {expected:#04x}, computed {actual:#04x}"),
            CoreError::UnsupportedMapper(b) => write!(f, "UnsupportedMapper: cartridge type {b:#04x}"),
            CoreError::UnsupportedRomSize(b) => write!(f, "UnsupportedRomSize: code {b:#04x}"),
            CoreError::UnsupportedRamSize(b) => write!(f, "UnsupportedRamSize: code {b:#04x}"),
            CoreError::LengthMismatch { expected, actual } => write!(f, "LengthMismatch: expected {expected} bytes, got {actual}"),
            CoreError::ColorOnly => write!(f, "ColorOnly: cartridge requires a color console"),
            CoreError::BootRomSize(n) => write!(f, "BootRomSize: {n} bytes, expected {BOOT_ROM_SIZE}"),
            CoreError::NotLoaded => write!(f, "NotLoaded: no cartridge inserted"),
            CoreError::BadSnapshot(s) => write!(f, "BadSnapshot: {s}"),
            CoreError::Io(e) => write!(f, "Io: {e}"),
            CoreError::Config(s) => write!(f, "Config: {s}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self { CoreError::Io(e) => Some(e), _ => None }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self { CoreError::Io(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_frame_and_line() {
        let mut c = Clock::default();
        c.tick(DOTS_PER_LINE * 3 + 10);
        assert_eq!(c.current_scanline(), 3);
        assert_eq!(c.frame_count(), 0);
        c.tick(CYCLES_PER_FRAME as u32);
        assert_eq!((c.frame_count(), c.current_scanline()), (1, 3));
    }

    #[test]
    fn error_messages_name_the_problem() {
        let e = CoreError::HeaderChecksum { expected: 0x12, actual: 0x34 };
        assert_eq!(e.to_string(), "HeaderChecksum: header says 0x12, computed 0x34");
        let io: CoreError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short").into();
        assert!(matches!(io, CoreError::Io(_)));
        assert!(std::error::Error::source(&io).is_some());
    }
}

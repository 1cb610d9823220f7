//! Memory bank controllers.
//!
//! Each variant owns only its control registers and the two derived bank
//! indices; ROM and RAM buffers belong to [`Cartridge`](crate::cartridge::Cartridge)
//! and are passed in for RAM accesses. Bank indices are recomputed after
//! every control write and masked by `count - 1` (counts are powers of two).

use crate::cartridge::{Header, MapperKind};
use crate::snapshot::{Snapshot, StateReader, StateWriter};
use crate::{RAM_BANK_SIZE, ROM_BANK_SIZE};
use std::io;

pub trait Mapper: Snapshot {
    fn kind(&self) -> MapperKind;
    /// Handle a CPU write into 0x0000..=0x7FFF.
    fn write_control(&mut self, addr: u16, v: u8);
    /// Bank mapped into the switchable 0x4000..=0x7FFF window.
    fn rom_bank(&self) -> usize;
    fn ram_bank(&self) -> usize;
    fn ram_enabled(&self) -> bool;

    /// Image offset for a ROM-window address.
    fn rom_offset(&self, addr: u16) -> usize {
        match addr {
            0x0000..=0x3FFF => addr as usize,
            _ => self.rom_bank() * ROM_BANK_SIZE + (addr as usize & (ROM_BANK_SIZE - 1)),
        }
    }
    fn read_ram(&self, ram: &[u8], addr: u16) -> u8 {
        let off = self.ram_bank() * RAM_BANK_SIZE + (addr as usize & (RAM_BANK_SIZE - 1));
        ram.get(off).copied().unwrap_or(0xFF)
    }
    fn write_ram(&mut self, ram: &mut [u8], addr: u16, v: u8) {
        let off = self.ram_bank() * RAM_BANK_SIZE + (addr as usize & (RAM_BANK_SIZE - 1));
        if let Some(slot) = ram.get_mut(off) { *slot = v; }
    }
}

/// Pick the controller for a parsed header.
pub fn for_header(h: &Header) -> Box<dyn Mapper> {
    let banks = Banks::new(h.rom_banks, h.ram_banks);
    match h.kind {
        MapperKind::None => Box::new(RomOnly { banks }),
        MapperKind::Mbc1 => Box::new(Mbc1::new(banks)),
        MapperKind::Mbc2 => Box::new(Mbc2::new(banks)),
        MapperKind::Mbc3 => Box::new(Mbc3::new(banks)),
        MapperKind::Mbc5 => Box::new(Mbc5::new(banks)),
    }
}

// ── Shared bank state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banks {
    rom_count: usize,
    ram_count: usize,
    pub rom: usize,
    pub ram: usize,
    pub ram_enable: bool,
}

impl Banks {
    pub fn new(rom_count: usize, ram_count: usize) -> Self {
        Banks { rom_count, ram_count, rom: 1 & (rom_count - 1), ram: 0, ram_enable: false }
    }
    fn set(&mut self, rom: usize, ram: usize) {
        self.rom = rom & (self.rom_count - 1);
        self.ram = ram & (self.ram_count.max(1) - 1);
    }
    /// Enable latch: set iff the low nibble is 0x0A.
    fn latch_enable(&mut self, v: u8) { self.ram_enable = v & 0x0F == 0x0A; }

    fn save(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u16(self.rom as u16)?; w.u8(self.ram as u8)?; w.bool(self.ram_enable)
    }
    fn load(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        let rom = r.u16()? as usize; let ram = r.u8()? as usize;
        self.set(rom, ram);
        self.ram_enable = r.bool()?;
        Ok(())
    }
}

// ── No controller ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RomOnly { banks: Banks }

impl Mapper for RomOnly {
    fn kind(&self) -> MapperKind { MapperKind::None }
    fn write_control(&mut self, _addr: u16, _v: u8) {}
    fn rom_bank(&self) -> usize { self.banks.rom }
    fn ram_bank(&self) -> usize { 0 }
    // No enable register on these boards; RAM, when fitted, is always live.
    fn ram_enabled(&self) -> bool { true }
}

impl Snapshot for RomOnly {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> { self.banks.save(w) }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> { self.banks.load(r) }
}

// ── MBC1 ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Mbc1 { banks: Banks, bank_lo: u8, bank_hi: u8, mode: u8 }

impl Mbc1 {
    pub fn new(banks: Banks) -> Self { let mut m = Mbc1 { banks, bank_lo: 1, bank_hi: 0, mode: 0 }; m.update(); m }

    fn update(&mut self) {
        // Mode 0: high bits extend the ROM bank. Mode 1: they select the RAM bank.
        let (mut rom, ram) = if self.mode == 0 {
            (self.bank_lo as usize | ((self.bank_hi as usize) << 5), 0)
        } else {
            (self.bank_lo as usize, self.bank_hi as usize)
        };
        if matches!(rom, 0x00 | 0x20 | 0x40 | 0x60) { rom += 1; }
        self.banks.set(rom, ram);
    }
}

impl Mapper for Mbc1 {
    fn kind(&self) -> MapperKind { MapperKind::Mbc1 }
    fn write_control(&mut self, addr: u16, v: u8) {
        match addr {
            0x0000..=0x1FFF => { self.banks.latch_enable(v); return; }
            0x2000..=0x3FFF => self.bank_lo = v & 0x7F,
            0x4000..=0x5FFF => self.bank_hi = v & 0x03,
            _ => self.mode = v & 0x01,
        }
        self.update();
    }
    fn rom_bank(&self) -> usize { self.banks.rom }
    fn ram_bank(&self) -> usize { self.banks.ram }
    fn ram_enabled(&self) -> bool { self.banks.ram_enable }
}

impl Snapshot for Mbc1 {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        self.banks.save(w)?; w.u8(self.bank_lo)?; w.u8(self.bank_hi)?; w.u8(self.mode)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.banks.load(r)?;
        self.bank_lo = r.u8()? & 0x7F; self.bank_hi = r.u8()? & 0x03; self.mode = r.u8()? & 0x01;
        self.update();
        Ok(())
    }
}

// ── MBC2 ────────────────────────────────────────────────────────────────────

/// Built-in RAM: 512 four-bit cells, mirrored across 0xA000..=0xBFFF.
pub const MBC2_RAM_CELLS: usize = 512;

#[derive(Debug, Clone)]
pub struct Mbc2 { banks: Banks, bank: u8 }

impl Mbc2 {
    pub fn new(banks: Banks) -> Self { let mut m = Mbc2 { banks, bank: 1 }; m.update(); m }
    fn update(&mut self) {
        let rom = if self.bank == 0 { 1 } else { self.bank as usize };
        self.banks.set(rom, 0);
    }
}

impl Mapper for Mbc2 {
    fn kind(&self) -> MapperKind { MapperKind::Mbc2 }
    fn write_control(&mut self, addr: u16, v: u8) {
        if addr > 0x3FFF { return; }
        // Address bit 8 picks the register.
        if addr & 0x0100 == 0 { self.banks.latch_enable(v); return; }
        self.bank = v & 0x0F;
        self.update();
    }
    fn rom_bank(&self) -> usize { self.banks.rom }
    fn ram_bank(&self) -> usize { 0 }
    fn ram_enabled(&self) -> bool { self.banks.ram_enable }
    fn read_ram(&self, ram: &[u8], addr: u16) -> u8 {
        0xF0 | (ram.get(addr as usize & (MBC2_RAM_CELLS - 1)).copied().unwrap_or(0x0F) & 0x0F)
    }
    fn write_ram(&mut self, ram: &mut [u8], addr: u16, v: u8) {
        if let Some(slot) = ram.get_mut(addr as usize & (MBC2_RAM_CELLS - 1)) { *slot = v & 0x0F; }
    }
}

impl Snapshot for Mbc2 {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> { self.banks.save(w)?; w.u8(self.bank) }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.banks.load(r)?; self.bank = r.u8()? & 0x0F; self.update(); Ok(())
    }
}

// ── MBC3 ────────────────────────────────────────────────────────────────────
// The real-time clock registers are not modelled: every RAM-bank select value
// is taken as a plain RAM bank.

#[derive(Debug, Clone)]
pub struct Mbc3 { banks: Banks, rom_sel: u8, ram_sel: u8 }

impl Mbc3 {
    pub fn new(banks: Banks) -> Self { let mut m = Mbc3 { banks, rom_sel: 1, ram_sel: 0 }; m.update(); m }
    fn update(&mut self) {
        let rom = if self.rom_sel == 0 { 1 } else { self.rom_sel as usize };
        self.banks.set(rom, self.ram_sel as usize);
    }
}

impl Mapper for Mbc3 {
    fn kind(&self) -> MapperKind { MapperKind::Mbc3 }
    fn write_control(&mut self, addr: u16, v: u8) {
        match addr {
            0x0000..=0x1FFF => { self.banks.latch_enable(v); return; }
            0x2000..=0x3FFF => self.rom_sel = v & 0x7F,
            0x4000..=0x5FFF => self.ram_sel = v & 0x03,
            _ => return, // clock latch
        }
        self.update();
    }
    fn rom_bank(&self) -> usize { self.banks.rom }
    fn ram_bank(&self) -> usize { self.banks.ram }
    fn ram_enabled(&self) -> bool { self.banks.ram_enable }
}

impl Snapshot for Mbc3 {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        self.banks.save(w)?; w.u8(self.rom_sel)?; w.u8(self.ram_sel)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.banks.load(r)?;
        self.rom_sel = r.u8()? & 0x7F; self.ram_sel = r.u8()? & 0x03;
        self.update();
        Ok(())
    }
}

// ── MBC5 ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Mbc5 { banks: Banks, rom_lo: u8, rom_hi: u8, ram_sel: u8 }

impl Mbc5 {
    pub fn new(banks: Banks) -> Self { let mut m = Mbc5 { banks, rom_lo: 1, rom_hi: 0, ram_sel: 0 }; m.update(); m }
    fn update(&mut self) {
        let rom = ((self.rom_hi as usize) << 8) | self.rom_lo as usize;
        self.banks.set(rom, self.ram_sel as usize);
    }
}

impl Mapper for Mbc5 {
    fn kind(&self) -> MapperKind { MapperKind::Mbc5 }
    fn write_control(&mut self, addr: u16, v: u8) {
        match addr {
            0x0000..=0x1FFF => { self.banks.latch_enable(v); return; }
            0x2000..=0x2FFF => self.rom_lo = v,
            0x3000..=0x3FFF => self.rom_hi = v & 0x01,
            0x4000..=0x5FFF => self.ram_sel = v & 0x0F,
            _ => return,
        }
        self.update();
    }
    fn rom_bank(&self) -> usize { self.banks.rom }
    fn ram_bank(&self) -> usize { self.banks.ram }
    fn ram_enabled(&self) -> bool { self.banks.ram_enable }
}

impl Snapshot for Mbc5 {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        self.banks.save(w)?; w.u8(self.rom_lo)?; w.u8(self.rom_hi)?; w.u8(self.ram_sel)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.banks.load(r)?;
        self.rom_lo = r.u8()?; self.rom_hi = r.u8()? & 0x01; self.ram_sel = r.u8()? & 0x0F;
        self.update();
        Ok(())
    }
}

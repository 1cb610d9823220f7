//! Synthetic cartridge images and a flat memory for processor tests.
#![allow(dead_code)]

use dmg_core::cartridge::{HEADER_CART_TYPE, HEADER_CHECKSUM, HEADER_RAM_SIZE, HEADER_ROM_SIZE};
use dmg_core::{header_checksum, InterruptController, Memory, ROM_BANK_SIZE};

pub const TITLE: &str = "DMG_TEST";

/// Cartridge image with `program` at 0x0100 and a valid header checksum.
pub fn rom_with(cart_type: u8, rom_code: u8, ram_code: u8, program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; ROM_BANK_SIZE * (2usize << rom_code)];
    rom[0x100..0x100 + program.len()].copy_from_slice(program);
    for (i, b) in TITLE.bytes().enumerate() { rom[0x134 + i] = b; }
    rom[HEADER_CART_TYPE] = cart_type;
    rom[HEADER_ROM_SIZE] = rom_code;
    rom[HEADER_RAM_SIZE] = ram_code;
    rom[HEADER_CHECKSUM] = header_checksum(&rom);
    rom
}

/// 32KB, no mapper, no RAM.
pub fn rom(program: &[u8]) -> Vec<u8> { rom_with(0x00, 0x00, 0x00, program) }

/// Tag the first byte of every ROM bank with its index, then fix the checksum.
pub fn tag_banks(rom: &mut [u8]) {
    for bank in 1..rom.len() / ROM_BANK_SIZE { rom[bank * ROM_BANK_SIZE] = bank as u8; }
    rom[HEADER_CHECKSUM] = header_checksum(rom);
}

/// 64KB of plain RAM plus an interrupt controller.
pub struct FlatMemory { pub bytes: Vec<u8>, pub ic: InterruptController }

impl FlatMemory {
    pub fn with_program(at: u16, program: &[u8]) -> Self {
        let mut bytes = vec![0u8; 0x10000];
        bytes[at as usize..at as usize + program.len()].copy_from_slice(program);
        FlatMemory { bytes, ic: InterruptController::default() }
    }
}

impl Memory for FlatMemory {
    fn read(&self, addr: u16) -> u8 { self.bytes[addr as usize] }
    fn write(&mut self, addr: u16, value: u8) { self.bytes[addr as usize] = value; }
    fn interrupts(&mut self) -> &mut InterruptController { &mut self.ic }
}

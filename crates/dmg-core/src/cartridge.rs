// ── Cartridge header ────────────────────────────────────────────────────────

use crate::mbc::{self, Mapper};
use crate::{CoreError, RAM_BANK_SIZE, ROM_BANK_SIZE};

pub const HEADER_TITLE: std::ops::Range<usize> = 0x0134..0x0143;
pub const HEADER_COLOR_FLAG: usize = 0x0143;
pub const HEADER_CART_TYPE: usize = 0x0147;
pub const HEADER_ROM_SIZE: usize = 0x0148;
pub const HEADER_RAM_SIZE: usize = 0x0149;
pub const HEADER_CHECKSUM: usize = 0x014D;
/// Bytes covered by the header checksum.
pub const CHECKSUM_RANGE: std::ops::RangeInclusive<usize> = 0x0134..=0x014C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind { None, Mbc1, Mbc2, Mbc3, Mbc5 }

impl MapperKind {
    /// Cartridge-type byte → (variant, has battery).
    pub fn from_header_byte(b: u8) -> Option<(Self, bool)> {
        Some(match b {
            0x00 | 0x08 => (MapperKind::None, false),
            0x09 => (MapperKind::None, true),
            0x01 | 0x02 => (MapperKind::Mbc1, false),
            0x03 => (MapperKind::Mbc1, true),
            0x05 => (MapperKind::Mbc2, false),
            0x06 => (MapperKind::Mbc2, true),
            0x11 | 0x12 => (MapperKind::Mbc3, false),
            0x0F | 0x10 | 0x13 => (MapperKind::Mbc3, true),
            0x19 | 0x1A | 0x1C | 0x1D => (MapperKind::Mbc5, false),
            0x1B | 0x1E => (MapperKind::Mbc5, true),
            _ => return None,
        })
    }
}

/// ROM size code → number of 16KB banks.
pub fn rom_banks(code: u8) -> Option<usize> { if code <= 0x08 { Some(2usize << code) } else { None } }

/// RAM size code → number of 8KB banks.
pub fn ram_banks(code: u8) -> Option<usize> {
    match code { 0x00 => Some(0), 0x01 | 0x02 => Some(1), 0x03 => Some(4), 0x04 => Some(16), 0x05 => Some(8), _ => None }
}

/// `acc = acc - byte - 1` over the checksum range.
pub fn header_checksum(image: &[u8]) -> u8 {
    image[CHECKSUM_RANGE].iter().fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub kind: MapperKind,
    pub battery: bool,
    pub rom_banks: usize,
    pub ram_banks: usize,
    pub checksum: u8,
}

impl Header {
    /// Validate and decode the header of a full cartridge image.
    pub fn parse(image: &[u8]) -> Result<Self, CoreError> {
        if image.len() < ROM_BANK_SIZE { return Err(CoreError::ImageTooShort(image.len())); }
        let expected = image[HEADER_CHECKSUM];
        let actual = header_checksum(image);
        if expected != actual { return Err(CoreError::HeaderChecksum { expected, actual }); }
        if image[HEADER_COLOR_FLAG] == 0xC0 { return Err(CoreError::ColorOnly); }
        let (kind, battery) = MapperKind::from_header_byte(image[HEADER_CART_TYPE])
            .ok_or(CoreError::UnsupportedMapper(image[HEADER_CART_TYPE]))?;
        let rom_banks = rom_banks(image[HEADER_ROM_SIZE]).ok_or(CoreError::UnsupportedRomSize(image[HEADER_ROM_SIZE]))?;
        let mut ram_banks = ram_banks(image[HEADER_RAM_SIZE]).ok_or(CoreError::UnsupportedRamSize(image[HEADER_RAM_SIZE]))?;
        // MBC2 carries its own 512x4 RAM regardless of the size code.
        if kind == MapperKind::Mbc2 { ram_banks = 1; }
        let expected_len = rom_banks * ROM_BANK_SIZE;
        if image.len() != expected_len { return Err(CoreError::LengthMismatch { expected: expected_len, actual: image.len() }); }
        let title = String::from_utf8_lossy(&image[HEADER_TITLE]).trim_matches('\0').to_string();
        Ok(Header { title, kind, battery, rom_banks, ram_banks, checksum: expected })
    }

    pub fn ram_len(&self) -> usize { self.ram_banks * RAM_BANK_SIZE }
}

// ── Cartridge ───────────────────────────────────────────────────────────────

pub struct Cartridge {
    pub header: Header,
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mapper: Box<dyn Mapper>,
}

impl Cartridge {
    pub fn from_bytes(rom: Vec<u8>) -> Result<Self, CoreError> {
        let header = Header::parse(&rom)?;
        let mapper = mbc::for_header(&header);
        let ram = vec![0u8; header.ram_len()];
        log::debug!("cartridge '{}' {:?} rom_banks={} ram_banks={} battery={}",
            header.title, header.kind, header.rom_banks, header.ram_banks, header.battery);
        Ok(Cartridge { header, rom, ram, mapper })
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let off = self.mapper.rom_offset(addr);
        self.rom.get(off).copied().unwrap_or(0xFF)
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.mapper.ram_enabled() || self.ram.is_empty() { return 0xFF; }
        self.mapper.read_ram(&self.ram, addr)
    }

    pub fn write_ram(&mut self, addr: u16, v: u8) {
        if !self.mapper.ram_enabled() || self.ram.is_empty() { return; }
        self.mapper.write_ram(&mut self.ram, addr, v);
    }

    /// Writes into 0x0000..=0x7FFF land on the mapper's control registers.
    pub fn write_control(&mut self, addr: u16, v: u8) { self.mapper.write_control(addr, v); }
}

impl std::fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cartridge")
            .field("header", &self.header)
            .field("rom_bank", &self.mapper.rom_bank())
            .field("ram_bank", &self.mapper.ram_bank())
            .finish()
    }
}

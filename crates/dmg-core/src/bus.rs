// ── Bus / address dispatch ──────────────────────────────────────────────────

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::config::EngineConfig;
use crate::cpu::Memory;
use crate::host::Host;
use crate::interrupts::InterruptController;
use crate::joypad::Joypad;
use crate::ppu::Ppu;
use crate::serial::Serial;
use crate::snapshot::{invalid_data, Snapshot, StateReader, StateWriter};
use crate::timer::Timer;
use crate::BOOT_ROM_SIZE;
use std::io;

pub const BOOT_DISABLE: u16 = 0xFF50;
pub const DMA_REG: u16 = 0xFF46;
pub const DMA_LEN: u8 = 0xA0;

// ── OAM DMA ─────────────────────────────────────────────────────────────────
/// Sprite-table copy, one byte per cycle, running alongside the CPU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dma { pub reg: u8, pub active: bool, index: u8 }

impl Dma {
    pub fn start(&mut self, v: u8) {
        log::debug!("oam dma from {:#06X}", (v as u16) << 8);
        self.reg = v; self.active = true; self.index = 0;
    }
    pub fn source(&self) -> u16 { ((self.reg as u16) << 8) | self.index as u16 }
}

impl Snapshot for Dma {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u8(self.reg)?; w.bool(self.active)?; w.u8(self.index)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.reg = r.u8()?; self.active = r.bool()?; self.index = r.u8()?;
        if self.index > DMA_LEN || (self.active && self.index == DMA_LEN) { return Err(invalid_data("dma index")); }
        Ok(())
    }
}

/// What happened during one [`Bus::advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Advance { pub frame_complete: bool, pub button_pressed: bool }

// ── Bus ─────────────────────────────────────────────────────────────────────
pub struct Bus {
    pub cart: Cartridge,
    boot_rom: Option<Vec<u8>>,
    pub boot_active: bool,
    pub wram: [u8; 0x2000], pub hram: [u8; 0x7F],
    pub vram: [u8; 0x2000], pub oam: [u8; 0xA0],
    pub ic: InterruptController,
    pub apu: Apu, pub joypad: Joypad, pub serial: Serial, pub timer: Timer, pub ppu: Ppu,
    pub dma: Dma,
    log_unmapped: bool,
}

impl Bus {
    /// With a boot ROM the machine starts cold; without one the I/O block
    /// holds the values the boot ROM would have left.
    pub fn new(cart: Cartridge, boot_rom: Option<Vec<u8>>, cfg: &EngineConfig) -> Self {
        let cold = boot_rom.is_some();
        Bus {
            cart, boot_active: cold, boot_rom,
            wram: [0; 0x2000], hram: [0; 0x7F], vram: [0; 0x2000], oam: [0; 0xA0],
            ic: InterruptController::default(),
            apu: if cold { Apu::default() } else { Apu::post_boot() },
            joypad: Joypad::new(cfg.joypad_poll_cycles),
            serial: Serial::default(), timer: Timer::default(),
            ppu: if cold { Ppu::default() } else { Ppu::post_boot() },
            dma: Dma::default(),
            log_unmapped: cfg.log_unmapped,
        }
    }

    pub fn boot_rom(&self) -> Option<&[u8]> { self.boot_rom.as_deref() }

    fn unmapped_read(&self, addr: u16) -> u8 {
        if self.log_unmapped { log::warn!("read from unmapped address {addr:#06X}"); }
        0xFF
    }

    fn unmapped_write(&self, addr: u16, v: u8) {
        if self.log_unmapped { log::warn!("write {v:#04X} to unmapped address {addr:#06X}"); }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_active => match &self.boot_rom {
                Some(b) if b.len() == BOOT_ROM_SIZE => b[addr as usize],
                _ => self.cart.read_rom(addr),
            },
            0x0000..=0x7FFF => self.cart.read_rom(addr),
            0x8000..=0x9FFF => if self.ppu.vram_accessible() { self.vram[(addr - 0x8000) as usize] } else { 0xFF },
            0xA000..=0xBFFF => self.cart.read_ram(addr),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => if self.ppu.oam_accessible() { self.oam[(addr - 0xFE00) as usize] } else { 0xFF },
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read((addr & 0xFF) as u8),
            0xFF04..=0xFF07 => self.timer.read((addr & 0xFF) as u8),
            0xFF0F => self.ic.read_if(),
            0xFF10..=0xFF3F => self.apu.read_reg((addr & 0xFF) as u8),
            DMA_REG => self.dma.reg,
            0xFF40..=0xFF4B => self.ppu.read_reg((addr & 0xFF) as u8),
            BOOT_DISABLE => 0xFF,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ic.read_ie(),
            _ => self.unmapped_read(addr),
        }
    }

    pub fn write(&mut self, addr: u16, v: u8) {
        match addr {
            0x0000..=0x7FFF => self.cart.write_control(addr, v),
            0x8000..=0x9FFF => if self.ppu.vram_accessible() { self.vram[(addr - 0x8000) as usize] = v },
            0xA000..=0xBFFF => self.cart.write_ram(addr, v),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = v,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = v,
            0xFE00..=0xFE9F => if self.ppu.oam_accessible() { self.oam[(addr - 0xFE00) as usize] = v },
            0xFF00 => self.joypad.write(v),
            0xFF01 | 0xFF02 => self.serial.write((addr & 0xFF) as u8, v),
            0xFF04..=0xFF07 => self.timer.write((addr & 0xFF) as u8, v),
            0xFF0F => self.ic.write_if(v),
            0xFF10..=0xFF3F => self.apu.write_reg((addr & 0xFF) as u8, v),
            DMA_REG => self.dma.start(v),
            0xFF40..=0xFF4B => self.ppu.write_reg((addr & 0xFF) as u8, v),
            BOOT_DISABLE => {
                if v != 0 && self.boot_active {
                    log::debug!("boot overlay disabled");
                    self.boot_active = false;
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = v,
            0xFFFF => self.ic.write_ie(v),
            _ => self.unmapped_write(addr, v),
        }
    }

    /// Fan a step's cycle cost out to the peripherals, in hardware order.
    pub fn advance(&mut self, cycles: u32, host: &mut dyn Host) -> Advance {
        self.apu.step(cycles);
        let button_pressed = self.joypad.step(cycles, host, &mut self.ic);
        self.serial.step(cycles, host, &mut self.ic);
        self.timer.step(cycles, &mut self.ic);
        let frame_complete = self.ppu.step(cycles, &self.vram, &self.oam, &mut self.ic);
        self.step_dma(cycles);
        Advance { frame_complete, button_pressed }
    }

    fn step_dma(&mut self, cycles: u32) {
        let mut left = cycles;
        while self.dma.active && left > 0 {
            let b = match self.dma.source() {
                // DMA reads the raw buses, not the CPU's gated view.
                a @ 0x8000..=0x9FFF => self.vram[(a - 0x8000) as usize],
                a @ 0xFE00..=0xFFFF => self.wram[(a - 0xE000) as usize & 0x1FFF],
                a => self.read(a),
            };
            self.oam[self.dma.index as usize] = b;
            self.dma.index += 1;
            if self.dma.index == DMA_LEN { self.dma.active = false; }
            left -= 1;
        }
    }

    /// Audio, joypad, serial and timer, in snapshot order.
    pub fn save_peripherals(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        self.apu.save_state(w)?; self.joypad.save_state(w)?;
        self.serial.save_state(w)?; self.timer.save_state(w)
    }
    pub fn load_peripherals(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.apu.load_state(r)?; self.joypad.load_state(r)?;
        self.serial.load_state(r)?; self.timer.load_state(r)
    }

    /// Interrupts, display, DMA, mapper, boot latch and every backing buffer.
    pub fn save_system(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        self.ic.save_state(w)?;
        self.ppu.save_state(w)?;
        self.dma.save_state(w)?;
        self.cart.mapper.save_state(w)?;
        w.bool(self.boot_active)?;
        w.bytes(&self.wram)?; w.bytes(&self.hram)?; w.bytes(&self.vram)?; w.bytes(&self.oam)?;
        w.bytes(&self.cart.ram)?;
        w.bytes(&self.ppu.framebuffer)
    }
    pub fn load_system(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.ic.load_state(r)?;
        self.ppu.load_state(r)?;
        self.dma.load_state(r)?;
        self.cart.mapper.load_state(r)?;
        self.boot_active = r.bool()? && self.boot_rom.is_some();
        r.fill(&mut self.wram)?; r.fill(&mut self.hram)?; r.fill(&mut self.vram)?; r.fill(&mut self.oam)?;
        r.fill(&mut self.cart.ram)?;
        r.fill(&mut self.ppu.framebuffer)
    }
}

impl Memory for Bus {
    fn read(&self, addr: u16) -> u8 { Bus::read(self, addr) }
    fn write(&mut self, addr: u16, value: u8) { Bus::write(self, addr, value) }
    fn interrupts(&mut self) -> &mut InterruptController { &mut self.ic }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("cart", &self.cart)
            .field("boot_active", &self.boot_active)
            .field("ic", &self.ic)
            .field("dma", &self.dma)
            .finish_non_exhaustive()
    }
}

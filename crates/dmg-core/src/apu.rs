// ── Audio register block ────────────────────────────────────────────────────
//
// Bookkeeping only: register file, wave RAM, power gate, channel-active bits
// and the length counters driven by the 512 Hz frame sequencer. No samples
// are synthesised.

use crate::snapshot::{invalid_data, Snapshot, StateReader, StateWriter};
use std::io;

/// Frame sequencer period in cycles (512 Hz).
pub const FRAME_SEQ_CYCLES: u32 = 8192;

const REG_BASE: u8 = 0x10;
const NR52: u8 = 0x26;

/// Bits that always read back as 1, indexed from 0xFF10.
#[rustfmt::skip]
const READ_MASK: [u8; 0x17] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // ----, NR21-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // ----, NR41-NR44
    0x00, 0x00, 0x70,             // NR50-NR52
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apu {
    regs: [u8; 0x17],
    pub wave_ram: [u8; 16],
    pub power: bool,
    /// Channel-active bits as shown in NR52 (bit 0 = channel 1).
    pub active: u8,
    length: [u16; 4],
    phase: u32,
    seq_step: u8,
}

impl Default for Apu {
    fn default() -> Self {
        Apu { regs: [0; 0x17], wave_ram: [0; 16], power: false, active: 0, length: [0; 4], phase: 0, seq_step: 0 }
    }
}

impl Apu {
    /// Power-on state left by the boot ROM.
    pub fn post_boot() -> Self {
        let mut a = Apu::default();
        a.power = true;
        a.active = 0x01;
        a.regs[(0x24 - REG_BASE) as usize] = 0x77;
        a.regs[(0x25 - REG_BASE) as usize] = 0xF3;
        a
    }

    fn reg(&self, r: u8) -> u8 { self.regs[(r - REG_BASE) as usize] }

    pub fn read_reg(&self, r: u8) -> u8 {
        match r {
            0x30..=0x3F => self.wave_ram[(r - 0x30) as usize],
            NR52 => 0x70 | ((self.power as u8) << 7) | self.active,
            0x10..=0x25 => self.reg(r) | READ_MASK[(r - REG_BASE) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, r: u8, v: u8) {
        match r {
            0x30..=0x3F => self.wave_ram[(r - 0x30) as usize] = v,
            NR52 => {
                let on = v & 0x80 != 0;
                if self.power && !on {
                    self.regs = [0; 0x17];
                    self.active = 0;
                    self.length = [0; 4];
                }
                if !self.power && on { self.seq_step = 0; }
                self.power = on;
            }
            0x10..=0x25 if self.power => {
                self.regs[(r - REG_BASE) as usize] = v;
                self.on_write(r, v);
            }
            _ => {}
        }
    }

    fn on_write(&mut self, r: u8, v: u8) {
        match r {
            0x11 => self.length[0] = 64 - (v & 0x3F) as u16,
            0x16 => self.length[1] = 64 - (v & 0x3F) as u16,
            0x1B => self.length[2] = 256 - v as u16,
            0x20 => self.length[3] = 64 - (v & 0x3F) as u16,
            0x12 | 0x17 | 0x21 if v & 0xF8 == 0 => self.active &= !(1 << Self::channel_of(r)),
            0x1A if v & 0x80 == 0 => self.active &= !0x04,
            0x14 | 0x19 | 0x1E | 0x23 if v & 0x80 != 0 => self.trigger(Self::channel_of(r)),
            _ => {}
        }
    }

    fn channel_of(r: u8) -> usize {
        match r { 0x10..=0x14 => 0, 0x15..=0x19 => 1, 0x1A..=0x1E => 2, _ => 3 }
    }

    fn dac_on(&self, ch: usize) -> bool {
        match ch {
            0 => self.reg(0x12) & 0xF8 != 0,
            1 => self.reg(0x17) & 0xF8 != 0,
            2 => self.reg(0x1A) & 0x80 != 0,
            _ => self.reg(0x21) & 0xF8 != 0,
        }
    }

    fn trigger(&mut self, ch: usize) {
        if self.length[ch] == 0 { self.length[ch] = if ch == 2 { 256 } else { 64 }; }
        if self.dac_on(ch) { self.active |= 1 << ch; }
    }

    pub fn step(&mut self, cycles: u32) {
        if !self.power { return; }
        self.phase += cycles;
        while self.phase >= FRAME_SEQ_CYCLES {
            self.phase -= FRAME_SEQ_CYCLES;
            if self.seq_step & 1 == 0 { self.clock_length(); }
            self.seq_step = (self.seq_step + 1) & 7;
        }
    }

    fn clock_length(&mut self) {
        const NRX4: [u8; 4] = [0x14, 0x19, 0x1E, 0x23];
        for ch in 0..4 {
            if self.reg(NRX4[ch]) & 0x40 == 0 || self.length[ch] == 0 { continue; }
            self.length[ch] -= 1;
            if self.length[ch] == 0 { self.active &= !(1 << ch); }
        }
    }
}

impl Snapshot for Apu {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u32(self.phase)?; w.u8(self.seq_step)?;
        w.bool(self.power)?; w.u8(self.active)?;
        for l in self.length { w.u16(l)?; }
        w.bytes(&self.regs)?;
        w.bytes(&self.wave_ram)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.phase = r.u32()?; self.seq_step = r.u8()? & 7;
        if self.phase >= FRAME_SEQ_CYCLES { return Err(invalid_data("frame sequencer phase")); }
        self.power = r.bool()?; self.active = r.u8()? & 0x0F;
        for l in self.length.iter_mut() { *l = r.u16()?; }
        r.fill(&mut self.regs)?;
        r.fill(&mut self.wave_ram)
    }
}

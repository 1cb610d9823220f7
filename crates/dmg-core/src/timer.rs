// ── Timer (DIV/TIMA/TMA/TAC) ────────────────────────────────────────────────

use crate::interrupts::{InterruptController, Interrupts};
use crate::snapshot::{invalid_data, Snapshot, StateReader, StateWriter};
use std::io;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    pub tima: u8, pub tma: u8, pub tac: u8,
    div_counter: u16, tima_counter: u32,
}

impl Timer {
    pub fn div(&self) -> u8 { (self.div_counter >> 8) as u8 }

    /// TIMA period in cycles for the current TAC clock select.
    pub fn period(&self) -> u32 { match self.tac & 0x03 { 0 => 1024, 1 => 16, 2 => 64, _ => 256 } }

    pub fn step(&mut self, cycles: u32, ic: &mut InterruptController) {
        self.div_counter = self.div_counter.wrapping_add(cycles as u16);
        if self.tac & 0x04 == 0 { return; }
        let period = self.period();
        self.tima_counter += cycles;
        while self.tima_counter >= period {
            self.tima_counter -= period;
            let (t, ov) = self.tima.overflowing_add(1);
            if ov { self.tima = self.tma; ic.raise(Interrupts::TIMER); } else { self.tima = t; }
        }
    }
    pub fn write(&mut self, r: u8, v: u8) {
        match r {
            0x04 => { self.div_counter = 0; self.tima_counter = 0; }
            0x05 => self.tima = v, 0x06 => self.tma = v,
            0x07 => { if (v ^ self.tac) & 0x03 != 0 { self.tima_counter = 0; } self.tac = v & 0x07; }
            _ => {}
        }
    }
    pub fn read(&self, r: u8) -> u8 {
        match r { 0x04 => self.div(), 0x05 => self.tima, 0x06 => self.tma, 0x07 => 0xF8 | self.tac, _ => 0xFF }
    }
}

impl Snapshot for Timer {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u16(self.div_counter)?; w.u32(self.tima_counter)?;
        w.u8(self.tima)?; w.u8(self.tma)?; w.u8(self.tac)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.div_counter = r.u16()?; self.tima_counter = r.u32()?;
        self.tima = r.u8()?; self.tma = r.u8()?; self.tac = r.u8()? & 0x07;
        if self.tima_counter >= self.period() { return Err(invalid_data("timer phase")); }
        Ok(())
    }
}

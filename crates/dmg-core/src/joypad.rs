// ── Joypad (P1) ─────────────────────────────────────────────────────────────

use crate::host::{Buttons, Host};
use crate::interrupts::{InterruptController, Interrupts};
use crate::snapshot::{Snapshot, StateReader, StateWriter};
use std::io;

/// Default button poll period (about 256 Hz).
pub const DEFAULT_POLL_CYCLES: u32 = 16384;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joypad {
    /// Bits 4-5 of P1; a 0 selects the group.
    select: u8,
    buttons: Buttons,
    phase: u32,
    period: u32,
}

impl Joypad {
    pub fn new(period: u32) -> Self { Joypad { select: 0x30, buttons: Buttons::empty(), phase: 0, period: period.max(1) } }

    pub fn buttons(&self) -> Buttons { self.buttons }

    fn lines(&self) -> u8 {
        let mut n = 0x0F;
        if self.select & 0x10 == 0 { n &= self.buttons.direction_nibble(); }
        if self.select & 0x20 == 0 { n &= self.buttons.action_nibble(); }
        n
    }

    pub fn read(&self) -> u8 { 0xC0 | self.select | self.lines() }
    pub fn write(&mut self, v: u8) { self.select = v & 0x30; }

    /// Latch a new button state. Returns true when a selected line went low,
    /// which requests JOYPAD.
    pub fn set_buttons(&mut self, b: Buttons, ic: &mut InterruptController) -> bool {
        let before = self.lines();
        self.buttons = b;
        let fell = before & !self.lines() != 0;
        if fell { ic.raise(Interrupts::JOYPAD); }
        fell
    }

    /// Advance the poll phase; consults the host once per period.
    pub fn step(&mut self, cycles: u32, host: &mut dyn Host, ic: &mut InterruptController) -> bool {
        self.phase += cycles;
        let mut pressed = false;
        while self.phase >= self.period {
            self.phase -= self.period;
            let b = host.poll_buttons();
            pressed |= self.set_buttons(b, ic);
        }
        pressed
    }
}

impl Snapshot for Joypad {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u32(self.phase)?; w.u8(self.select)?; w.u8(self.buttons.bits())
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.phase = r.u32()? % self.period;
        self.select = r.u8()? & 0x30;
        self.buttons = Buttons::from_bits_truncate(r.u8()?);
        Ok(())
    }
}

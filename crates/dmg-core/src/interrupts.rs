// ── Interrupt controller ────────────────────────────────────────────────────

use crate::snapshot::{Snapshot, StateReader, StateWriter};
use bitflags::bitflags;
use std::io;

bitflags! {
    /// IE/IF bit layout. Bit order is also service priority (bit 0 first).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Interrupts: u8 {
        const VBLANK = 0x01;
        const STAT   = 0x02;
        const TIMER  = 0x04;
        const SERIAL = 0x08;
        const JOYPAD = 0x10;
    }
}

/// Sources in priority order, paired with their service vectors.
pub const SOURCES: [(Interrupts, u16); 5] = [
    (Interrupts::VBLANK, 0x0040),
    (Interrupts::STAT,   0x0048),
    (Interrupts::TIMER,  0x0050),
    (Interrupts::SERIAL, 0x0058),
    (Interrupts::JOYPAD, 0x0060),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptController {
    pub enable: Interrupts,
    pub request: Interrupts,
    /// IE is a full 8-bit register; the upper bits are stored but never serviced.
    ie_upper: u8,
}

impl InterruptController {
    pub fn raise(&mut self, src: Interrupts) { self.request |= src; }
    pub fn clear(&mut self, src: Interrupts) { self.request.remove(src); }

    /// Enabled and requested sources.
    pub fn pending(&self) -> Interrupts { self.enable & self.request }

    pub fn read_if(&self) -> u8 { 0xE0 | self.request.bits() }
    pub fn write_if(&mut self, v: u8) { self.request = Interrupts::from_bits_truncate(v); }
    pub fn read_ie(&self) -> u8 { self.ie_upper | self.enable.bits() }
    pub fn write_ie(&mut self, v: u8) {
        self.enable = Interrupts::from_bits_truncate(v);
        self.ie_upper = v & 0xE0;
    }
}

impl Snapshot for InterruptController {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u8(self.read_ie())?;
        w.u8(self.request.bits())
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        let ie = r.u8()?; self.write_ie(ie);
        let rq = r.u8()?; self.write_if(rq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_views() {
        let mut ic = InterruptController::default();
        ic.write_if(0xFF);
        assert_eq!(ic.request, Interrupts::all());
        assert_eq!(ic.read_if(), 0xFF);
        ic.write_if(0x05);
        assert_eq!(ic.read_if(), 0xE5);
        ic.write_ie(0xE1);
        assert_eq!(ic.read_ie(), 0xE1);
        assert_eq!(ic.pending(), Interrupts::VBLANK);
    }

    #[test]
    fn vectors_follow_priority() {
        assert_eq!(SOURCES[0], (Interrupts::VBLANK, 0x40));
        assert_eq!(SOURCES[4], (Interrupts::JOYPAD, 0x60));
        for w in SOURCES.windows(2) { assert!(w[0].0.bits() < w[1].0.bits()); }
    }
}

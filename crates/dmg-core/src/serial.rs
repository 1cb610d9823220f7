// ── Serial link (SB/SC) ─────────────────────────────────────────────────────

use crate::host::Host;
use crate::interrupts::{InterruptController, Interrupts};
use crate::snapshot::{invalid_data, Snapshot, StateReader, StateWriter};
use std::io;

/// 8192 Hz shift clock.
pub const SERIAL_BIT_CYCLES: u32 = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Serial {
    pub sb: u8,
    pub sc: u8,
    phase: u32,
    bits: u8,
}

impl Serial {
    pub fn transferring(&self) -> bool { self.sc & 0x80 != 0 }
    pub fn internal_clock(&self) -> bool { self.sc & 0x01 != 0 }

    pub fn read(&self, r: u8) -> u8 {
        match r { 0x01 => self.sb, 0x02 => 0x7E | self.sc, _ => 0xFF }
    }
    pub fn write(&mut self, r: u8, v: u8) {
        match r {
            0x01 => self.sb = v,
            0x02 => { self.sc = v & 0x81; self.phase = 0; self.bits = 0; }
            _ => {}
        }
    }

    fn finish(&mut self, incoming: u8, ic: &mut InterruptController) {
        self.sb = incoming;
        self.sc &= 0x7F;
        self.phase = 0; self.bits = 0;
        ic.raise(Interrupts::SERIAL);
    }

    /// Shift the internal-clock transfer along; the byte is exchanged with the
    /// host once all eight bits have gone out.
    pub fn step(&mut self, cycles: u32, host: &mut dyn Host, ic: &mut InterruptController) {
        if !(self.transferring() && self.internal_clock()) { return; }
        self.phase += cycles;
        while self.phase >= SERIAL_BIT_CYCLES && self.transferring() {
            self.phase -= SERIAL_BIT_CYCLES;
            self.bits += 1;
            if self.bits == 8 {
                let incoming = host.serial_transfer(self.sb);
                self.finish(incoming, ic);
            }
        }
    }

    /// Peer-clocked byte arrival. Completes a pending external-clock transfer
    /// and returns the byte that was shifted out; `None` (nothing changed)
    /// when no such transfer is armed.
    pub fn receive(&mut self, byte: u8, ic: &mut InterruptController) -> Option<u8> {
        if !self.transferring() || self.internal_clock() { return None; }
        let out = self.sb;
        self.finish(byte, ic);
        Some(out)
    }
}

impl Snapshot for Serial {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u32(self.phase)?; w.u8(self.bits)?; w.u8(self.sb)?; w.u8(self.sc)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.phase = r.u32()?; self.bits = r.u8()? & 0x07; self.sb = r.u8()?; self.sc = r.u8()? & 0x81;
        if self.phase >= SERIAL_BIT_CYCLES { return Err(invalid_data("serial phase")); }
        Ok(())
    }
}

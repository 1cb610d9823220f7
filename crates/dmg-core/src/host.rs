//! Platform collaborators the engine calls out to.
//!
//! Every method has a no-op default so a host only implements what it wires up.

use bitflags::bitflags;

bitflags! {
    /// Pressed buttons, one bit each.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u8 {
        const RIGHT  = 0x01;
        const LEFT   = 0x02;
        const UP     = 0x04;
        const DOWN   = 0x08;
        const A      = 0x10;
        const B      = 0x20;
        const SELECT = 0x40;
        const START  = 0x80;
    }
}

impl Buttons {
    /// Direction group as the joypad register shows it (active low nibble).
    pub fn direction_nibble(self) -> u8 { !self.bits() & 0x0F }
    /// Action group (A, B, Select, Start) as an active-low nibble.
    pub fn action_nibble(self) -> u8 { !(self.bits() >> 4) & 0x0F }
}

pub trait Host {
    /// One pixel of a completed frame; `shade` is 0 (lightest) to 3.
    fn put_pixel(&mut self, _shade: u8, _x: usize, _y: usize) {}
    /// Called after the last pixel of a frame.
    fn frame_sync(&mut self) {}
    /// Exchange one byte over the link port; return what the peer sent.
    fn serial_transfer(&mut self, _out: u8) -> u8 { 0xFF }
    fn poll_buttons(&mut self) -> Buttons { Buttons::empty() }
    /// Checked before every instruction by `run`/`step`; false stops execution.
    fn poll_continue(&mut self) -> bool { true }
}

/// Host with nothing attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}

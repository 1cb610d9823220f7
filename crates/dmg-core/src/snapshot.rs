//! Fixed-order binary state encoding.
//!
//! Every component writes its fields through [`StateWriter`] and reads them back
//! through [`StateReader`] in exactly the same order. All multi-byte values are
//! little-endian. The order is a compatibility contract: append, never reorder.

use std::io::{self, Read, Write};

pub const STATE_MAGIC: [u8; 4] = *b"DMGS";
pub const STATE_VERSION: u8 = 1;

pub struct StateWriter<'a> { out: &'a mut dyn Write }

impl<'a> StateWriter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self { StateWriter { out } }
    pub fn u8(&mut self, v: u8) -> io::Result<()> { self.out.write_all(&[v]) }
    pub fn bool(&mut self, v: bool) -> io::Result<()> { self.u8(v as u8) }
    pub fn u16(&mut self, v: u16) -> io::Result<()> { self.out.write_all(&v.to_le_bytes()) }
    pub fn u32(&mut self, v: u32) -> io::Result<()> { self.out.write_all(&v.to_le_bytes()) }
    pub fn u64(&mut self, v: u64) -> io::Result<()> { self.out.write_all(&v.to_le_bytes()) }
    pub fn bytes(&mut self, v: &[u8]) -> io::Result<()> { self.out.write_all(v) }
}

pub struct StateReader<'a> { src: &'a mut dyn Read }

impl<'a> StateReader<'a> {
    pub fn new(src: &'a mut dyn Read) -> Self { StateReader { src } }
    pub fn u8(&mut self) -> io::Result<u8> { let mut b = [0u8; 1]; self.src.read_exact(&mut b)?; Ok(b[0]) }
    pub fn bool(&mut self) -> io::Result<bool> { Ok(self.u8()? != 0) }
    pub fn u16(&mut self) -> io::Result<u16> { let mut b = [0u8; 2]; self.src.read_exact(&mut b)?; Ok(u16::from_le_bytes(b)) }
    pub fn u32(&mut self) -> io::Result<u32> { let mut b = [0u8; 4]; self.src.read_exact(&mut b)?; Ok(u32::from_le_bytes(b)) }
    pub fn u64(&mut self) -> io::Result<u64> { let mut b = [0u8; 8]; self.src.read_exact(&mut b)?; Ok(u64::from_le_bytes(b)) }
    /// Fill `dst` completely from the stream.
    pub fn fill(&mut self, dst: &mut [u8]) -> io::Result<()> { self.src.read_exact(dst) }
}

/// Components that take part in the full-state snapshot.
pub trait Snapshot {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()>;
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()>;
}

pub(crate) fn invalid_data(msg: &str) -> io::Error { io::Error::new(io::ErrorKind::InvalidData, msg.to_string()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_layout() {
        let mut buf = Vec::new();
        {
            let mut w = StateWriter::new(&mut buf);
            w.u16(0x1234).unwrap();
            w.u32(0xA0B0C0D0).unwrap();
            w.bool(true).unwrap();
        }
        assert_eq!(buf, [0x34, 0x12, 0xD0, 0xC0, 0xB0, 0xA0, 0x01]);
        let mut src: &[u8] = &buf;
        let mut r = StateReader::new(&mut src);
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.u32().unwrap(), 0xA0B0C0D0);
        assert!(r.bool().unwrap());
        assert!(r.u8().is_err());
    }
}

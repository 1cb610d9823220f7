//! dmg-debug-abi — wire types for the DMG core's debug/register protocol
//!
//! A debugger host talks to a running core with one request/response pair per
//! transaction. The structs are `#[repr(C)]` so they can cross a shared-library
//! boundary unchanged; the JSON-lines helpers carry the same values over a
//! byte stream (socket, pipe) for out-of-process debuggers.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Address spaces ───────────────────────────────────────────────────────────

/// First address of register space. Anything below is a 16-bit bus address.
pub const REGISTER_SPACE: u32 = 0x1_0000;

/// Number of symbolic registers addressable through register space.
pub const REGISTER_COUNT: u32 = 19;

/// Register-space address of register index `idx`.
pub const fn register_address(idx: u32) -> u32 { REGISTER_SPACE + idx }

// ── Status codes ─────────────────────────────────────────────────────────────

/// Result of a run/step call or of a debug transaction.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success = 0,
    /// Execution stopped in front of a breakpoint; the instruction there has not run.
    Breakpoint = 1,
    /// Malformed or unsupported request. Nothing was mutated.
    Invalid = 2,
    Failure = 3,
}

impl Status {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0 => Some(Status::Success), 1 => Some(Status::Breakpoint),
            2 => Some(Status::Invalid), 3 => Some(Status::Failure),
            _ => None,
        }
    }
    pub fn is_ok(self) -> bool { matches!(self, Status::Success | Status::Breakpoint) }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Breakpoint => "breakpoint",
            Status::Invalid => "invalid",
            Status::Failure => "failure",
        };
        f.write_str(s)
    }
}

// ── Requests / responses ─────────────────────────────────────────────────────

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugKind {
    Nop = 0,
    /// Execute one macro-step; response data carries its cycle cost.
    Cycle = 1,
    Read = 2,
    Write = 3,
    /// Deliver one byte on the serial line (completes an external-clock transfer).
    SerialIn = 4,
}

impl DebugKind {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            0 => Some(DebugKind::Nop), 1 => Some(DebugKind::Cycle), 2 => Some(DebugKind::Read),
            3 => Some(DebugKind::Write), 4 => Some(DebugKind::SerialIn),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugRequest {
    pub kind: DebugKind,
    /// Caller-chosen tag echoed back in the response.
    pub id: u32,
    /// Bus address (< `REGISTER_SPACE`) or register-space address.
    pub address: u32,
    pub data: u32,
}

impl DebugRequest {
    pub fn nop(id: u32) -> Self { DebugRequest { kind: DebugKind::Nop, id, address: 0, data: 0 } }
    pub fn cycle(id: u32) -> Self { DebugRequest { kind: DebugKind::Cycle, id, address: 0, data: 0 } }
    pub fn read(id: u32, address: u32) -> Self { DebugRequest { kind: DebugKind::Read, id, address, data: 0 } }
    pub fn write(id: u32, address: u32, data: u32) -> Self { DebugRequest { kind: DebugKind::Write, id, address, data } }
    pub fn serial_in(id: u32, byte: u8) -> Self {
        DebugRequest { kind: DebugKind::SerialIn, id, address: 0, data: byte as u32 }
    }

    /// True when `address` points into register space.
    pub fn targets_registers(&self) -> bool { self.address >= REGISTER_SPACE }

    /// Register index addressed by this request, if it targets register space.
    pub fn register_index(&self) -> Option<u32> {
        self.address.checked_sub(REGISTER_SPACE)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugResponse {
    pub id: u32,
    pub status: Status,
    pub data: u32,
}

impl DebugResponse {
    pub fn ok(id: u32, data: u32) -> Self { DebugResponse { id, status: Status::Success, data } }
    pub fn invalid(id: u32) -> Self { DebugResponse { id, status: Status::Invalid, data: 0 } }
}

// ── JSON-lines transport ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct WireError(serde_json::Error);

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "debug wire: {}", self.0) }
}
impl std::error::Error for WireError {}

/// Encode a message as one line of JSON (trailing `\n` included).
pub fn encode<T: Serialize>(msg: &T) -> Result<String, WireError> {
    let mut line = serde_json::to_string(msg).map_err(WireError)?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line; surrounding whitespace is ignored.
pub fn decode<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, WireError> {
    serde_json::from_str(line.trim()).map_err(WireError)
}

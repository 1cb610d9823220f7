//! SM83 interpreter: fetch/decode/execute, flag arithmetic, interrupt service.

use crate::instructions::{Instr, Operand, BASE, EXTENDED, PREFIX_CB, is_illegal};
use crate::interrupts::{InterruptController, SOURCES};
use crate::registers::{Flags, ImeTransition, RegisterId, Registers};
use crate::snapshot::{invalid_data, Snapshot, StateReader, StateWriter};
use std::io;

/// Cost of one idle tick while halted or stopped.
pub const IDLE_CYCLES: u32 = 4;
/// Extra cost when a pending interrupt wakes a halted CPU.
pub const HALT_EXIT_CYCLES: u32 = 4;
/// Push + jump to the vector.
pub const INTERRUPT_CYCLES: u32 = 20;

/// What the processor needs from the outside world.
pub trait Memory {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    fn interrupts(&mut self) -> &mut InterruptController;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState { Running, Halted, Stopped }

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    pub ime_transition: ImeTransition,
    pub halted: bool,
    pub stopped: bool,
    /// Emit a `trace!` line per executed instruction.
    pub trace: bool,
}

impl Cpu {
    pub fn new() -> Self { Cpu::default() }

    pub fn post_boot() -> Self { Cpu { regs: Registers::post_boot(), ..Cpu::default() } }

    pub fn state(&self) -> CpuState {
        if self.stopped { CpuState::Stopped } else if self.halted { CpuState::Halted } else { CpuState::Running }
    }

    // ── Fetch helpers ───────────────────────────────────────────────────────
    fn fetch<M: Memory>(&mut self, mem: &M) -> u8 {
        let v = mem.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    fn push<M: Memory>(&mut self, mem: &mut M, v: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1); mem.write(self.regs.sp, (v >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1); mem.write(self.regs.sp, v as u8);
    }

    fn pop<M: Memory>(&mut self, mem: &M) -> u16 {
        let lo = mem.read(self.regs.sp) as u16; self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = mem.read(self.regs.sp) as u16; self.regs.sp = self.regs.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    // ── Step ────────────────────────────────────────────────────────────────

    /// Execute one instruction (or one idle tick) and return its cycle cost.
    pub fn step<M: Memory>(&mut self, mem: &mut M) -> u32 {
        if self.halted || self.stopped { return IDLE_CYCLES; }
        let pc = self.regs.pc;
        let op = self.fetch(mem);
        let instr: &'static Instr = if op == PREFIX_CB { &EXTENDED[self.fetch(mem) as usize] } else { &BASE[op as usize] };
        let operand: u16 = match instr.operand {
            Operand::None => 0,
            Operand::Byte => self.fetch(mem) as u16,
            Operand::Word => { let lo = self.fetch(mem) as u16; let hi = self.fetch(mem) as u16; (hi << 8) | lo }
        };
        let cycles = if instr.extended { self.execute_cb(mem, instr) } else { self.execute(mem, instr, operand) };
        self.retire_ime_transition();
        if self.trace {
            log::trace!("{:04X}: {}{:02X} op={:04X} cyc={} AF={:04X} BC={:04X} DE={:04X} HL={:04X} SP={:04X}",
                pc, if instr.extended { "CB " } else { "" }, instr.opcode, operand, cycles,
                self.regs.af(), self.regs.bc(), self.regs.de(), self.regs.hl(), self.regs.sp);
        }
        cycles as u32
    }

    fn retire_ime_transition(&mut self) {
        self.ime_transition = match self.ime_transition {
            ImeTransition::None => ImeTransition::None,
            ImeTransition::Pending => ImeTransition::Set,
            ImeTransition::Set => { self.ime = !self.ime; ImeTransition::None }
        };
    }

    /// EI/DI: arm a delayed toggle when the request differs from where the
    /// flag is already headed; cancel an armed toggle that would undo it.
    fn request_ime(&mut self, enable: bool) {
        let headed = self.ime ^ self.ime_transition.is_armed();
        if headed == enable { return; }
        self.ime_transition = if self.ime_transition.is_armed() { ImeTransition::None } else { ImeTransition::Pending };
    }

    // ── Interrupt service ───────────────────────────────────────────────────

    /// Service at most one interrupt source, highest priority first. Waking
    /// from HALT and dispatching through IME are independent effects.
    pub fn service_interrupts<M: Memory>(&mut self, mem: &mut M) -> u32 {
        let mut cost = 0;
        for &(src, vector) in SOURCES.iter() {
            {
                let ic = mem.interrupts();
                if !(ic.enable.contains(src) && ic.request.contains(src)) { continue; }
                ic.clear(src);
            }
            if self.halted { self.halted = false; cost += HALT_EXIT_CYCLES; }
            if self.ime {
                self.ime = false;
                let pc = self.regs.pc;
                self.push(mem, pc);
                self.regs.pc = vector;
                cost += INTERRUPT_CYCLES;
            }
            break;
        }
        cost
    }

    // ── Operand registers ───────────────────────────────────────────────────
    // r8 index: 0=B 1=C 2=D 3=E 4=H 5=L 6=(HL) 7=A
    fn r8<M: Memory>(&self, mem: &M, idx: u8) -> u8 {
        match idx & 7 {
            0 => self.regs.b, 1 => self.regs.c, 2 => self.regs.d, 3 => self.regs.e,
            4 => self.regs.h, 5 => self.regs.l, 6 => mem.read(self.regs.hl()), _ => self.regs.a,
        }
    }
    fn set_r8<M: Memory>(&mut self, mem: &mut M, idx: u8, v: u8) {
        match idx & 7 {
            0 => self.regs.b = v, 1 => self.regs.c = v, 2 => self.regs.d = v, 3 => self.regs.e = v,
            4 => self.regs.h = v, 5 => self.regs.l = v, 6 => mem.write(self.regs.hl(), v), _ => self.regs.a = v,
        }
    }
    // rr index (SP form): 0=BC 1=DE 2=HL 3=SP
    fn rr(&self, idx: u8) -> u16 {
        match idx & 3 { 0 => self.regs.bc(), 1 => self.regs.de(), 2 => self.regs.hl(), _ => self.regs.sp }
    }
    fn set_rr(&mut self, idx: u8, v: u16) {
        match idx & 3 { 0 => self.regs.set_bc(v), 1 => self.regs.set_de(v), 2 => self.regs.set_hl(v), _ => self.regs.sp = v }
    }
    // rr index (stack form): 0=BC 1=DE 2=HL 3=AF
    fn stack_rr(&self, idx: u8) -> u16 { if idx & 3 == 3 { self.regs.af() } else { self.rr(idx) } }
    fn set_stack_rr(&mut self, idx: u8, v: u16) { if idx & 3 == 3 { self.regs.set_af(v) } else { self.set_rr(idx, v) } }

    fn condition(&self, cc: u8) -> bool {
        match cc & 3 { 0 => !self.regs.flag_z(), 1 => self.regs.flag_z(), 2 => !self.regs.flag_c(), _ => self.regs.flag_c() }
    }

    // ── ALU ─────────────────────────────────────────────────────────────────
    fn add8(&mut self, v: u8, carry_in: bool) {
        let a = self.regs.a; let c = carry_in as u8;
        let r = a.wrapping_add(v).wrapping_add(c);
        self.regs.set_flags(r == 0, false, (a & 0x0F) + (v & 0x0F) + c > 0x0F, (a as u16 + v as u16 + c as u16) > 0xFF);
        self.regs.a = r;
    }
    fn sub8(&mut self, v: u8, carry_in: bool, store: bool) {
        let a = self.regs.a; let c = carry_in as u8;
        let r = a.wrapping_sub(v).wrapping_sub(c);
        self.regs.set_flags(r == 0, true, (a & 0x0F) < (v & 0x0F) + c, (a as u16) < v as u16 + c as u16);
        if store { self.regs.a = r; }
    }
    fn alu(&mut self, kind: u8, v: u8) {
        match kind & 7 {
            0 => self.add8(v, false),
            1 => { let c = self.regs.flag_c(); self.add8(v, c) }
            2 => self.sub8(v, false, true),
            3 => { let c = self.regs.flag_c(); self.sub8(v, c, true) }
            4 => { self.regs.a &= v; let z = self.regs.a == 0; self.regs.set_flags(z, false, true, false) }
            5 => { self.regs.a ^= v; let z = self.regs.a == 0; self.regs.set_flags(z, false, false, false) }
            6 => { self.regs.a |= v; let z = self.regs.a == 0; self.regs.set_flags(z, false, false, false) }
            _ => self.sub8(v, false, false),
        }
    }
    fn inc8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.regs.set_flag_z(r == 0); self.regs.set_flag_n(false); self.regs.set_flag_h(v & 0x0F == 0x0F);
        r
    }
    fn dec8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.regs.set_flag_z(r == 0); self.regs.set_flag_n(true); self.regs.set_flag_h(v & 0x0F == 0x00);
        r
    }
    fn add_hl(&mut self, v: u16) {
        let hl = self.regs.hl();
        self.regs.set_flag_n(false);
        self.regs.set_flag_h((hl & 0x0FFF) + (v & 0x0FFF) > 0x0FFF);
        self.regs.set_flag_c((hl as u32 + v as u32) > 0xFFFF);
        self.regs.set_hl(hl.wrapping_add(v));
    }
    /// SP + signed offset; flags come from the unsigned low-byte addition.
    fn sp_offset(&mut self, e: u8) -> u16 {
        let sp = self.regs.sp; let off = e as i8 as i16 as u16;
        let h = (sp & 0x0F) + (e as u16 & 0x0F) > 0x0F;
        let c = (sp & 0xFF) + (e as u16) > 0xFF;
        self.regs.set_flags(false, false, h, c);
        sp.wrapping_add(off)
    }
    fn daa(&mut self) {
        let mut a = self.regs.a; let mut carry = self.regs.flag_c();
        if !self.regs.flag_n() {
            if carry || a > 0x99 { a = a.wrapping_add(0x60); carry = true; }
            if self.regs.flag_h() || (a & 0x0F) > 0x09 { a = a.wrapping_add(0x06); }
        } else {
            if carry { a = a.wrapping_sub(0x60); }
            if self.regs.flag_h() { a = a.wrapping_sub(0x06); }
        }
        self.regs.a = a;
        self.regs.set_flag_z(a == 0); self.regs.set_flag_h(false); self.regs.set_flag_c(carry);
    }

    /// Rotate/shift group shared by the extended table. kind: 0=RLC 1=RRC
    /// 2=RL 3=RR 4=SLA 5=SRA 6=SWAP 7=SRL. Returns (result, carry out).
    fn shift(&self, kind: u8, v: u8) -> (u8, bool) {
        let cin = self.regs.flag_c() as u8;
        match kind & 7 {
            0 => (v.rotate_left(1), v & 0x80 != 0),
            1 => (v.rotate_right(1), v & 0x01 != 0),
            2 => ((v << 1) | cin, v & 0x80 != 0),
            3 => ((v >> 1) | (cin << 7), v & 0x01 != 0),
            4 => (v << 1, v & 0x80 != 0),
            5 => ((v >> 1) | (v & 0x80), v & 0x01 != 0),
            6 => (v.rotate_left(4), false),
            _ => (v >> 1, v & 0x01 != 0),
        }
    }

    // ── Base table ──────────────────────────────────────────────────────────
    fn execute<M: Memory>(&mut self, mem: &mut M, instr: &Instr, operand: u16) -> u8 {
        let op = instr.opcode;
        let n = operand as u8;
        let mut taken = false;
        match op {
            0x00 => {}

            // ── 16-bit loads / arithmetic ────────────────────────────────────
            0x01 | 0x11 | 0x21 | 0x31 => self.set_rr(op >> 4, operand),
            0x03 | 0x13 | 0x23 | 0x33 => { let v = self.rr(op >> 4).wrapping_add(1); self.set_rr(op >> 4, v) }
            0x0B | 0x1B | 0x2B | 0x3B => { let v = self.rr(op >> 4).wrapping_sub(1); self.set_rr(op >> 4, v) }
            0x09 | 0x19 | 0x29 | 0x39 => { let v = self.rr(op >> 4); self.add_hl(v) }
            0x08 => { mem.write(operand, self.regs.sp as u8); mem.write(operand.wrapping_add(1), (self.regs.sp >> 8) as u8); }
            0xE8 => self.regs.sp = self.sp_offset(n),
            0xF8 => { let v = self.sp_offset(n); self.regs.set_hl(v) }
            0xF9 => self.regs.sp = self.regs.hl(),

            // ── Indirect accumulator loads ───────────────────────────────────
            0x02 => mem.write(self.regs.bc(), self.regs.a),
            0x12 => mem.write(self.regs.de(), self.regs.a),
            0x22 => { let hl = self.regs.hl(); mem.write(hl, self.regs.a); self.regs.set_hl(hl.wrapping_add(1)) }
            0x32 => { let hl = self.regs.hl(); mem.write(hl, self.regs.a); self.regs.set_hl(hl.wrapping_sub(1)) }
            0x0A => self.regs.a = mem.read(self.regs.bc()),
            0x1A => self.regs.a = mem.read(self.regs.de()),
            0x2A => { let hl = self.regs.hl(); self.regs.a = mem.read(hl); self.regs.set_hl(hl.wrapping_add(1)) }
            0x3A => { let hl = self.regs.hl(); self.regs.a = mem.read(hl); self.regs.set_hl(hl.wrapping_sub(1)) }
            0xE0 => mem.write(0xFF00 | n as u16, self.regs.a),
            0xF0 => self.regs.a = mem.read(0xFF00 | n as u16),
            0xE2 => mem.write(0xFF00 | self.regs.c as u16, self.regs.a),
            0xF2 => self.regs.a = mem.read(0xFF00 | self.regs.c as u16),
            0xEA => mem.write(operand, self.regs.a),
            0xFA => self.regs.a = mem.read(operand),

            // ── 8-bit inc/dec/immediate load ─────────────────────────────────
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = op >> 3; let v = self.r8(mem, r); let v = self.inc8(v); self.set_r8(mem, r, v)
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = op >> 3; let v = self.r8(mem, r); let v = self.dec8(v); self.set_r8(mem, r, v)
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => self.set_r8(mem, op >> 3, n),

            // ── Accumulator rotates (Z forced clear) ─────────────────────────
            0x07 | 0x0F | 0x17 | 0x1F => {
                let (r, c) = self.shift(op >> 3, self.regs.a);
                self.regs.a = r;
                self.regs.set_flags(false, false, false, c);
            }

            // ── Misc accumulator / flag ops ──────────────────────────────────
            0x27 => self.daa(),
            0x2F => { self.regs.a = !self.regs.a; self.regs.set_flag_n(true); self.regs.set_flag_h(true) }
            0x37 => { self.regs.set_flag_n(false); self.regs.set_flag_h(false); self.regs.set_flag_c(true) }
            0x3F => { let c = self.regs.flag_c(); self.regs.set_flag_n(false); self.regs.set_flag_h(false); self.regs.set_flag_c(!c) }

            // ── Low-power states ─────────────────────────────────────────────
            0x10 => self.stopped = true,
            0x76 => self.halted = true,

            // ── LD r, r' ─────────────────────────────────────────────────────
            0x40..=0x75 | 0x77..=0x7F => { let v = self.r8(mem, op); self.set_r8(mem, op >> 3, v) }

            // ── ALU A, r / A, n ──────────────────────────────────────────────
            0x80..=0xBF => { let v = self.r8(mem, op); self.alu(op >> 3, v) }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => self.alu(op >> 3, n),

            // ── Jumps ────────────────────────────────────────────────────────
            0x18 => { self.regs.pc = self.regs.pc.wrapping_add(n as i8 as u16); taken = true }
            0x20 | 0x28 | 0x30 | 0x38 => {
                if self.condition(op >> 3) { self.regs.pc = self.regs.pc.wrapping_add(n as i8 as u16); taken = true }
            }
            0xC3 => { self.regs.pc = operand; taken = true }
            0xC2 | 0xCA | 0xD2 | 0xDA => { if self.condition(op >> 3) { self.regs.pc = operand; taken = true } }
            0xE9 => { self.regs.pc = self.regs.hl(); taken = true }

            // ── Calls / returns / restarts ───────────────────────────────────
            0xCD => { let pc = self.regs.pc; self.push(mem, pc); self.regs.pc = operand; taken = true }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                if self.condition(op >> 3) { let pc = self.regs.pc; self.push(mem, pc); self.regs.pc = operand; taken = true }
            }
            0xC9 => { self.regs.pc = self.pop(mem); taken = true }
            0xD9 => { self.regs.pc = self.pop(mem); self.ime = true; taken = true }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => { if self.condition(op >> 3) { self.regs.pc = self.pop(mem); taken = true } }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let pc = self.regs.pc; self.push(mem, pc); self.regs.pc = (op & 0x38) as u16; taken = true
            }

            // ── Stack ────────────────────────────────────────────────────────
            0xC1 | 0xD1 | 0xE1 | 0xF1 => { let v = self.pop(mem); self.set_stack_rr(op >> 4, v) }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => { let v = self.stack_rr(op >> 4); self.push(mem, v) }

            // ── Interrupt master enable ──────────────────────────────────────
            0xF3 => self.request_ime(false),
            0xFB => self.request_ime(true),

            // Prefix byte is consumed by step(); never dispatched here.
            0xCB => {}

            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                debug_assert!(is_illegal(op));
                log::warn!("illegal opcode {:02X} at {:04X}", op, self.regs.pc.wrapping_sub(1));
            }
        }
        if taken { instr.taken } else { instr.cycles }
    }

    // ── Extended (0xCB) table ───────────────────────────────────────────────
    fn execute_cb<M: Memory>(&mut self, mem: &mut M, instr: &Instr) -> u8 {
        let op = instr.opcode;
        let r = op & 7;
        let bit = (op >> 3) & 7;
        let v = self.r8(mem, r);
        match op >> 6 {
            0 => {
                let (res, c) = self.shift(bit, v);
                self.regs.set_flags(res == 0, false, false, c);
                self.set_r8(mem, r, res);
            }
            1 => { self.regs.set_flag_z(v & (1 << bit) == 0); self.regs.set_flag_n(false); self.regs.set_flag_h(true) }
            2 => self.set_r8(mem, r, v & !(1 << bit)),
            _ => self.set_r8(mem, r, v | (1 << bit)),
        }
        instr.cycles
    }

    // ── Register introspection ──────────────────────────────────────────────

    /// Value of a processor-owned register. IE/IF live in the interrupt
    /// controller and yield `None` here.
    pub fn register(&self, id: RegisterId) -> Option<u32> {
        let r = &self.regs;
        Some(match id {
            RegisterId::A => r.a as u32, RegisterId::F => r.f.raw() as u32,
            RegisterId::B => r.b as u32, RegisterId::C => r.c as u32,
            RegisterId::D => r.d as u32, RegisterId::E => r.e as u32,
            RegisterId::H => r.h as u32, RegisterId::L => r.l as u32,
            RegisterId::AF => r.af() as u32, RegisterId::BC => r.bc() as u32,
            RegisterId::DE => r.de() as u32, RegisterId::HL => r.hl() as u32,
            RegisterId::PC => r.pc as u32, RegisterId::SP => r.sp as u32,
            RegisterId::IME => self.ime as u32,
            RegisterId::HALT => self.halted as u32, RegisterId::STOP => self.stopped as u32,
            RegisterId::IE | RegisterId::IF => return None,
        })
    }

    /// Store into a processor-owned register. Returns false (and changes
    /// nothing) for IE/IF or a value wider than the register.
    pub fn set_register(&mut self, id: RegisterId, v: u32) -> bool {
        if v > id.max_value() { return false; }
        let r = &mut self.regs;
        match id {
            RegisterId::A => r.a = v as u8, RegisterId::F => r.f = Flags::from_raw(v as u8),
            RegisterId::B => r.b = v as u8, RegisterId::C => r.c = v as u8,
            RegisterId::D => r.d = v as u8, RegisterId::E => r.e = v as u8,
            RegisterId::H => r.h = v as u8, RegisterId::L => r.l = v as u8,
            RegisterId::AF => r.set_af(v as u16), RegisterId::BC => r.set_bc(v as u16),
            RegisterId::DE => r.set_de(v as u16), RegisterId::HL => r.set_hl(v as u16),
            RegisterId::PC => r.pc = v as u16, RegisterId::SP => r.sp = v as u16,
            RegisterId::IME => self.ime = v != 0,
            RegisterId::HALT => self.halted = v != 0, RegisterId::STOP => self.stopped = v != 0,
            RegisterId::IE | RegisterId::IF => return false,
        }
        true
    }
}

impl Snapshot for Cpu {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u16(self.regs.af())?; w.u16(self.regs.bc())?; w.u16(self.regs.de())?; w.u16(self.regs.hl())?;
        w.u16(self.regs.pc)?; w.u16(self.regs.sp)?;
        w.bool(self.ime)?; w.u8(self.ime_transition.raw())?;
        w.bool(self.halted)?; w.bool(self.stopped)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.regs.set_af(r.u16()?); self.regs.set_bc(r.u16()?); self.regs.set_de(r.u16()?); self.regs.set_hl(r.u16()?);
        self.regs.pc = r.u16()?; self.regs.sp = r.u16()?;
        self.ime = r.bool()?;
        self.ime_transition = ImeTransition::from_raw(r.u8()?).ok_or_else(|| invalid_data("ime transition"))?;
        self.halted = r.bool()?; self.stopped = r.bool()?;
        Ok(())
    }
}

// ── Engine: lifecycle, scheduler, debug surface, persistence ────────────────

use crate::bus::Bus;
use crate::cartridge::{Cartridge, Header};
use crate::config::EngineConfig;
use crate::cpu::Cpu;
use crate::host::{Host, NullHost};
use crate::registers::RegisterId;
use crate::snapshot::{Snapshot, StateReader, StateWriter, STATE_MAGIC, STATE_VERSION};
use crate::{Clock, CoreError, BOOT_ROM_SIZE, LCD_HEIGHT, LCD_WIDTH};
use dmg_debug_abi::{DebugKind, DebugRequest, DebugResponse, Status};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Where persistent data lives on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavePaths {
    /// Battery RAM image; read on load when present, written on unload.
    pub battery: Option<PathBuf>,
}

/// Everything that exists only while a cartridge is inserted.
struct Machine {
    cpu: Cpu,
    bus: Bus,
    clock: Clock,
    saves: SavePaths,
}

impl Machine {
    fn build(image: Vec<u8>, boot: Option<Vec<u8>>, cfg: &EngineConfig) -> Result<Self, CoreError> {
        if let Some(b) = &boot {
            if b.len() != BOOT_ROM_SIZE { return Err(CoreError::BootRomSize(b.len())); }
        }
        let cart = Cartridge::from_bytes(image)?;
        let mut cpu = if boot.is_some() { Cpu::new() } else { Cpu::post_boot() };
        cpu.trace = cfg.trace_instructions;
        let bus = Bus::new(cart, boot, cfg);
        Ok(Machine { cpu, bus, clock: Clock::default(), saves: SavePaths::default() })
    }

    /// One scheduler step: interrupt service, one instruction (or idle tick),
    /// then the cost fanned out to every peripheral.
    fn step(&mut self, host: &mut dyn Host) -> u32 {
        let mut cycles = self.cpu.service_interrupts(&mut self.bus);
        cycles += self.cpu.step(&mut self.bus);
        self.clock.tick(cycles);
        let adv = self.bus.advance(cycles, host);
        if adv.button_pressed && self.cpu.stopped { self.cpu.stopped = false; }
        if adv.frame_complete { self.flush_frame(host); }
        cycles
    }

    fn flush_frame(&self, host: &mut dyn Host) {
        let fb = &self.bus.ppu.framebuffer;
        for y in 0..LCD_HEIGHT {
            for x in 0..LCD_WIDTH { host.put_pixel(fb[y * LCD_WIDTH + x], x, y); }
        }
        host.frame_sync();
    }

    fn save(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.bytes(&STATE_MAGIC)?;
        w.u8(STATE_VERSION)?;
        w.u64(self.clock.t_cycles)?;
        self.bus.save_peripherals(w)?;
        self.cpu.save_state(w)?;
        self.bus.save_system(w)
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.clock.t_cycles = r.u64()?;
        self.bus.load_peripherals(r)?;
        self.cpu.load_state(r)?;
        self.bus.load_system(r)
    }

    fn register(&self, id: RegisterId) -> u32 {
        match id {
            RegisterId::IE => self.bus.ic.read_ie() as u32,
            RegisterId::IF => self.bus.ic.read_if() as u32,
            _ => self.cpu.register(id).unwrap_or(0),
        }
    }

    fn set_register(&mut self, id: RegisterId, v: u32) -> bool {
        match id {
            RegisterId::IE | RegisterId::IF if v > 0xFF => false,
            RegisterId::IE => { self.bus.ic.write_ie(v as u8); true }
            RegisterId::IF => { self.bus.ic.write_if(v as u8); true }
            _ => self.cpu.set_register(id, v),
        }
    }

    fn flush_battery(&self) -> Result<(), CoreError> {
        let cart = &self.bus.cart;
        let Some(path) = &self.saves.battery else { return Ok(()) };
        if !cart.header.battery || cart.ram.is_empty() { return Ok(()); }
        std::fs::write(path, &cart.ram)?;
        log::info!("battery RAM written to {}", path.display());
        Ok(())
    }
}

#[derive(Serialize)]
struct StateView<'a> {
    title: &'a str,
    mapper: String,
    pc: u16, sp: u16, af: u16, bc: u16, de: u16, hl: u16,
    ime: bool, halted: bool, stopped: bool,
    ie: u8,
    #[serde(rename = "if")]
    if_: u8,
    mode: u8, ly: u8,
    frame: u64, t_cycles: u64,
    rom_bank: usize, ram_bank: usize,
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// One independent console. Holds no global state; any number can coexist.
pub struct Engine {
    config: EngineConfig,
    machine: Option<Machine>,
    host: Box<dyn Host>,
}

impl Default for Engine {
    fn default() -> Self { Engine::new(EngineConfig::default()) }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self { Engine { config, machine: None, host: Box::new(NullHost) } }

    pub fn with_host(config: EngineConfig, host: Box<dyn Host>) -> Self { Engine { config, machine: None, host } }

    pub fn set_host(&mut self, host: Box<dyn Host>) { self.host = host; }
    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn is_loaded(&self) -> bool { self.machine.is_some() }

    pub fn header(&self) -> Option<&Header> { self.machine.as_ref().map(|m| &m.bus.cart.header) }
    pub fn cpu(&self) -> Option<&Cpu> { self.machine.as_ref().map(|m| &m.cpu) }
    pub fn bus(&self) -> Option<&Bus> { self.machine.as_ref().map(|m| &m.bus) }
    pub fn clock(&self) -> Option<&Clock> { self.machine.as_ref().map(|m| &m.clock) }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Validate and insert a cartridge. Nothing is touched unless every check
    /// passes, including reading an existing battery file.
    pub fn load(&mut self, image: Vec<u8>, boot: Option<Vec<u8>>, saves: SavePaths) -> Result<(), CoreError> {
        let mut m = Machine::build(image, boot, &self.config)?;
        if let Some(path) = &saves.battery {
            if m.bus.cart.header.battery && path.exists() {
                let data = std::fs::read(path)?;
                let expected = m.bus.cart.ram.len();
                if data.len() != expected { return Err(CoreError::LengthMismatch { expected, actual: data.len() }); }
                m.bus.cart.ram.copy_from_slice(&data);
                log::info!("battery RAM read from {}", path.display());
            }
        }
        m.saves = saves;
        if let Some(old) = self.machine.take() {
            if let Err(e) = old.flush_battery() { log::warn!("previous cartridge battery not saved: {e}"); }
        }
        self.machine = Some(m);
        Ok(())
    }

    /// Remove the cartridge, writing battery RAM back first.
    pub fn unload(&mut self) -> Result<(), CoreError> {
        let m = self.machine.take().ok_or(CoreError::NotLoaded)?;
        log::info!("unloading '{}' after {} cycles", m.bus.cart.header.title, m.clock.t_cycles);
        m.flush_battery()
    }

    // ── Memory ──────────────────────────────────────────────────────────────

    pub fn read(&self, addr: u16) -> u8 { self.machine.as_ref().map_or(0xFF, |m| m.bus.read(addr)) }

    pub fn write(&mut self, addr: u16, v: u8) {
        if let Some(m) = self.machine.as_mut() { m.bus.write(addr, v); }
    }

    // ── Execution ───────────────────────────────────────────────────────────

    /// One macro-step; returns its cycle cost.
    pub fn step_once(&mut self) -> Result<u32, CoreError> {
        let m = self.machine.as_mut().ok_or(CoreError::NotLoaded)?;
        Ok(m.step(self.host.as_mut()))
    }

    /// Run until the host stops polling true or PC hits a breakpoint.
    pub fn run(&mut self, breakpoints: &[u16]) -> Status {
        let Some(m) = self.machine.as_mut() else { return Status::Failure };
        loop {
            if !self.host.poll_continue() { return Status::Success; }
            if breakpoints.contains(&m.cpu.regs.pc) { return Status::Breakpoint; }
            m.step(self.host.as_mut());
        }
    }

    /// Execute up to `count` instructions with the same stop conditions as [`run`](Self::run).
    pub fn step(&mut self, count: u32, breakpoints: &[u16]) -> Status {
        let Some(m) = self.machine.as_mut() else { return Status::Failure };
        for _ in 0..count {
            if !self.host.poll_continue() { return Status::Success; }
            if breakpoints.contains(&m.cpu.regs.pc) { return Status::Breakpoint; }
            m.step(self.host.as_mut());
        }
        Status::Success
    }

    // ── Registers / debug protocol ──────────────────────────────────────────

    pub fn register(&self, id: RegisterId) -> Option<u32> { self.machine.as_ref().map(|m| m.register(id)) }

    pub fn set_register(&mut self, id: RegisterId, v: u32) -> bool {
        self.machine.as_mut().is_some_and(|m| m.set_register(id, v))
    }

    pub fn debug(&mut self, req: DebugRequest) -> DebugResponse {
        let id = req.id;
        let Some(m) = self.machine.as_mut() else { return DebugResponse::invalid(id) };
        match req.kind {
            DebugKind::Nop => DebugResponse::ok(id, 0),
            DebugKind::Cycle => DebugResponse::ok(id, m.step(self.host.as_mut())),
            DebugKind::Read if req.targets_registers() => {
                match req.register_index().and_then(RegisterId::from_index) {
                    Some(r) => DebugResponse::ok(id, m.register(r)),
                    None => DebugResponse::invalid(id),
                }
            }
            DebugKind::Read => DebugResponse::ok(id, m.bus.read(req.address as u16) as u32),
            DebugKind::Write if req.targets_registers() => {
                match req.register_index().and_then(RegisterId::from_index) {
                    Some(r) if m.set_register(r, req.data) => DebugResponse::ok(id, req.data),
                    _ => DebugResponse::invalid(id),
                }
            }
            DebugKind::Write if req.data > 0xFF => DebugResponse::invalid(id),
            DebugKind::Write => { m.bus.write(req.address as u16, req.data as u8); DebugResponse::ok(id, req.data) }
            DebugKind::SerialIn if req.data > 0xFF => DebugResponse::invalid(id),
            DebugKind::SerialIn => match m.bus.serial.receive(req.data as u8, &mut m.bus.ic) {
                Some(out) => DebugResponse::ok(id, out as u32),
                None => DebugResponse::invalid(id),
            },
        }
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    pub fn export_battery(&self, w: &mut dyn Write) -> Result<(), CoreError> {
        let m = self.machine.as_ref().ok_or(CoreError::NotLoaded)?;
        w.write_all(&m.bus.cart.ram)?;
        Ok(())
    }

    /// Replace cartridge RAM. The input must hold exactly the RAM size;
    /// on any failure the current contents are kept.
    pub fn import_battery(&mut self, r: &mut dyn Read) -> Result<(), CoreError> {
        let m = self.machine.as_mut().ok_or(CoreError::NotLoaded)?;
        let mut data = Vec::with_capacity(m.bus.cart.ram.len());
        r.read_to_end(&mut data)?;
        let expected = m.bus.cart.ram.len();
        if data.len() != expected { return Err(CoreError::LengthMismatch { expected, actual: data.len() }); }
        m.bus.cart.ram.copy_from_slice(&data);
        Ok(())
    }

    pub fn export_state(&self, w: &mut dyn Write) -> Result<(), CoreError> {
        let m = self.machine.as_ref().ok_or(CoreError::NotLoaded)?;
        m.save(&mut StateWriter::new(w))?;
        Ok(())
    }

    /// Restore a snapshot taken with the same cartridge. The snapshot is
    /// decoded into a scratch machine first, so a bad stream changes nothing.
    pub fn import_state(&mut self, r: &mut dyn Read) -> Result<(), CoreError> {
        let m = self.machine.as_mut().ok_or(CoreError::NotLoaded)?;
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        if data.len() < STATE_MAGIC.len() + 1 || data[..STATE_MAGIC.len()] != STATE_MAGIC {
            return Err(CoreError::BadSnapshot("missing state header".into()));
        }
        let version = data[STATE_MAGIC.len()];
        if version != STATE_VERSION { return Err(CoreError::BadSnapshot(format!("unsupported version {version}"))); }

        let boot = m.bus.boot_rom().map(<[u8]>::to_vec);
        let mut scratch = Machine::build(m.bus.cart.rom.clone(), boot, &self.config)?;
        let mut body: &[u8] = &data[STATE_MAGIC.len() + 1..];
        scratch.load(&mut StateReader::new(&mut body)).map_err(|e| CoreError::BadSnapshot(e.to_string()))?;
        if !body.is_empty() { return Err(CoreError::BadSnapshot(format!("{} trailing bytes", body.len()))); }

        m.cpu = scratch.cpu;
        m.bus = scratch.bus;
        m.clock = scratch.clock;
        Ok(())
    }

    // ── Diagnostics ─────────────────────────────────────────────────────────

    pub fn state_summary(&self) -> String {
        let Some(m) = &self.machine else { return "no cartridge".to_string() };
        let r = &m.cpu.regs;
        format!(
            "PC={:#06x} SP={:#06x} AF={:#06x} BC={:#06x} DE={:#06x} HL={:#06x} IME={} {:?} | Frame={} LY={} Mode={:?} | T={}",
            r.pc, r.sp, r.af(), r.bc(), r.de(), r.hl(), m.cpu.ime as u8, m.cpu.state(),
            m.clock.frame_count(), m.bus.ppu.line, m.bus.ppu.mode, m.clock.t_cycles,
        )
    }

    pub fn state_json(&self) -> String {
        let Some(m) = &self.machine else { return "null".to_string() };
        let r = &m.cpu.regs;
        let view = StateView {
            title: &m.bus.cart.header.title,
            mapper: format!("{:?}", m.bus.cart.header.kind),
            pc: r.pc, sp: r.sp, af: r.af(), bc: r.bc(), de: r.de(), hl: r.hl(),
            ime: m.cpu.ime, halted: m.cpu.halted, stopped: m.cpu.stopped,
            ie: m.bus.ic.read_ie(), if_: m.bus.ic.read_if(),
            mode: m.bus.ppu.mode as u8, ly: m.bus.ppu.line,
            frame: m.clock.frame_count(), t_cycles: m.clock.t_cycles,
            rom_bank: m.bus.cart.mapper.rom_bank(), ram_bank: m.bus.cart.mapper.ram_bank(),
        };
        serde_json::to_string(&view).unwrap_or_else(|_| "null".to_string())
    }

    /// Framebuffer as text, two screen rows per line.
    pub fn frame_to_ascii(&self) -> String {
        let Some(m) = &self.machine else { return String::new() };
        let palette = ['.', '+', '#', '@'];
        let fb = &m.bus.ppu.framebuffer;
        let mut out = String::with_capacity((LCD_WIDTH + 1) * (LCD_HEIGHT / 2));
        for y in (0..LCD_HEIGHT).step_by(2) {
            for x in 0..LCD_WIDTH { out.push(palette[fb[y * LCD_WIDTH + x].min(3) as usize]); }
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

//! Engine lifecycle, scheduling, debug protocol and persistence.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{rom, rom_with, TITLE};
    use dmg_core::{
        Buttons, CoreError, DebugRequest, Engine, EngineConfig, Host, Interrupts, RegisterId, SavePaths, Status,
        LCD_HEIGHT, LCD_WIDTH, REGISTER_SPACE,
    };
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Default)]
    struct Seen { pixels: usize, frames: usize, serial: Vec<u8>, polls: usize }

    /// Records what the engine hands out; stops `run` after `budget` polls.
    struct Recorder { seen: Rc<RefCell<Seen>>, budget: usize, buttons: Buttons }

    impl Recorder {
        fn new(budget: usize) -> (Self, Rc<RefCell<Seen>>) {
            let seen = Rc::new(RefCell::new(Seen::default()));
            (Recorder { seen: seen.clone(), budget, buttons: Buttons::empty() }, seen)
        }
    }

    impl Host for Recorder {
        fn put_pixel(&mut self, _shade: u8, _x: usize, _y: usize) { self.seen.borrow_mut().pixels += 1; }
        fn frame_sync(&mut self) { self.seen.borrow_mut().frames += 1; }
        fn serial_transfer(&mut self, out: u8) -> u8 { self.seen.borrow_mut().serial.push(out); 0xFF }
        fn poll_buttons(&mut self) -> Buttons { self.buttons }
        fn poll_continue(&mut self) -> bool {
            let mut s = self.seen.borrow_mut();
            s.polls += 1;
            s.polls <= self.budget
        }
    }

    fn loaded(program: &[u8]) -> Engine {
        let mut e = Engine::default();
        e.load(rom(program), None, SavePaths::default()).unwrap();
        e
    }

    fn pc(e: &Engine) -> u16 { e.cpu().unwrap().regs.pc }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dmg-core-{}-{name}.sav", std::process::id()))
    }

    // ── Execution ───────────────────────────────────────────────────────────

    #[test]
    fn run_stops_before_breakpoint() {
        let mut image = rom(&[0x00, 0xC3, 0x50, 0x01]); // NOP; JP 0x0150
        image[0x150] = 0x3C; // INC A
        let mut e = Engine::default();
        e.load(image, None, SavePaths::default()).unwrap();
        assert_eq!(e.run(&[0x0150]), Status::Breakpoint);
        assert_eq!(pc(&e), 0x0150);
        assert_eq!(e.cpu().unwrap().regs.a, 0x01);
        assert_eq!(e.clock().unwrap().t_cycles, 4 + 16);
    }

    #[test]
    fn run_ends_when_host_says_stop() {
        let mut e = loaded(&[0x18, 0xFE]);
        let (host, seen) = Recorder::new(10);
        e.set_host(Box::new(host));
        assert_eq!(e.run(&[]), Status::Success);
        assert_eq!(e.clock().unwrap().t_cycles, 10 * 12);
        assert_eq!(seen.borrow().polls, 11);
    }

    #[test]
    fn bounded_step_and_breakpoint() {
        let mut e = loaded(&[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(e.step(3, &[]), Status::Success);
        assert_eq!(pc(&e), 0x0103);
        assert_eq!(e.step(10, &[0x0104]), Status::Breakpoint);
        assert_eq!(pc(&e), 0x0104);
    }

    #[test]
    fn nothing_runs_without_a_cartridge() {
        let mut e = Engine::default();
        assert_eq!(e.run(&[]), Status::Failure);
        assert_eq!(e.step(1, &[]), Status::Failure);
        assert!(matches!(e.step_once(), Err(CoreError::NotLoaded)));
        assert_eq!(e.read(0x0100), 0xFF);
        assert_eq!(e.debug(DebugRequest::nop(7)).status, Status::Invalid);
        assert!(matches!(e.unload(), Err(CoreError::NotLoaded)));
        assert_eq!(e.state_json(), "null");
    }

    #[test]
    fn frame_flush_hands_every_pixel_to_host() {
        let mut e = loaded(&[0x18, 0xFE]);
        let (host, seen) = Recorder::new(usize::MAX);
        e.set_host(Box::new(host));
        e.step(6000, &[]);
        assert_eq!(seen.borrow().frames, 1);
        assert_eq!(seen.borrow().pixels, LCD_WIDTH * LCD_HEIGHT);
    }

    #[test]
    fn timer_interrupt_reaches_vector() {
        let program = [
            0x3E, 0x05, 0xE0, 0x07, // TAC = enabled, 16-cycle period
            0x3E, 0x04, 0xE0, 0xFF, // IE = TIMER
            0xFB,                   // EI
            0x18, 0xFE,             // spin
        ];
        let mut image = rom(&program);
        image[0x50..0x53].copy_from_slice(&[0xC3, 0x00, 0x02]); // vector: JP 0x0200
        let mut e = Engine::default();
        e.load(image, None, SavePaths::default()).unwrap();
        assert_eq!(e.run(&[0x0200]), Status::Breakpoint);
        assert_eq!(e.cpu().unwrap().regs.sp, 0xFFFC);
        assert!(!e.cpu().unwrap().ime);
        assert_eq!(e.read(0xFF0F) & Interrupts::TIMER.bits(), 0);
        assert_eq!(e.read(0xFFFD), 0x01);
    }

    #[test]
    fn serial_byte_goes_to_host() {
        let program = [0x3E, b'H', 0xE0, 0x01, 0x3E, 0x81, 0xE0, 0x02, 0x18, 0xFE];
        let mut e = loaded(&program);
        let (host, seen) = Recorder::new(usize::MAX);
        e.set_host(Box::new(host));
        e.step(1000, &[]);
        assert_eq!(seen.borrow().serial, b"H");
        assert_eq!(e.read(0xFF02) & 0x80, 0);
        assert_ne!(e.read(0xFF0F) & Interrupts::SERIAL.bits(), 0);
    }

    #[test]
    fn button_press_wakes_stop() {
        let program = [0x3E, 0x10, 0xE0, 0x00, 0x10, 0x00, 0x3C, 0x18, 0xFE];
        let cfg = EngineConfig { joypad_poll_cycles: 64, ..EngineConfig::default() };
        let mut e = Engine::new(cfg);
        e.load(rom(&program), None, SavePaths::default()).unwrap();
        let (mut host, _seen) = Recorder::new(usize::MAX);
        host.buttons = Buttons::START;
        e.set_host(Box::new(host));
        e.step(3, &[]);
        assert!(e.cpu().unwrap().stopped);
        e.step(20, &[]);
        assert!(!e.cpu().unwrap().stopped);
        assert_eq!(e.cpu().unwrap().regs.a, 0x11);
    }

    #[test]
    fn unmapped_reads_float() {
        let mut e = loaded(&[]);
        assert_eq!(e.read(0xFEA0), 0xFF);
        assert_eq!(e.read(0xFF4C), 0xFF);
        e.write(0xFF4C, 0x12);
        assert_eq!(e.read(0xFF4C), 0xFF);
        assert_eq!(e.read(0xA000), 0xFF); // no cartridge RAM
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    #[test]
    fn failed_load_leaves_engine_untouched() {
        let mut e = Engine::default();
        assert!(matches!(e.load(vec![0; 0x100], None, SavePaths::default()), Err(CoreError::ImageTooShort(0x100))));
        assert!(!e.is_loaded());

        let mut e = loaded(&[0x00, 0x00]);
        e.step(2, &[]);
        let before = e.state_json();
        let mut corrupt = rom(&[]);
        corrupt[0x14D] ^= 1;
        assert!(matches!(e.load(corrupt, None, SavePaths::default()), Err(CoreError::HeaderChecksum { .. })));
        assert!(matches!(e.load(rom_with(0xFC, 0, 0, &[]), None, SavePaths::default()), Err(CoreError::UnsupportedMapper(0xFC))));
        assert!(matches!(e.load(rom(&[]), Some(vec![0; 255]), SavePaths::default()), Err(CoreError::BootRomSize(255))));
        assert_eq!(e.state_json(), before);
        assert_eq!(e.header().unwrap().title, TITLE);
    }

    #[test]
    fn boot_rom_starts_cold_and_hands_over() {
        let mut boot = vec![0u8; 256];
        boot[..5].copy_from_slice(&[0x3E, 0x01, 0xC3, 0xFC, 0x00]); // LD A,1; JP 0x00FC
        boot[0xFC..0xFE].copy_from_slice(&[0xE0, 0x50]);            // LDH (0x50),A
        let mut e = Engine::default();
        e.load(rom(&[0x00]), Some(boot), SavePaths::default()).unwrap();
        assert_eq!(pc(&e), 0x0000);
        assert_eq!(e.cpu().unwrap().regs.af(), 0);
        assert_eq!(e.read(0x0000), 0x3E);
        assert_eq!(e.read(0xFF40), 0x00);
        assert_eq!(e.run(&[0x0100]), Status::Breakpoint);
        assert_eq!(e.read(0x0000), 0x00);
    }

    // ── Debug protocol ──────────────────────────────────────────────────────

    #[test]
    fn register_space_requests() {
        let mut e = loaded(&[0x00]);
        let pc_addr = REGISTER_SPACE + RegisterId::PC.index();
        let r = e.debug(DebugRequest::read(1, pc_addr));
        assert_eq!((r.id, r.status, r.data), (1, Status::Success, 0x0100));

        let a_addr = REGISTER_SPACE + RegisterId::A.index();
        assert_eq!(e.debug(DebugRequest::write(2, a_addr, 0x42)).status, Status::Success);
        assert_eq!(e.register(RegisterId::A), Some(0x42));

        assert_eq!(e.debug(DebugRequest::write(3, a_addr, 0x142)).status, Status::Invalid);
        assert_eq!(e.register(RegisterId::A), Some(0x42));
        assert_eq!(e.debug(DebugRequest::read(4, REGISTER_SPACE + 19)).status, Status::Invalid);

        let ie_addr = REGISTER_SPACE + RegisterId::IE.index();
        assert_eq!(e.debug(DebugRequest::write(5, ie_addr, 0x05)).status, Status::Success);
        assert_eq!(e.read(0xFFFF), 0x05);
        assert_eq!(e.register(RegisterId::IF), Some(0xE0));
    }

    #[test]
    fn memory_and_cycle_requests() {
        let mut e = loaded(&[0x00, 0x00]);
        assert_eq!(e.debug(DebugRequest::write(1, 0xC000, 0x99)).status, Status::Success);
        assert_eq!(e.debug(DebugRequest::read(2, 0xC000)).data, 0x99);
        assert_eq!(e.debug(DebugRequest::write(3, 0xC000, 0x100)).status, Status::Invalid);
        assert_eq!(e.read(0xC000), 0x99);
        let r = e.debug(DebugRequest::cycle(4));
        assert_eq!((r.status, r.data), (Status::Success, 4));
        assert_eq!(pc(&e), 0x0101);
    }

    #[test]
    fn serial_in_completes_external_transfer() {
        let mut e = loaded(&[]);
        assert_eq!(e.debug(DebugRequest::serial_in(1, 0x33)).status, Status::Invalid);
        e.write(0xFF01, 0x42);
        e.write(0xFF02, 0x80);
        let r = e.debug(DebugRequest::serial_in(2, 0x33));
        assert_eq!((r.status, r.data), (Status::Success, 0x42));
        assert_eq!(e.read(0xFF01), 0x33);
        assert_ne!(e.read(0xFF0F) & Interrupts::SERIAL.bits(), 0);
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Fills work RAM with a counter: LD HL,0xC000; loop: LD (HL+),A; INC A; JR loop
    const FILLER: [u8; 7] = [0x21, 0x00, 0xC0, 0x22, 0x3C, 0x18, 0xFC];

    fn snapshot(e: &Engine) -> Vec<u8> {
        let mut out = Vec::new();
        e.export_state(&mut out).unwrap();
        out
    }

    #[test]
    fn state_round_trip_is_exact() {
        let mut a = loaded(&FILLER);
        a.step(1500, &[]);
        let saved = snapshot(&a);
        assert_eq!(&saved[..4], b"DMGS");

        let mut b = loaded(&FILLER);
        b.import_state(&mut saved.as_slice()).unwrap();
        assert_eq!(snapshot(&b), saved);
        assert_eq!(b.state_json(), a.state_json());

        a.step(700, &[]);
        b.step(700, &[]);
        assert_eq!(snapshot(&a), snapshot(&b));
    }

    #[test]
    fn bad_snapshot_changes_nothing() {
        let mut e = loaded(&FILLER);
        e.step(200, &[]);
        let before = snapshot(&e);
        assert!(matches!(e.import_state(&mut &b"nope"[..]), Err(CoreError::BadSnapshot(_))));
        let truncated = &before[..before.len() - 10];
        assert!(matches!(e.import_state(&mut &truncated[..]), Err(CoreError::BadSnapshot(_))));
        let mut versioned = before.clone();
        versioned[4] = 99;
        assert!(matches!(e.import_state(&mut versioned.as_slice()), Err(CoreError::BadSnapshot(_))));
        assert_eq!(snapshot(&e), before);
    }

    #[test]
    fn out_of_range_counters_are_rejected() {
        const APU_PHASE: usize = 13;
        const SERIAL_PHASE: usize = 73;
        const TIMA_COUNTER: usize = 82;
        const PPU_DOTS: usize = 107;
        const PPU_MODE: usize = 111;
        const PPU_LINE: usize = 112;
        const DMA_ACTIVE: usize = 127;
        const DMA_INDEX: usize = 128;

        let mut e = loaded(&FILLER);
        e.step(300, &[]);
        let before = snapshot(&e);
        let cases: Vec<Vec<(usize, Vec<u8>)>> = vec![
            vec![(DMA_ACTIVE, vec![1]), (DMA_INDEX, vec![0xFF])],
            vec![(DMA_ACTIVE, vec![1]), (DMA_INDEX, vec![0xA0])],
            vec![(PPU_DOTS, 455u32.to_le_bytes().to_vec()), (PPU_MODE, vec![1]), (PPU_LINE, vec![0xFF])],
            vec![(PPU_DOTS, 500u32.to_le_bytes().to_vec())],
            vec![(TIMA_COUNTER, u32::MAX.to_le_bytes().to_vec())],
            vec![(SERIAL_PHASE, u32::MAX.to_le_bytes().to_vec())],
            vec![(APU_PHASE, u32::MAX.to_le_bytes().to_vec())],
        ];
        for patch in &cases {
            let mut bytes = before.clone();
            for (at, with) in patch { bytes[*at..*at + with.len()].copy_from_slice(with); }
            assert!(matches!(e.import_state(&mut bytes.as_slice()), Err(CoreError::BadSnapshot(_))), "{patch:?}");
            assert_eq!(snapshot(&e), before);
        }
        e.step(100, &[]);
        assert!((0x0103..0x0107).contains(&pc(&e)));
    }

    #[test]
    fn finished_dma_imports_idle() {
        let mut e = loaded(&FILLER);
        let mut bytes = snapshot(&e);
        bytes[128] = 0xA0;
        e.import_state(&mut bytes.as_slice()).unwrap();
        assert_eq!(snapshot(&e), bytes);
        e.step(50, &[]);
        assert!((0x0103..0x0107).contains(&pc(&e)));
    }

    fn battery_rom() -> Vec<u8> { rom_with(0x03, 0x00, 0x02, &[]) } // MBC1 + RAM + battery

    #[test]
    fn battery_export_import() {
        let mut e = Engine::default();
        e.load(battery_rom(), None, SavePaths::default()).unwrap();
        e.write(0x0000, 0x0A);
        e.write(0xA000, 0x12);
        e.write(0xBFFF, 0x34);
        let mut ram = Vec::new();
        e.export_battery(&mut ram).unwrap();
        assert_eq!(ram.len(), 0x2000);

        let mut f = Engine::default();
        f.load(battery_rom(), None, SavePaths::default()).unwrap();
        assert!(matches!(f.import_battery(&mut &ram[..100]), Err(CoreError::LengthMismatch { .. })));
        f.import_battery(&mut ram.as_slice()).unwrap();
        f.write(0x0000, 0x0A);
        assert_eq!((f.read(0xA000), f.read(0xBFFF)), (0x12, 0x34));
    }

    #[test]
    fn battery_file_survives_unload() {
        let path = temp_path("battery");
        let _ = std::fs::remove_file(&path);
        let saves = SavePaths { battery: Some(path.clone()) };

        let mut e = Engine::default();
        e.load(battery_rom(), None, saves.clone()).unwrap();
        e.write(0x0000, 0x0A);
        e.write(0xA123, 0x77);
        e.unload().unwrap();
        assert!(!e.is_loaded());
        assert_eq!(std::fs::read(&path).unwrap().len(), 0x2000);

        e.load(battery_rom(), None, saves.clone()).unwrap();
        e.write(0x0000, 0x0A);
        assert_eq!(e.read(0xA123), 0x77);
        e.unload().unwrap();

        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(matches!(e.load(battery_rom(), None, saves), Err(CoreError::LengthMismatch { expected: 0x2000, actual: 10 })));
        assert!(!e.is_loaded());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn config_flows_from_json() {
        let cfg = EngineConfig::from_json(r#"{"log_unmapped": false}"#).unwrap();
        let e = Engine::new(cfg.clone());
        assert_eq!(e.config(), &cfg);
    }
}

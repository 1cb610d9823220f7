// ── Display timing + scanline renderer ──────────────────────────────────────

use crate::interrupts::{InterruptController, Interrupts};
use crate::snapshot::{invalid_data, Snapshot, StateReader, StateWriter};
use crate::{LCD_HEIGHT, LCD_WIDTH};
use std::io;

pub const SEARCH_CYCLES: u32 = 80;
pub const TRANSFER_CYCLES: u32 = 172;
pub const HBLANK_CYCLES: u32 = 204;
pub const LINE_CYCLES: u32 = 456;
pub const VBLANK_LINE: u8 = 144;
pub const LAST_LINE: u8 = 153;

// LCDC bits
pub const LCDC_ENABLE: u8 = 0x80;
pub const LCDC_WIN_MAP: u8 = 0x40;
pub const LCDC_WIN_ENABLE: u8 = 0x20;
pub const LCDC_TILE_DATA: u8 = 0x10;
pub const LCDC_BG_MAP: u8 = 0x08;
pub const LCDC_OBJ_TALL: u8 = 0x04;
pub const LCDC_OBJ_ENABLE: u8 = 0x02;
pub const LCDC_BG_ENABLE: u8 = 0x01;

// STAT interrupt-select bits
pub const STAT_LYC_INT: u8 = 0x40;
pub const STAT_SEARCH_INT: u8 = 0x20;
pub const STAT_VBLANK_INT: u8 = 0x10;
pub const STAT_HBLANK_INT: u8 = 0x08;
pub const STAT_COINCIDENCE: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode { HBlank = 0, VBlank = 1, Search = 2, Transfer = 3 }

impl Mode {
    pub fn duration(self) -> u32 {
        match self { Mode::Search => SEARCH_CYCLES, Mode::Transfer => TRANSFER_CYCLES, Mode::HBlank => HBLANK_CYCLES, Mode::VBlank => LINE_CYCLES }
    }
    fn from_raw(v: u8) -> Option<Self> {
        match v { 0 => Some(Mode::HBlank), 1 => Some(Mode::VBlank), 2 => Some(Mode::Search), 3 => Some(Mode::Transfer), _ => None }
    }
}

// ── Sprite ──────────────────────────────────────────────────────────────────
#[derive(Debug, Default, Clone, Copy)]
pub struct Sprite { pub y: u8, pub x: u8, pub tile: u8, pub flags: u8 }

impl Sprite {
    pub fn from_oam(oam: &[u8; 0xA0], idx: usize) -> Self {
        let b = idx * 4;
        Sprite { y: oam[b], x: oam[b + 1], tile: oam[b + 2], flags: oam[b + 3] }
    }
    pub fn screen_y(&self) -> i32 { self.y as i32 - 16 }
    pub fn screen_x(&self) -> i32 { self.x as i32 - 8 }
    pub fn behind_bg(&self) -> bool { self.flags & 0x80 != 0 }
    pub fn y_flip(&self) -> bool { self.flags & 0x40 != 0 }
    pub fn x_flip(&self) -> bool { self.flags & 0x20 != 0 }
    pub fn palette(&self) -> u8 { (self.flags >> 4) & 0x01 }
}

fn apply_palette(pal: u8, c: u8) -> u8 { (pal >> (c * 2)) & 0x03 }

// ── PPU ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ppu {
    pub mode: Mode, pub line: u8, pub lyc: u8,
    pub lcdc: u8, stat: u8, pub scy: u8, pub scx: u8,
    pub wy: u8, pub wx: u8, pub bgp: u8, pub obp0: u8, pub obp1: u8,
    dots: u32, window_line: u8,
    coincidence: bool, vblank_fired: bool,
    /// 2-bit shades, row-major, `LCD_WIDTH * LCD_HEIGHT`.
    pub framebuffer: Vec<u8>,
}

impl Default for Ppu {
    fn default() -> Self {
        Ppu { mode: Mode::HBlank, line: 0, lyc: 0, lcdc: 0, stat: 0, scy: 0, scx: 0,
              wy: 0, wx: 0, bgp: 0, obp0: 0, obp1: 0, dots: 0, window_line: 0,
              coincidence: false, vblank_fired: false,
              framebuffer: vec![0u8; LCD_WIDTH * LCD_HEIGHT] }
    }
}

impl Ppu {
    /// Display state handed over by the boot ROM: LCD on at the start of a frame.
    pub fn post_boot() -> Self {
        Ppu { mode: Mode::Search, lcdc: 0x91, bgp: 0xFC, obp0: 0xFF, obp1: 0xFF, ..Ppu::default() }
    }

    pub fn enabled(&self) -> bool { self.lcdc & LCDC_ENABLE != 0 }
    pub fn vram_accessible(&self) -> bool { !self.enabled() || self.mode != Mode::Transfer }
    pub fn oam_accessible(&self) -> bool { !self.enabled() || !matches!(self.mode, Mode::Search | Mode::Transfer) }
    pub fn coincidence(&self) -> bool { self.coincidence }

    fn enter(&mut self, mode: Mode, ic: &mut InterruptController) {
        self.mode = mode;
        let select = match mode {
            Mode::HBlank => STAT_HBLANK_INT,
            Mode::Search => STAT_SEARCH_INT,
            Mode::VBlank => {
                if !self.vblank_fired { self.vblank_fired = true; ic.raise(Interrupts::VBLANK); }
                STAT_VBLANK_INT
            }
            Mode::Transfer => 0,
        };
        if self.stat & select != 0 { ic.raise(Interrupts::STAT); }
    }

    fn check_coincidence(&mut self, ic: &mut InterruptController) {
        let hit = self.line == self.lyc;
        if hit && !self.coincidence && self.stat & STAT_LYC_INT != 0 { ic.raise(Interrupts::STAT); }
        self.coincidence = hit;
    }

    /// Advance the mode machine. Returns true when the last VBLANK line wraps
    /// back to line 0, i.e. a full frame is ready in `framebuffer`.
    pub fn step(&mut self, cycles: u32, vram: &[u8; 0x2000], oam: &[u8; 0xA0], ic: &mut InterruptController) -> bool {
        if !self.enabled() { return false; }
        self.dots += cycles;
        let mut frame_done = false;
        while self.dots >= self.mode.duration() {
            self.dots -= self.mode.duration();
            match self.mode {
                Mode::Search => self.enter(Mode::Transfer, ic),
                Mode::Transfer => { self.render_line(vram, oam); self.enter(Mode::HBlank, ic); }
                Mode::HBlank => {
                    self.line += 1;
                    if self.line < VBLANK_LINE { self.enter(Mode::Search, ic) } else { self.enter(Mode::VBlank, ic) }
                }
                Mode::VBlank => {
                    self.line += 1;
                    if self.line > LAST_LINE {
                        self.line = 0; self.window_line = 0; self.vblank_fired = false;
                        self.enter(Mode::Search, ic);
                        frame_done = true;
                    }
                }
            }
            self.check_coincidence(ic);
        }
        frame_done
    }

    fn render_line(&mut self, vram: &[u8; 0x2000], oam: &[u8; 0xA0]) {
        let ly = self.line as usize;
        if ly >= LCD_HEIGHT { return; }
        let lcdc = self.lcdc;
        let mut shade = [0u8; LCD_WIDTH];
        let mut bg_opaque = [false; LCD_WIDTH];

        let data_base: usize = if lcdc & LCDC_TILE_DATA != 0 { 0x0000 } else { 0x0800 };
        let signed = lcdc & LCDC_TILE_DATA == 0;
        let tile_row = |idx: u8, row: usize| -> (u8, u8) {
            let ta = if signed { (0x1000 + (idx as i8 as i32) * 16) as usize + row * 2 } else { data_base + idx as usize * 16 + row * 2 };
            (vram[ta], vram[ta + 1])
        };

        // Background
        if lcdc & LCDC_BG_ENABLE != 0 {
            let map_base: usize = if lcdc & LCDC_BG_MAP != 0 { 0x1C00 } else { 0x1800 };
            let map_y = (ly + self.scy as usize) & 0xFF;
            for x in 0..LCD_WIDTH {
                let map_x = (x + self.scx as usize) & 0xFF;
                let idx = vram[map_base + (map_y >> 3) * 32 + (map_x >> 3)];
                let (lo, hi) = tile_row(idx, map_y & 7);
                let bit = 7 - (map_x & 7);
                let c = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                shade[x] = apply_palette(self.bgp, c);
                bg_opaque[x] = c != 0;
            }

            // Window
            let wx7 = self.wx as i32 - 7;
            if lcdc & LCDC_WIN_ENABLE != 0 && ly >= self.wy as usize && wx7 < LCD_WIDTH as i32 {
                let wmap: usize = if lcdc & LCDC_WIN_MAP != 0 { 0x1C00 } else { 0x1800 };
                let wl = self.window_line as usize;
                for x in wx7.max(0) as usize..LCD_WIDTH {
                    let wxp = (x as i32 - wx7) as usize;
                    let idx = vram[wmap + (wl >> 3) * 32 + (wxp >> 3)];
                    let (lo, hi) = tile_row(idx, wl & 7);
                    let bit = 7 - (wxp & 7);
                    let c = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                    shade[x] = apply_palette(self.bgp, c);
                    bg_opaque[x] = c != 0;
                }
                self.window_line = self.window_line.wrapping_add(1);
            }
        }

        // Sprites: first 10 on the line, lower X wins, earlier OAM wins ties.
        if lcdc & LCDC_OBJ_ENABLE != 0 {
            let sh: i32 = if lcdc & LCDC_OBJ_TALL != 0 { 16 } else { 8 };
            let mut visible: Vec<(usize, Sprite)> = Vec::with_capacity(10);
            for i in 0..40 {
                let s = Sprite::from_oam(oam, i);
                let sy = s.screen_y();
                if (ly as i32) >= sy && (ly as i32) < sy + sh {
                    visible.push((i, s));
                    if visible.len() == 10 { break; }
                }
            }
            visible.sort_by_key(|&(i, s)| (s.x, i));
            for (_, s) in visible.iter().rev() {
                let mut row = (ly as i32 - s.screen_y()) as usize;
                if s.y_flip() { row = sh as usize - 1 - row; }
                let tile = if sh == 16 { s.tile & 0xFE } else { s.tile };
                let ta = tile as usize * 16 + row * 2;
                let (lo, hi) = (vram[ta], vram[ta + 1]);
                let pal = if s.palette() == 0 { self.obp0 } else { self.obp1 };
                for bi in 0..8usize {
                    let sx = s.screen_x() + bi as i32;
                    if sx < 0 || sx >= LCD_WIDTH as i32 { continue; }
                    let bit = if s.x_flip() { bi } else { 7 - bi };
                    let c = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                    if c == 0 { continue; }
                    let px = sx as usize;
                    if s.behind_bg() && bg_opaque[px] { continue; }
                    shade[px] = apply_palette(pal, c);
                }
            }
        }

        self.framebuffer[ly * LCD_WIDTH..(ly + 1) * LCD_WIDTH].copy_from_slice(&shade);
    }

    pub fn read_reg(&self, r: u8) -> u8 {
        match r {
            0x40 => self.lcdc,
            0x41 => {
                let mode = if self.enabled() { self.mode as u8 } else { 0 };
                0x80 | self.stat | ((self.coincidence as u8) << 2) | mode
            }
            0x42 => self.scy, 0x43 => self.scx, 0x44 => self.line, 0x45 => self.lyc,
            0x47 => self.bgp, 0x48 => self.obp0, 0x49 => self.obp1, 0x4A => self.wy, 0x4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, r: u8, v: u8) {
        match r {
            0x40 => {
                let was = self.enabled();
                self.lcdc = v;
                if was && !self.enabled() {
                    log::debug!("lcd off at line {}", self.line);
                    self.line = 0; self.dots = 0; self.mode = Mode::HBlank; self.coincidence = false;
                } else if !was && self.enabled() {
                    log::debug!("lcd on");
                    self.line = 0; self.dots = 0; self.mode = Mode::Search;
                    self.window_line = 0; self.vblank_fired = false;
                    self.coincidence = self.line == self.lyc;
                }
            }
            0x41 => self.stat = v & 0x78,
            0x42 => self.scy = v, 0x43 => self.scx = v, 0x44 => {}, 0x45 => self.lyc = v,
            0x47 => self.bgp = v, 0x48 => self.obp0 = v, 0x49 => self.obp1 = v,
            0x4A => self.wy = v, 0x4B => self.wx = v,
            _ => {}
        }
    }
}

impl Snapshot for Ppu {
    fn save_state(&self, w: &mut StateWriter<'_>) -> io::Result<()> {
        w.u32(self.dots)?; w.u8(self.mode as u8)?; w.u8(self.line)?; w.u8(self.lyc)?;
        w.u8(self.lcdc)?; w.u8(self.stat)?; w.u8(self.scy)?; w.u8(self.scx)?;
        w.u8(self.wy)?; w.u8(self.wx)?; w.u8(self.bgp)?; w.u8(self.obp0)?; w.u8(self.obp1)?;
        w.u8(self.window_line)?; w.bool(self.coincidence)?; w.bool(self.vblank_fired)
    }
    fn load_state(&mut self, r: &mut StateReader<'_>) -> io::Result<()> {
        self.dots = r.u32()?;
        self.mode = Mode::from_raw(r.u8()?).ok_or_else(|| invalid_data("display mode"))?;
        self.line = r.u8()?; self.lyc = r.u8()?;
        if self.line > LAST_LINE { return Err(invalid_data("display line")); }
        if self.dots >= self.mode.duration() { return Err(invalid_data("display dot counter")); }
        self.lcdc = r.u8()?; self.stat = r.u8()? & 0x78; self.scy = r.u8()?; self.scx = r.u8()?;
        self.wy = r.u8()?; self.wx = r.u8()?; self.bgp = r.u8()?; self.obp0 = r.u8()?; self.obp1 = r.u8()?;
        self.window_line = r.u8()?; self.coincidence = r.bool()?; self.vblank_fired = r.bool()?;
        Ok(())
    }
}

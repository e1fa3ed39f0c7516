use crate::mmu::{
    Interrupts, Mmu, REG_BGP, REG_LCDC, REG_LY, REG_LYC, REG_OBP0, REG_OBP1, REG_SCX, REG_SCY,
    REG_STAT, REG_WX, REG_WY,
};

// Display dimensions
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const FRAME_PIXELS: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

// Mode timings in dots (gbdev.io/pandocs/Rendering.html)
const MODE0_CYCLES: u16 = 204; // HBlank
const MODE1_CYCLES: u16 = 456; // One line during VBlank
const MODE2_CYCLES: u16 = 80; // OAM scan
const MODE3_CYCLES: u16 = 172; // Pixel transfer

/// Lines per frame, visible plus V-blank.
pub const TOTAL_LINES: u8 = 154;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

const WINDOW_X_MAX: u8 = 166;

// VRAM offsets for tile maps and data
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const TILE_DATA_0_BASE: usize = 0x0000;
const TILE_DATA_1_BASE: usize = 0x0800;

// STAT modes
pub const MODE_HBLANK: u8 = 0;
pub const MODE_VBLANK: u8 = 1;
pub const MODE_OAM: u8 = 2;
pub const MODE_TRANSFER: u8 = 3;

// STAT bits
const STAT_COINCIDENCE: u8 = 0x04;
const STAT_HBLANK_IRQ: u8 = 0x08;
const STAT_VBLANK_IRQ: u8 = 0x10;
const STAT_OAM_IRQ: u8 = 0x20;
const STAT_LYC_IRQ: u8 = 0x40;

/// Default DMG palette colors in 0x00RRGGBB order.
pub const DMG_PALETTE: [u32; 4] = [0x009BBC0F, 0x008BAC0F, 0x00306230, 0x000F380F];

/// Consumer of finished frames.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &[u32]);
}

#[derive(Copy, Clone, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
    oam_index: usize,
}

/// Register snapshot taken at every mode transition.
#[derive(Copy, Clone, Default)]
struct Registers {
    lcdc: u8,
    scy: u8,
    scx: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
}

impl Registers {
    fn latch(mmu: &Mmu) -> Self {
        Self {
            lcdc: mmu.read_byte(REG_LCDC),
            scy: mmu.read_byte(REG_SCY),
            scx: mmu.read_byte(REG_SCX),
            bgp: mmu.read_byte(REG_BGP),
            obp0: mmu.read_byte(REG_OBP0),
            obp1: mmu.read_byte(REG_OBP1),
            wy: mmu.read_byte(REG_WY),
            wx: mmu.read_byte(REG_WX),
        }
    }
}

/// Scanline-granular pixel engine.
///
/// VRAM, OAM and the LCD registers live on the bus; this type keeps the mode
/// state machine and the two frame buffers.
pub struct Ppu {
    pub mode: u8,
    pub ly: u8,
    mode_clock: u16,
    lcd_on: bool,
    regs: Registers,
    /// Internal window line counter
    win_line_counter: u8,
    lyc_eq_ly: bool,
    stat_irq_line: bool,

    buffers: [Box<[u32]>; 2],
    /// Index of the buffer currently on display
    front: usize,
    line_color_zero: [bool; SCREEN_WIDTH],
    /// Latched sprites for the current scanline
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    /// Sprite height in effect when the current line's sprites were picked
    sprite_height: i16,
    frame_counter: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            mode: MODE_OAM,
            ly: 0,
            mode_clock: 0,
            lcd_on: false,
            regs: Registers::default(),
            win_line_counter: 0,
            lyc_eq_ly: false,
            stat_irq_line: false,
            buffers: [
                vec![DMG_PALETTE[0]; FRAME_PIXELS].into_boxed_slice(),
                vec![DMG_PALETTE[0]; FRAME_PIXELS].into_boxed_slice(),
            ],
            front: 0,
            line_color_zero: [false; SCREEN_WIDTH],
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            sprite_height: 8,
            frame_counter: 0,
        }
    }

    /// The most recently completed frame.
    pub fn framebuffer(&self) -> &[u32] {
        &self.buffers[self.front]
    }

    /// Frames completed so far, counted at V-blank entry.
    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    pub fn lcd_on(&self) -> bool {
        self.lcd_on
    }

    /// Advance by `cycles` dots. Returns `true` when V-blank was entered and
    /// a new frame was swapped to the front.
    pub fn step(&mut self, mmu: &mut Mmu, cycles: u32) -> bool {
        let mut remaining = cycles;
        let mut frame_done = false;
        while remaining > 0 {
            let increment = remaining.min(4);
            remaining -= increment;

            if mmu.read_byte(REG_LCDC) & 0x80 == 0 {
                if self.lcd_on {
                    self.lcd_off(mmu);
                }
                continue;
            }
            if !self.lcd_on {
                self.lcd_on = true;
                self.mode = MODE_OAM;
                self.mode_clock = 0;
                self.regs = Registers::latch(mmu);
                self.check_coincidence(mmu);
            }

            self.mode_clock += increment as u16;
            match self.mode {
                MODE_OAM => {
                    if self.mode_clock >= MODE2_CYCLES {
                        self.mode_clock -= MODE2_CYCLES;
                        self.regs = Registers::latch(mmu);
                        self.oam_scan(mmu);
                        self.check_coincidence(mmu);
                        self.mode = MODE_TRANSFER;
                    }
                }
                MODE_TRANSFER => {
                    if self.mode_clock >= MODE3_CYCLES {
                        self.mode_clock -= MODE3_CYCLES;
                        self.regs = Registers::latch(mmu);
                        self.render_scanline(mmu);
                        self.mode = MODE_HBLANK;
                    }
                }
                MODE_HBLANK => {
                    if self.mode_clock >= MODE0_CYCLES {
                        self.mode_clock -= MODE0_CYCLES;
                        self.regs = Registers::latch(mmu);
                        self.ly += 1;
                        if self.ly as usize == SCREEN_HEIGHT {
                            self.mode = MODE_VBLANK;
                            self.check_coincidence(mmu);
                            self.front ^= 1;
                            self.frame_counter = self.frame_counter.wrapping_add(1);
                            mmu.request_interrupt(Interrupts::VBLANK);
                            frame_done = true;
                            #[cfg(feature = "ppu-trace")]
                            log::trace!("frame {} complete", self.frame_counter);
                        } else {
                            self.mode = MODE_OAM;
                        }
                    }
                }
                _ => {
                    if self.mode_clock >= MODE1_CYCLES {
                        self.mode_clock -= MODE1_CYCLES;
                        self.regs = Registers::latch(mmu);
                        self.ly += 1;
                        if self.ly == TOTAL_LINES {
                            self.ly = 0;
                            self.win_line_counter = 0;
                            self.mode = MODE_OAM;
                        } else {
                            self.check_coincidence(mmu);
                        }
                    }
                }
            }

            self.sync_registers(mmu);
            self.update_stat_irq(mmu);
        }
        frame_done
    }

    fn lcd_off(&mut self, mmu: &mut Mmu) {
        self.lcd_on = false;
        self.mode = MODE_HBLANK;
        self.ly = 0;
        self.mode_clock = 0;
        self.win_line_counter = 0;
        self.stat_irq_line = false;
        self.sync_registers(mmu);
    }

    /// Compare LY against LYC and latch the result into STAT bit 2.
    fn check_coincidence(&mut self, mmu: &Mmu) {
        self.lyc_eq_ly = self.ly == mmu.read_byte(REG_LYC);
    }

    /// Publish LY and the STAT mode/coincidence bits on the bus.
    fn sync_registers(&self, mmu: &mut Mmu) {
        mmu.write(REG_LY, self.ly, true);
        let stat = mmu.read_byte(REG_STAT) & 0x78;
        let coincidence = if self.lyc_eq_ly { STAT_COINCIDENCE } else { 0 };
        mmu.write(REG_STAT, stat | coincidence | self.mode, true);
    }

    /// Raise the STAT interrupt on a rising edge of the combined STAT line.
    fn update_stat_irq(&mut self, mmu: &mut Mmu) {
        let stat = mmu.read_byte(REG_STAT);
        let coincidence = self.lyc_eq_ly && stat & STAT_LYC_IRQ != 0;
        let mode_signal = match self.mode {
            MODE_HBLANK => stat & STAT_HBLANK_IRQ != 0,
            MODE_VBLANK => stat & STAT_VBLANK_IRQ != 0,
            MODE_OAM => stat & STAT_OAM_IRQ != 0,
            _ => false,
        };
        let current = coincidence || mode_signal;
        if current && !self.stat_irq_line {
            mmu.request_interrupt(Interrupts::STAT);
        }
        self.stat_irq_line = current;
    }

    /// Collect up to 10 sprites visible on the current scanline.
    fn oam_scan(&mut self, mmu: &Mmu) {
        let sprite_height: i16 = if self.regs.lcdc & 0x04 != 0 { 16 } else { 8 };
        self.sprite_height = sprite_height;
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = mmu.oam[base] as i16 - 16;
            if self.ly as i16 >= y && (self.ly as i16) < y + sprite_height {
                self.line_sprites[self.sprite_count] = Sprite {
                    x: mmu.oam[base + 1] as i16 - 8,
                    y,
                    tile: mmu.oam[base + 2],
                    flags: mmu.oam[base + 3],
                    oam_index: i,
                };
                self.sprite_count += 1;
            }
        }
        // lower X wins, then lower OAM index
        self.line_sprites[..self.sprite_count].sort_by_key(|s| (s.x, s.oam_index));
    }

    fn dmg_shade(palette: u8, color_id: u8) -> u8 {
        (palette >> (color_id * 2)) & 0x03
    }

    /// Color index of one pixel of a background or window tile.
    fn tile_pixel(&self, mmu: &Mmu, map_base: usize, col: usize, row: usize, x: usize, y: usize) -> u8 {
        let tile_index = mmu.vram[map_base + row * 32 + col];
        let addr = if self.regs.lcdc & 0x10 != 0 {
            TILE_DATA_0_BASE + tile_index as usize * 16
        } else {
            TILE_DATA_1_BASE + ((tile_index as i8 as i16 + 128) as usize) * 16
        };
        let bit = 7 - x;
        let lo = mmu.vram[addr + y * 2];
        let hi = mmu.vram[addr + y * 2 + 1];
        (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
    }

    fn render_scanline(&mut self, mmu: &Mmu) {
        if self.ly as usize >= SCREEN_HEIGHT {
            return;
        }
        let back = self.front ^ 1;
        let line_start = self.ly as usize * SCREEN_WIDTH;
        let regs = self.regs;
        let bg_enabled = regs.lcdc & 0x01 != 0;

        // With the background off the line shows color 0 and sprites treat
        // every pixel as transparent background.
        let bg_color = DMG_PALETTE[Self::dmg_shade(regs.bgp, 0) as usize];
        self.buffers[back][line_start..line_start + SCREEN_WIDTH].fill(bg_color);
        self.line_color_zero.fill(true);

        if bg_enabled {
            let tile_map_base = if regs.lcdc & 0x08 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };
            let bg_y = (self.ly as usize + regs.scy as usize) & 0xFF;
            for x in 0..SCREEN_WIDTH {
                let px = (x + regs.scx as usize) & 0xFF;
                let color_id =
                    self.tile_pixel(mmu, tile_map_base, px / 8, bg_y / 8, px % 8, bg_y % 8);
                let shade = Self::dmg_shade(regs.bgp, color_id);
                self.buffers[back][line_start + x] = DMG_PALETTE[shade as usize];
                self.line_color_zero[x] = color_id == 0;
            }

            // window
            if regs.lcdc & 0x20 != 0 && self.ly >= regs.wy && regs.wx <= WINDOW_X_MAX {
                let wx = regs.wx as i16 - 7;
                let window_map_base = if regs.lcdc & 0x40 != 0 {
                    BG_MAP_1_BASE
                } else {
                    BG_MAP_0_BASE
                };
                let window_y = self.win_line_counter as usize;
                for x in wx.max(0) as usize..SCREEN_WIDTH {
                    let window_x = (x as i16 - wx) as usize;
                    let color_id = self.tile_pixel(
                        mmu,
                        window_map_base,
                        window_x / 8,
                        window_y / 8,
                        window_x % 8,
                        window_y % 8,
                    );
                    let shade = Self::dmg_shade(regs.bgp, color_id);
                    self.buffers[back][line_start + x] = DMG_PALETTE[shade as usize];
                    self.line_color_zero[x] = color_id == 0;
                }
                self.win_line_counter = self.win_line_counter.wrapping_add(1);
            }
        }

        // sprites
        if regs.lcdc & 0x02 != 0 {
            // height and selection come from the same OAM scan
            let sprite_height = self.sprite_height;
            let mut drawn = [false; SCREEN_WIDTH];
            for s in &self.line_sprites[..self.sprite_count] {
                let mut tile = s.tile;
                if sprite_height == 16 {
                    tile &= 0xFE;
                }
                let mut line_idx = self.ly as i16 - s.y;
                if s.flags & 0x40 != 0 {
                    line_idx = sprite_height - 1 - line_idx;
                }
                let addr = tile as usize * 16 + line_idx as usize * 2;
                let lo = mmu.vram[addr];
                let hi = mmu.vram[addr + 1];
                let palette = if s.flags & 0x10 != 0 {
                    regs.obp1
                } else {
                    regs.obp0
                };
                for px in 0..8 {
                    let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                    let color_id = (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1);
                    if color_id == 0 {
                        continue;
                    }
                    let sx = s.x + px as i16;
                    if !(0i16..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                        continue;
                    }
                    let sx = sx as usize;
                    // a higher-priority sprite still occupies its pixel even
                    // when hidden behind the background
                    drawn[sx] = true;
                    if s.flags & 0x80 != 0 && !self.line_color_zero[sx] {
                        continue;
                    }
                    let shade = Self::dmg_shade(palette, color_id);
                    self.buffers[back][line_start + sx] = DMG_PALETTE[shade as usize];
                }
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

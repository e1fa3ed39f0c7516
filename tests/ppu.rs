mod common;

use std::sync::{Arc, Mutex};

use dmg_core::{
    gameboy::{CYCLES_PER_FRAME, GameBoy},
    mmu::{Interrupts, Mmu},
    ppu::{DMG_PALETTE, FRAME_PIXELS, FrameSink, Ppu, SCREEN_WIDTH},
};

const LINE_CYCLES: u32 = 456;

fn lcd_on() -> (Ppu, Mmu) {
    let mut mmu = Mmu::new();
    mmu.if_reg = Interrupts::empty();
    (Ppu::new(), mmu)
}

/// Step one frame in 4-dot slices, returning the STAT mode seen after each.
fn frame_modes(ppu: &mut Ppu, mmu: &mut Mmu) -> Vec<u8> {
    (0..CYCLES_PER_FRAME / 4)
        .map(|_| {
            ppu.step(mmu, 4);
            mmu.read_byte(0xFF41) & 0x03
        })
        .collect()
}

#[test]
fn mode_sequence_over_one_frame() {
    let (mut ppu, mut mmu) = lcd_on();
    let mut modes = frame_modes(&mut ppu, &mut mmu);
    modes.dedup();

    let mut expected = Vec::new();
    for _ in 0..144 {
        expected.extend_from_slice(&[2, 3, 0]);
    }
    expected.push(1);
    expected.push(2);
    assert_eq!(modes, expected);
    assert_eq!(ppu.ly, 0);
}

#[test]
fn mode_lengths_within_a_line() {
    let (mut ppu, mut mmu) = lcd_on();
    let modes: Vec<u8> = (0..LINE_CYCLES / 4)
        .map(|_| {
            ppu.step(&mut mmu, 4);
            ppu.mode
        })
        .collect();
    // the slice that completes a mode already reports the next one, so the
    // last slice of the line shows line 1's OAM scan
    let count = |mode: u8| modes.iter().filter(|&&m| m == mode).count();
    assert_eq!(count(2), 80 / 4);
    assert_eq!(count(3), 172 / 4);
    assert_eq!(count(0), 204 / 4);
    assert_eq!(modes.last(), Some(&2));
    assert_eq!(mmu.read_byte(0xFF44), 1);
}

#[test]
fn ly_visits_all_154_lines() {
    let (mut ppu, mut mmu) = lcd_on();
    let mut seen = Vec::new();
    for _ in 0..CYCLES_PER_FRAME / 4 {
        ppu.step(&mut mmu, 4);
        let ly = mmu.read_byte(0xFF44);
        if seen.last() != Some(&ly) {
            seen.push(ly);
        }
    }
    let mut expected: Vec<u8> = (0..154).collect();
    expected.push(0);
    assert_eq!(seen, expected);
}

#[test]
fn exactly_one_vblank_interrupt_per_frame() {
    let (mut ppu, mut mmu) = lcd_on();
    let mut count = 0;
    let mut frames = 0;
    for _ in 0..3 * CYCLES_PER_FRAME / 4 {
        if ppu.step(&mut mmu, 4) {
            frames += 1;
        }
        if mmu.if_reg.contains(Interrupts::VBLANK) {
            count += 1;
            mmu.if_reg.remove(Interrupts::VBLANK);
        }
    }
    assert_eq!(count, 3);
    assert_eq!(frames, 3);
    assert_eq!(ppu.frames(), 3);
    assert!(!mmu.if_reg.contains(Interrupts::STAT));
}

#[test]
fn coincidence_interrupt_once_per_frame() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF45, 64);
    mmu.write_byte(0xFF41, 0x40);

    let mut hits = Vec::new();
    for _ in 0..2 * CYCLES_PER_FRAME / 4 {
        ppu.step(&mut mmu, 4);
        if mmu.if_reg.contains(Interrupts::STAT) {
            hits.push(ppu.ly);
            mmu.if_reg.remove(Interrupts::STAT);
        }
    }
    assert_eq!(hits, vec![64, 64]);
}

#[test]
fn coincidence_flag_tracks_lyc() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF45, 2);
    ppu.step(&mut mmu, 2 * LINE_CYCLES + 80);
    assert_eq!(mmu.read_byte(0xFF44), 2);
    assert_eq!(mmu.read_byte(0xFF41) & 0x04, 0x04);
    ppu.step(&mut mmu, LINE_CYCLES);
    assert_eq!(mmu.read_byte(0xFF41) & 0x04, 0);
}

#[test]
fn hblank_stat_interrupt_fires_each_visible_line() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF41, 0x08);
    let mut count = 0;
    for _ in 0..CYCLES_PER_FRAME / 4 {
        ppu.step(&mut mmu, 4);
        if mmu.if_reg.contains(Interrupts::STAT) {
            count += 1;
            mmu.if_reg.remove(Interrupts::STAT);
        }
    }
    assert_eq!(count, 144);
}

#[test]
fn lcd_off_resets_line_and_mode() {
    let (mut ppu, mut mmu) = lcd_on();
    ppu.step(&mut mmu, 10 * LINE_CYCLES + 100);
    assert_eq!(mmu.read_byte(0xFF44), 10);

    mmu.write_byte(0xFF40, 0x11);
    ppu.step(&mut mmu, 4);
    assert_eq!(mmu.read_byte(0xFF44), 0);
    assert_eq!(mmu.read_byte(0xFF41) & 0x03, 0);
    assert!(!ppu.lcd_on());

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    assert_eq!(mmu.read_byte(0xFF44), 0);
    assert!(!mmu.if_reg.contains(Interrupts::VBLANK));

    mmu.write_byte(0xFF40, 0x91);
    ppu.step(&mut mmu, 4);
    assert_eq!(ppu.mode, 2);
}

#[test]
fn background_tile_rendered_through_palette() {
    let (mut ppu, mut mmu) = lcd_on();
    // tile 1: first row color 3, every other row color 1
    mmu.vram[16] = 0xFF;
    mmu.vram[17] = 0xFF;
    for row in 1..8 {
        mmu.vram[16 + row * 2] = 0xFF;
    }
    // map 0x9800, top-left entry uses tile 1; LCDC 0x91 selects 0x8000 data
    mmu.vram[0x1800] = 1;
    mmu.write_byte(0xFF47, 0xE4);

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    let frame = ppu.framebuffer();
    assert_eq!(frame.len(), FRAME_PIXELS);
    assert_eq!(frame[0], DMG_PALETTE[3]);
    assert_eq!(frame[7], DMG_PALETTE[3]);
    assert_eq!(frame[8], DMG_PALETTE[0]);
    assert_eq!(frame[SCREEN_WIDTH], DMG_PALETTE[1]);
}

#[test]
fn sprite_drawn_over_background() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF40, 0x93);
    mmu.write_byte(0xFF48, 0xE4);
    // tile 2 solid color 2
    for row in 0..8 {
        mmu.vram[32 + row * 2 + 1] = 0xFF;
    }
    mmu.oam[0] = 16 + 4; // screen y 4
    mmu.oam[1] = 8 + 10; // screen x 10
    mmu.oam[2] = 2;
    mmu.oam[3] = 0;

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    let frame = ppu.framebuffer();
    assert_eq!(frame[4 * SCREEN_WIDTH + 10], DMG_PALETTE[2]);
    assert_eq!(frame[4 * SCREEN_WIDTH + 17], DMG_PALETTE[2]);
    assert_eq!(frame[4 * SCREEN_WIDTH + 18], DMG_PALETTE[0]);
    assert_eq!(frame[3 * SCREEN_WIDTH + 10], DMG_PALETTE[0]);
}

#[derive(Clone, Default)]
struct CountingSink(Arc<Mutex<Vec<u32>>>);

impl FrameSink for CountingSink {
    fn present(&mut self, frame: &[u32]) {
        assert_eq!(frame.len(), FRAME_PIXELS);
        self.0.lock().unwrap().push(frame[0]);
    }
}

#[test]
fn display_receives_each_finished_frame() {
    common::init_logger();
    // JR -2
    let mut gb = GameBoy::new(common::program_cart(&[0x18, 0xFE]));
    let sink = CountingSink::default();
    gb.set_display(Box::new(sink.clone()));

    gb.run_frame().unwrap();
    gb.run_frame().unwrap();
    assert_eq!(sink.0.lock().unwrap().len(), 2);
    assert_eq!(gb.ppu.frames(), 2);
    assert_eq!(gb.ppu.mode, 1);
}

#[test]
fn run_frame_returns_with_lcd_off() {
    // LD A,0; LDH (40),A; JR -2
    let mut gb = GameBoy::new(common::program_cart(&[0x3E, 0x00, 0xE0, 0x40, 0x18, 0xFE]));
    let start = gb.cpu.cycles;
    gb.run_frame().unwrap();
    assert_eq!(gb.ppu.frames(), 0);
    assert!(gb.cpu.cycles - start >= CYCLES_PER_FRAME as u64);
}

#[test]
fn sprite_height_change_mid_line_uses_scanned_height() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF40, 0x97); // 8x16 sprites
    mmu.write_byte(0xFF48, 0xE4);
    // row 5 of tile 0 is color 1; with Y-flip it lands on line 10
    mmu.vram[5 * 2] = 0xFF;
    mmu.oam[0] = 16;
    mmu.oam[1] = 8;
    mmu.oam[2] = 0;
    mmu.oam[3] = 0x40;

    ppu.step(&mut mmu, 10 * LINE_CYCLES + 80);
    assert_eq!(ppu.ly, 10);
    assert_eq!(ppu.mode, 3);

    // back to 8x8 while the line is being drawn
    mmu.write_byte(0xFF40, 0x93);
    ppu.step(&mut mmu, 172);
    assert_eq!(ppu.mode, 0);

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    let frame = ppu.framebuffer();
    assert_eq!(frame[10 * SCREEN_WIDTH], DMG_PALETTE[1]);
    assert_eq!(frame[10 * SCREEN_WIDTH + 8], DMG_PALETTE[0]);
}

#[test]
fn behind_background_sprite_only_shows_over_color_zero() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF40, 0x93);
    mmu.write_byte(0xFF47, 0xE4);
    mmu.write_byte(0xFF48, 0xE4);
    // tile 1 solid color 1 as the background of the first 8 columns
    for row in 0..8 {
        mmu.vram[16 + row * 2] = 0xFF;
    }
    mmu.vram[0x1800] = 1;
    // tile 2 solid color 2
    for row in 0..8 {
        mmu.vram[32 + row * 2 + 1] = 0xFF;
    }
    // straddles the color 1 / color 0 boundary at x=8
    mmu.oam[0] = 16;
    mmu.oam[1] = 8 + 4;
    mmu.oam[2] = 2;
    mmu.oam[3] = 0x80;
    // same sprite without the priority bit on row 8
    mmu.oam[4] = 16 + 8;
    mmu.oam[5] = 8 + 4;
    mmu.oam[6] = 2;
    mmu.oam[7] = 0x00;
    mmu.vram[0x1800 + 32] = 1;

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    let frame = ppu.framebuffer();
    assert_eq!(frame[4], DMG_PALETTE[1]);
    assert_eq!(frame[7], DMG_PALETTE[1]);
    assert_eq!(frame[8], DMG_PALETTE[2]);
    assert_eq!(frame[11], DMG_PALETTE[2]);
    assert_eq!(frame[12], DMG_PALETTE[0]);

    let row8 = 8 * SCREEN_WIDTH;
    assert_eq!(frame[row8 + 4], DMG_PALETTE[2]);
    assert_eq!(frame[row8 + 8], DMG_PALETTE[2]);
}

#[test]
fn signed_tile_data_addressing() {
    let (mut ppu, mut mmu) = lcd_on();
    mmu.write_byte(0xFF40, 0x81); // tile data at 0x8800, signed indices
    mmu.write_byte(0xFF47, 0xE4);
    // index 0x80 (-128) is the tile at 0x8800
    mmu.vram[0x0800] = 0xFF;
    mmu.vram[0x0801] = 0xFF;
    // index 0x00 is the tile at 0x9000, not 0x8000
    mmu.vram[0x1000] = 0xFF;
    mmu.vram[0x0000] = 0xFF;
    mmu.vram[0x0001] = 0xFF;
    mmu.vram[0x1800] = 0x80;
    mmu.vram[0x1801] = 0x00;

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    let frame = ppu.framebuffer();
    assert_eq!(frame[0], DMG_PALETTE[3]);
    assert_eq!(frame[8], DMG_PALETTE[1]);
    assert_eq!(frame[SCREEN_WIDTH + 8], DMG_PALETTE[0]);
}

#[test]
fn window_layer_drawn_from_its_own_map() {
    let (mut ppu, mut mmu) = lcd_on();
    // window on with map 0x9C00, BG map 0x9800, unsigned tile data
    mmu.write_byte(0xFF40, 0xF1);
    mmu.write_byte(0xFF47, 0xE4);
    mmu.write_byte(0xFF4A, 8);
    mmu.write_byte(0xFF4B, 7 + 80);
    // tile 1 solid color 3, used only by the window map's first entry
    for i in 16..32 {
        mmu.vram[i] = 0xFF;
    }
    mmu.vram[0x1C00] = 1;

    ppu.step(&mut mmu, CYCLES_PER_FRAME);
    let frame = ppu.framebuffer();
    let at = |x: usize, y: usize| frame[y * SCREEN_WIDTH + x];
    assert_eq!(at(80, 7), DMG_PALETTE[0]);
    assert_eq!(at(79, 8), DMG_PALETTE[0]);
    assert_eq!(at(80, 8), DMG_PALETTE[3]);
    assert_eq!(at(87, 15), DMG_PALETTE[3]);
    assert_eq!(at(88, 8), DMG_PALETTE[0]);
    // the window's own line counter moves to the next map row
    assert_eq!(at(80, 16), DMG_PALETTE[0]);
}

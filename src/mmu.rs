use log::{debug, warn};

use crate::{
    apu::{self, AudioSink, Channel, NullAudio},
    cartridge::Cartridge,
    hardware::DmgRevision,
    timer::Timer,
};

pub const VRAM_SIZE: usize = 0x2000;
pub const WRAM_BANK_SIZE: usize = 0x1000;
pub const OAM_SIZE: usize = 0xA0;
pub const IO_SIZE: usize = 0x80;
pub const HRAM_SIZE: usize = 0x7F;

const DMA_LENGTH: u16 = 0xA0;

// I/O register addresses (gbdev.io/pandocs/Hardware_Reg_List.html)
pub const REG_P1: u16 = 0xFF00;
pub const REG_SB: u16 = 0xFF01;
pub const REG_SC: u16 = 0xFF02;
pub const REG_DIV: u16 = 0xFF04;
pub const REG_IF: u16 = 0xFF0F;
pub const REG_NR52: u16 = 0xFF26;
pub const REG_LCDC: u16 = 0xFF40;
pub const REG_STAT: u16 = 0xFF41;
pub const REG_SCY: u16 = 0xFF42;
pub const REG_SCX: u16 = 0xFF43;
pub const REG_LY: u16 = 0xFF44;
pub const REG_LYC: u16 = 0xFF45;
pub const REG_DMA: u16 = 0xFF46;
pub const REG_BGP: u16 = 0xFF47;
pub const REG_OBP0: u16 = 0xFF48;
pub const REG_OBP1: u16 = 0xFF49;
pub const REG_WY: u16 = 0xFF4A;
pub const REG_WX: u16 = 0xFF4B;
pub const REG_IE: u16 = 0xFFFF;

/// I/O state left behind by the boot ROM (gbdev.io/pandocs/Power_Up_State.html).
const BOOT_IO: &[(u16, u8)] = &[
    (REG_P1, 0xCF),
    (REG_SC, 0x7E),
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1E, 0xBF),
    (0xFF20, 0xFF),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
    (REG_NR52, 0xF1),
    (REG_LCDC, 0x91),
    (REG_STAT, 0x80),
    (REG_BGP, 0xFC),
    (REG_OBP0, 0xFF),
    (REG_OBP1, 0xFF),
];

bitflags::bitflags! {
    /// Interrupt sources in IF/IE bit order, which is also dispatch priority.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Interrupts: u8 {
        const VBLANK = 1 << 0;
        const STAT   = 1 << 1;
        const TIMER  = 1 << 2;
        const SERIAL = 1 << 3;
        const JOYPAD = 1 << 4;
    }
}

impl Interrupts {
    /// Dispatch address of a single interrupt source (gbdev.io/pandocs/Interrupts.html).
    pub fn vector(self) -> u16 {
        0x40 + 8 * self.bits().trailing_zeros() as u16
    }

    /// Highest-priority source in the set.
    pub fn highest(self) -> Option<Interrupts> {
        if self.is_empty() {
            None
        } else {
            Some(Interrupts::from_bits_retain(1 << self.bits().trailing_zeros()))
        }
    }
}

/// The memory bus.
///
/// Owns every RAM region and the I/O register file, and routes cartridge,
/// timer and sound accesses to their owners.
pub struct Mmu {
    pub vram: [u8; VRAM_SIZE],
    pub wram: [[u8; WRAM_BANK_SIZE]; 2],
    pub oam: [u8; OAM_SIZE],
    io: [u8; IO_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub if_reg: Interrupts,
    pub ie_reg: u8,
    pub cart: Option<Cartridge>,
    pub timer: Timer,
    audio: Box<dyn AudioSink>,
}

impl Mmu {
    pub fn new() -> Self {
        Self::new_with_revision(DmgRevision::default())
    }

    pub fn new_with_revision(revision: DmgRevision) -> Self {
        let mut io = [0; IO_SIZE];
        for &(addr, val) in BOOT_IO {
            io[(addr - 0xFF00) as usize] = val;
        }
        Self {
            vram: [0; VRAM_SIZE],
            wram: [[0; WRAM_BANK_SIZE]; 2],
            oam: [0; OAM_SIZE],
            io,
            hram: [0; HRAM_SIZE],
            if_reg: Interrupts::from_bits_retain(0x01),
            ie_reg: 0,
            cart: None,
            timer: Timer::new_with_revision(revision),
            audio: Box::new(NullAudio),
        }
    }

    /// Return to the post-boot state, keeping the cartridge and audio sink.
    pub fn reset(&mut self, revision: DmgRevision) {
        let cart = self.cart.take();
        let audio = std::mem::replace(&mut self.audio, Box::new(NullAudio));
        *self = Self::new_with_revision(revision);
        self.cart = cart;
        self.audio = audio;
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.audio = sink;
    }

    pub fn request_interrupt(&mut self, irq: Interrupts) {
        self.if_reg |= irq;
    }

    /// Interrupts that are both requested and enabled.
    pub fn pending_interrupts(&self) -> Interrupts {
        self.if_reg & Interrupts::from_bits_truncate(self.ie_reg)
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize],
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[1][(addr - 0xD000) as usize],
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize],
            0xF000..=0xFDFF => self.wram[1][(addr - 0xF000) as usize],
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
        }
    }

    /// Write from game code; hardware-fixed bits are preserved.
    pub fn write_byte(&mut self, addr: u16, val: u8) {
        self.write(addr, val, false);
    }

    /// Write on behalf of the bus, with `internal` set for writes made by
    /// other emulated peripherals.
    pub fn write(&mut self, addr: u16, val: u8, internal: bool) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize] = val,
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            0xD000..=0xDFFF => self.wram[1][(addr - 0xD000) as usize] = val,
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize] = val,
            0xF000..=0xFDFF => self.wram[1][(addr - 0xF000) as usize] = val,
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val, internal),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
        }
    }

    /// Advance the timer and merge its interrupt into IF.
    pub fn step_timer(&mut self, cycles: u32) {
        self.timer.step(cycles);
        if self.timer.take_interrupt() {
            self.request_interrupt(Interrupts::TIMER);
        }
    }

    fn io(&self, addr: u16) -> u8 {
        self.io[(addr - 0xFF00) as usize]
    }

    fn io_mut(&mut self, addr: u16) -> &mut u8 {
        &mut self.io[(addr - 0xFF00) as usize]
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            REG_P1 => self.io(addr) | 0xC0,
            REG_SC => self.io(addr) | 0x7E,
            0xFF04..=0xFF07 => self.timer.read(addr),
            REG_IF => self.if_reg.bits() | 0xE0,
            0xFF10..=0xFF26 => self.io(addr) | apu::SOUND_READ_MASK[(addr - 0xFF10) as usize],
            0xFF30..=0xFF3F => self.io(addr),
            REG_STAT => self.io(addr) | 0x80,
            REG_LCDC | REG_SCY..=REG_WX => self.io(addr),
            REG_SB => self.io(addr),
            _ => 0xFF,
        }
    }

    fn write_io(&mut self, addr: u16, val: u8, internal: bool) {
        match addr {
            REG_P1 => {
                let old = self.io(addr);
                *self.io_mut(addr) = if internal {
                    val
                } else {
                    (old & 0xCF) | (val & 0x30)
                };
            }
            0xFF04..=0xFF07 => {
                if addr == REG_DIV && internal {
                    self.timer.div = (val as u16) << 8;
                } else {
                    self.timer.write(addr, val);
                }
            }
            REG_IF => self.if_reg = Interrupts::from_bits_truncate(val),
            REG_NR52 => {
                let old = self.io(addr);
                // channel status bits are read-only for game code
                *self.io_mut(addr) = if internal {
                    val
                } else {
                    (old & 0x0F) | (val & 0x80)
                };
                if !internal {
                    self.forward_sound(addr, val);
                }
            }
            0xFF10..=0xFF25 => {
                *self.io_mut(addr) = val;
                if !internal {
                    self.forward_sound(addr, val);
                }
            }
            REG_STAT => {
                let old = self.io(addr);
                *self.io_mut(addr) = if internal {
                    val
                } else {
                    (old & 0x07) | (val & 0x78)
                };
            }
            REG_LY => {
                if internal {
                    *self.io_mut(addr) = val;
                }
            }
            REG_DMA => {
                *self.io_mut(addr) = val;
                if !internal {
                    self.oam_dma(val);
                }
            }
            _ => *self.io_mut(addr) = val,
        }
    }

    /// Blocking OAM DMA burst from `page * 0x100`.
    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        if base >= 0xE000 {
            warn!("OAM DMA from {base:04X} reads echo/IO space");
        }
        for i in 0..DMA_LENGTH {
            let byte = self.read_byte(base.wrapping_add(i));
            self.oam[i as usize] = byte;
        }
        debug!("OAM DMA from {base:04X}");
    }

    fn forward_sound(&mut self, addr: u16, val: u8) {
        if addr == REG_NR52 {
            self.audio.power(val & 0x80 != 0);
            return;
        }
        if addr == 0xFF10 {
            self.audio.sweep(val);
            return;
        }
        let Some((channel, reg)) = apu::channel_register(addr) else {
            return;
        };
        let base = addr - reg;
        match reg {
            1 => {
                let length = match channel {
                    Channel::Wave => val,
                    _ => val & 0x3F,
                };
                self.audio.reload_length(channel, length);
            }
            2 => self.audio.envelope(channel, val),
            3 | 4 => {
                if channel == Channel::Noise {
                    if reg == 3 {
                        self.audio.frequency(channel, val as u16);
                    }
                } else {
                    let lo = self.io(base + 3) as u16;
                    let hi = (self.io(base + 4) & 0x07) as u16;
                    self.audio.frequency(channel, (hi << 8) | lo);
                }
                if reg == 4 && val & 0x80 != 0 {
                    self.audio.trigger(channel);
                }
            }
            _ => {}
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

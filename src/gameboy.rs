use std::path::Path;

use log::info;
use thiserror::Error;

use crate::{
    cartridge::{Cartridge, CartridgeError},
    cpu::{Cpu, CpuError},
    hardware::DmgRevision,
    input::Joypad,
    mmu::Mmu,
    ppu::{FrameSink, Ppu},
    serial::Serial,
};

/// T-cycles in one full frame of 154 lines.
pub const CYCLES_PER_FRAME: u32 = 70224;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub ppu: Ppu,
    pub serial: Serial,
    pub joypad: Joypad,
    pub dmg_revision: DmgRevision,
    display: Option<Box<dyn FrameSink>>,
}

impl GameBoy {
    pub fn new(cart: Cartridge) -> Self {
        Self::new_with_revision(cart, DmgRevision::default())
    }

    pub fn new_with_revision(cart: Cartridge, dmg_revision: DmgRevision) -> Self {
        let mut mmu = Mmu::new_with_revision(dmg_revision);
        mmu.load_cart(cart);
        Self {
            cpu: Cpu::new_with_revision(dmg_revision),
            mmu,
            ppu: Ppu::new(),
            serial: Serial::new(),
            joypad: Joypad::new(),
            dmg_revision,
            display: None,
        }
    }

    /// Load a ROM (and battery save, if any) and build a machine around it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let cart = Cartridge::from_file(path)?;
        Ok(Self::new(cart))
    }

    /// Reset to the post-boot state while keeping the loaded cartridge and
    /// the attached audio sink.
    pub fn reset(&mut self) {
        self.cpu = Cpu::new_with_revision(self.dmg_revision);
        self.mmu.reset(self.dmg_revision);
        self.ppu = Ppu::new();
        self.serial = Serial::new();
        if let Some(cart) = &self.mmu.cart {
            info!("Reset with {}", cart.title());
        }
    }

    /// Attach the display that receives every finished frame.
    pub fn set_display(&mut self, sink: Box<dyn FrameSink>) {
        self.display = Some(sink);
    }

    /// Run one CPU step and advance every peripheral by the cycles it took.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        let cycles = self.cpu.step(&mut self.mmu)?;
        if self.ppu.step(&mut self.mmu, cycles)
            && let Some(display) = self.display.as_mut()
        {
            display.present(self.ppu.framebuffer());
        }
        self.mmu.step_timer(cycles);
        self.serial.step(&mut self.mmu, cycles);
        self.joypad.update(&mut self.mmu);
        Ok(cycles)
    }

    /// Step until at least `cycles` T-cycles have elapsed. Returns the
    /// number actually run.
    pub fn run_cycles(&mut self, cycles: u64) -> Result<u64, CpuError> {
        let mut elapsed = 0u64;
        while elapsed < cycles {
            elapsed += self.step()? as u64;
        }
        Ok(elapsed)
    }

    /// Step until the pixel engine finishes a frame. With the LCD off this
    /// returns after one frame's worth of cycles.
    pub fn run_frame(&mut self) -> Result<(), CpuError> {
        let start = self.ppu.frames();
        let mut elapsed = 0u32;
        while self.ppu.frames() == start {
            elapsed += self.step()?;
            if !self.ppu.lcd_on() && elapsed >= CYCLES_PER_FRAME {
                break;
            }
        }
        Ok(())
    }

    /// Flush battery-backed RAM to disk.
    pub fn save_ram(&self) -> std::io::Result<()> {
        match &self.mmu.cart {
            Some(cart) => cart.save_ram(),
            None => Ok(()),
        }
    }
}

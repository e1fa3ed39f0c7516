//! Original Game Boy (DMG) emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/MMU/PPU/timer
//! and cartridge banking). Frontends supply a [`ppu::FrameSink`] for finished
//! frames and an [`apu::AudioSink`] for sound register traffic, and drive the
//! core through the [`gameboy`] facade.

/// Sound register forwarding to an external synthesizer.
pub mod apu;

/// Cartridge header parsing, bank controllers (MBC) and battery RAM.
pub mod cartridge;

/// SM83 CPU interpreter.
pub mod cpu;

/// High-level facade that wires the CPU, bus and peripherals into a single machine.
pub mod gameboy;

/// Hardware revisions and revision-specific boot state.
pub mod hardware;

/// Joypad matrix and edge-triggered interrupt behavior.
pub mod input;

/// Memory map, I/O registers and interrupt plumbing.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Serial shift register.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

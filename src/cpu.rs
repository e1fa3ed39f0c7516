use log::error;
use thiserror::Error;

use crate::hardware::DmgRevision;
use crate::mmu::{Interrupts, Mmu};

mod alu;
mod opcodes;

use opcodes::{CB_OPCODES, Dispatch, OPCODES};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

const DMG0_BOOT_AF: u16 = 0x0100;
const DMG0_BOOT_BC: u16 = 0xFF13;
const DMG0_BOOT_DE: u16 = 0x00C1;
const DMG0_BOOT_HL: u16 = 0x8403;

const DMG_ABC_BOOT_AF: u16 = 0x01B0;
const DMG_ABC_BOOT_BC: u16 = 0x0013;
const DMG_ABC_BOOT_DE: u16 = 0x00D8;
const DMG_ABC_BOOT_HL: u16 = 0x014D;

/// Cycles charged for pushing PC and jumping to an interrupt vector.
const INTERRUPT_CYCLES: u32 = 20;
/// Cycles charged per step while HALT or STOP holds the CPU.
const IDLE_CYCLES: u32 = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    #[error("unimplemented opcode {opcode:02X} at PC={addr:04X}")]
    UnimplementedOpcode { opcode: u8, addr: u16 },
}

pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    /// Elapsed T-cycles since power on.
    pub cycles: u64,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    /// Set by HALT when it fails to halt; the next fetch does not advance PC
    halt_bug: bool,
    /// EI was executed; IME turns on once the following instruction retires
    ime_pending: bool,
    /// Fatal decode error; every later step reports it again
    locked: Option<CpuError>,
}

impl Cpu {
    pub fn new() -> Self {
        Self::new_with_revision(DmgRevision::default())
    }

    /// Create a CPU initialized to the post-boot register state of the given
    /// DMG hardware revision.
    pub fn new_with_revision(revision: DmgRevision) -> Self {
        let (af, bc, de, hl) = if revision.is_rev0() {
            (DMG0_BOOT_AF, DMG0_BOOT_BC, DMG0_BOOT_DE, DMG0_BOOT_HL)
        } else {
            (DMG_ABC_BOOT_AF, DMG_ABC_BOOT_BC, DMG_ABC_BOOT_DE, DMG_ABC_BOOT_HL)
        };
        let mut cpu = Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            pc: BOOT_PC,
            sp: BOOT_SP,
            cycles: 0,
            ime: false,
            halted: false,
            stopped: false,
            halt_bug: false,
            ime_pending: false,
            locked: None,
        };
        cpu.set_af(af);
        cpu.set_bc(bc);
        cpu.set_de(de);
        cpu.set_hl(hl);
        cpu
    }

    pub fn get_af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }

    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = (val as u8) & 0xF0;
    }

    pub fn get_bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn get_de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn get_hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    #[inline]
    pub fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    /// Whether an EI is waiting for the next instruction to retire.
    pub fn ime_pending(&self) -> bool {
        self.ime_pending
    }

    /// The fatal error the CPU stopped on, if any.
    pub fn locked(&self) -> Option<CpuError> {
        self.locked
    }

    /// Execute one instruction (or one idle slot while halted), then service
    /// interrupts. Returns the T-cycles consumed.
    pub fn step(&mut self, mmu: &mut Mmu) -> Result<u32, CpuError> {
        if let Some(err) = self.locked {
            return Err(err);
        }

        let mut elapsed = if self.stopped {
            if mmu.if_reg.contains(Interrupts::JOYPAD) {
                self.stopped = false;
            }
            IDLE_CYCLES
        } else if self.halted {
            IDLE_CYCLES
        } else {
            self.execute(mmu)?
        };

        if !self.stopped {
            elapsed += self.handle_interrupts(mmu);
        }
        self.cycles += elapsed as u64;
        Ok(elapsed)
    }

    fn execute(&mut self, mmu: &mut Mmu) -> Result<u32, CpuError> {
        let addr = self.pc;
        let opcode = self.fetch_opcode(mmu);
        let enable_after = self.ime_pending;

        let cycles = match OPCODES[opcode as usize] {
            Dispatch::Execute(op) => {
                #[cfg(feature = "cpu-trace")]
                log::trace!("{addr:04X}: {opcode:02X} {}", op.mnemonic);
                if (op.exec)(self, mmu, opcode) {
                    op.taken_cycles
                } else {
                    op.cycles
                }
            }
            Dispatch::PrefixCb => {
                let cb = self.fetch8(mmu);
                let op = CB_OPCODES[cb as usize];
                #[cfg(feature = "cpu-trace")]
                log::trace!("{addr:04X}: CB {cb:02X} {}", op.mnemonic);
                (op.exec)(self, mmu, cb);
                op.cycles
            }
            Dispatch::Illegal => {
                let err = CpuError::UnimplementedOpcode { opcode, addr };
                error!("{err}");
                self.locked = Some(err);
                return Err(err);
            }
        };

        if enable_after && self.ime_pending {
            self.ime = true;
            self.ime_pending = false;
        }
        Ok(cycles as u32)
    }

    /// Wake from HALT on any requested-and-enabled interrupt and, when IME is
    /// set, dispatch the highest-priority one.
    fn handle_interrupts(&mut self, mmu: &mut Mmu) -> u32 {
        let Some(irq) = mmu.pending_interrupts().highest() else {
            return 0;
        };
        self.halted = false;
        if !self.ime {
            return 0;
        }
        self.ime = false;
        self.ime_pending = false;
        mmu.if_reg.remove(irq);
        let pc = self.pc;
        self.push_stack(mmu, pc);
        self.pc = irq.vector();
        INTERRUPT_CYCLES
    }

    fn fetch_opcode(&mut self, mmu: &Mmu) -> u8 {
        let opcode = mmu.read_byte(self.pc);
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.pc = self.pc.wrapping_add(1);
        }
        opcode
    }

    pub(crate) fn fetch8(&mut self, mmu: &Mmu) -> u8 {
        let val = mmu.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    pub(crate) fn fetch16(&mut self, mmu: &Mmu) -> u16 {
        let lo = self.fetch8(mmu) as u16;
        let hi = self.fetch8(mmu) as u16;
        (hi << 8) | lo
    }

    pub fn push_stack(&mut self, mmu: &mut Mmu, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, val as u8);
    }

    pub fn pop_stack(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = mmu.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = mmu.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// Read an 8-bit operand by its 3-bit encoding: B, C, D, E, H, L, (HL), A.
    pub(crate) fn read_reg(&self, mmu: &Mmu, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => mmu.read_byte(self.get_hl()),
            _ => self.a,
        }
    }

    pub(crate) fn write_reg(&mut self, mmu: &mut Mmu, index: u8, val: u8) {
        match index & 0x07 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => mmu.write_byte(self.get_hl(), val),
            _ => self.a = val,
        }
    }

    /// 16-bit register by its 2-bit encoding: BC, DE, HL, SP.
    pub(crate) fn read_pair(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.get_bc(),
            1 => self.get_de(),
            2 => self.get_hl(),
            _ => self.sp,
        }
    }

    pub(crate) fn write_pair(&mut self, index: u8, val: u16) {
        match index & 0x03 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    /// Branch condition encoded in bits 3-4: NZ, Z, NC, C.
    pub(crate) fn condition(&self, opcode: u8) -> bool {
        match (opcode >> 3) & 0x03 {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

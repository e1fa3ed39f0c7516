//! Table-driven instruction decode.
//!
//! `OPCODES` maps every first byte to a handler plus its cost in T-cycles.
//! 0xCB redirects to `CB_OPCODES`. Handlers that share an encoding pattern
//! decode their operands from the opcode byte they are called with, and
//! return whether a conditional branch was taken.

use super::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};
use crate::mmu::{Mmu, REG_DIV};

pub(crate) type Handler = fn(&mut Cpu, &mut Mmu, u8) -> bool;

#[derive(Clone, Copy)]
pub(crate) struct Opcode {
    #[cfg_attr(not(feature = "cpu-trace"), allow(dead_code))]
    pub mnemonic: &'static str,
    /// Cost when not branching.
    pub cycles: u8,
    /// Cost when a conditional branch is taken.
    pub taken_cycles: u8,
    pub exec: Handler,
}

#[derive(Clone, Copy)]
pub(crate) enum Dispatch {
    Execute(Opcode),
    PrefixCb,
    Illegal,
}

const fn entry(mnemonic: &'static str, cycles: u8, exec: Handler) -> Dispatch {
    branch(mnemonic, cycles, cycles, exec)
}

const fn branch(mnemonic: &'static str, cycles: u8, taken_cycles: u8, exec: Handler) -> Dispatch {
    Dispatch::Execute(Opcode {
        mnemonic,
        cycles,
        taken_cycles,
        exec,
    })
}

/// Operand index 6 addresses (HL) and costs an extra memory access.
const fn uses_hl(index: u8) -> bool {
    index & 0x07 == 6
}

const fn decode(opcode: u8) -> Dispatch {
    match opcode {
        0x00 => entry("NOP", 4, nop),
        0x10 => entry("STOP", 4, stop),
        0x76 => entry("HALT", 4, halt),
        0xCB => Dispatch::PrefixCb,
        0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
            Dispatch::Illegal
        }

        0x01 | 0x11 | 0x21 | 0x31 => entry("LD rr,d16", 12, ld_rr_d16),
        0x02 | 0x12 | 0x22 | 0x32 => entry("LD (rr),A", 8, ld_ind_a),
        0x0A | 0x1A | 0x2A | 0x3A => entry("LD A,(rr)", 8, ld_a_ind),
        0x03 | 0x13 | 0x23 | 0x33 => entry("INC rr", 8, inc_rr),
        0x0B | 0x1B | 0x2B | 0x3B => entry("DEC rr", 8, dec_rr),
        0x09 | 0x19 | 0x29 | 0x39 => entry("ADD HL,rr", 8, add_hl_rr),
        0x34 => entry("INC (HL)", 12, inc_r),
        0x35 => entry("DEC (HL)", 12, dec_r),
        0x36 => entry("LD (HL),d8", 12, ld_r_d8),
        _ if opcode & 0xC7 == 0x04 => entry("INC r", 4, inc_r),
        _ if opcode & 0xC7 == 0x05 => entry("DEC r", 4, dec_r),
        _ if opcode & 0xC7 == 0x06 => entry("LD r,d8", 8, ld_r_d8),
        0x07 | 0x0F | 0x17 | 0x1F => entry("RxA", 4, rotate_a),
        0x08 => entry("LD (a16),SP", 20, ld_a16_sp),
        0x18 => entry("JR r8", 12, jr),
        0x20 | 0x28 | 0x30 | 0x38 => branch("JR cc,r8", 8, 12, jr_cc),
        0x27 => entry("DAA", 4, daa),
        0x2F => entry("CPL", 4, cpl),
        0x37 => entry("SCF", 4, scf),
        0x3F => entry("CCF", 4, ccf),

        0x40..=0x7F => {
            if uses_hl(opcode) || uses_hl(opcode >> 3) {
                entry("LD r,r", 8, ld_r_r)
            } else {
                entry("LD r,r", 4, ld_r_r)
            }
        }
        0x80..=0xBF => {
            if uses_hl(opcode) {
                entry("ALU A,(HL)", 8, alu_r)
            } else {
                entry("ALU A,r", 4, alu_r)
            }
        }

        0xC0 | 0xC8 | 0xD0 | 0xD8 => branch("RET cc", 8, 20, ret_cc),
        0xC1 | 0xD1 | 0xE1 | 0xF1 => entry("POP rr", 12, pop),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => entry("PUSH rr", 16, push),
        0xC2 | 0xCA | 0xD2 | 0xDA => branch("JP cc,a16", 12, 16, jp_cc),
        0xC4 | 0xCC | 0xD4 | 0xDC => branch("CALL cc,a16", 12, 24, call_cc),
        0xC3 => entry("JP a16", 16, jp),
        0xC9 => entry("RET", 16, ret),
        0xD9 => entry("RETI", 16, reti),
        0xCD => entry("CALL a16", 24, call),
        _ if opcode & 0xC7 == 0xC6 => entry("ALU A,d8", 8, alu_d8),
        _ if opcode & 0xC7 == 0xC7 => entry("RST", 16, rst),

        0xE0 => entry("LDH (a8),A", 12, ldh_a8_a),
        0xF0 => entry("LDH A,(a8)", 12, ldh_a_a8),
        0xE2 => entry("LD (C),A", 8, ld_c_a),
        0xF2 => entry("LD A,(C)", 8, ld_a_c),
        0xEA => entry("LD (a16),A", 16, ld_a16_a),
        0xFA => entry("LD A,(a16)", 16, ld_a_a16),
        0xE8 => entry("ADD SP,r8", 16, add_sp_e8),
        0xF8 => entry("LD HL,SP+r8", 12, ld_hl_sp_e8),
        0xF9 => entry("LD SP,HL", 8, ld_sp_hl),
        0xE9 => entry("JP HL", 4, jp_hl),
        0xF3 => entry("DI", 4, di),
        0xFB => entry("EI", 4, ei),
        _ => Dispatch::Illegal,
    }
}

const fn decode_cb(opcode: u8) -> Opcode {
    let (mnemonic, exec, reg_cycles, hl_cycles): (&'static str, Handler, u8, u8) =
        match opcode >> 6 {
            0 => ("SHIFT r", cb_shift, 8, 16),
            1 => ("BIT b,r", cb_bit, 8, 12),
            2 => ("RES b,r", cb_res, 8, 16),
            _ => ("SET b,r", cb_set, 8, 16),
        };
    Opcode {
        mnemonic,
        cycles: if uses_hl(opcode) { hl_cycles } else { reg_cycles },
        taken_cycles: if uses_hl(opcode) { hl_cycles } else { reg_cycles },
        exec,
    }
}

pub(crate) static OPCODES: [Dispatch; 256] = {
    let mut table = [Dispatch::Illegal; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode(i as u8);
        i += 1;
    }
    table
};

pub(crate) static CB_OPCODES: [Opcode; 256] = {
    let mut table = [decode_cb(0); 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode_cb(i as u8);
        i += 1;
    }
    table
};

// ------------------------------------------
// Loads
// ------------------------------------------

fn ld_rr_d16(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.fetch16(mmu);
    cpu.write_pair(opcode >> 4, val);
    false
}

/// Address for the (BC), (DE), (HL+), (HL-) forms, applying the HL step.
fn indirect_addr(cpu: &mut Cpu, opcode: u8) -> u16 {
    match (opcode >> 4) & 0x03 {
        0 => cpu.get_bc(),
        1 => cpu.get_de(),
        2 => {
            let hl = cpu.get_hl();
            cpu.set_hl(hl.wrapping_add(1));
            hl
        }
        _ => {
            let hl = cpu.get_hl();
            cpu.set_hl(hl.wrapping_sub(1));
            hl
        }
    }
}

fn ld_ind_a(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let addr = indirect_addr(cpu, opcode);
    mmu.write_byte(addr, cpu.a);
    false
}

fn ld_a_ind(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let addr = indirect_addr(cpu, opcode);
    cpu.a = mmu.read_byte(addr);
    false
}

fn ld_r_d8(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.fetch8(mmu);
    cpu.write_reg(mmu, opcode >> 3, val);
    false
}

fn ld_r_r(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_reg(mmu, opcode);
    cpu.write_reg(mmu, opcode >> 3, val);
    false
}

fn ld_a16_sp(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let addr = cpu.fetch16(mmu);
    mmu.write_byte(addr, cpu.sp as u8);
    mmu.write_byte(addr.wrapping_add(1), (cpu.sp >> 8) as u8);
    false
}

fn ldh_a8_a(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let addr = 0xFF00 | cpu.fetch8(mmu) as u16;
    mmu.write_byte(addr, cpu.a);
    false
}

fn ldh_a_a8(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let addr = 0xFF00 | cpu.fetch8(mmu) as u16;
    cpu.a = mmu.read_byte(addr);
    false
}

fn ld_c_a(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    mmu.write_byte(0xFF00 | cpu.c as u16, cpu.a);
    false
}

fn ld_a_c(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.a = mmu.read_byte(0xFF00 | cpu.c as u16);
    false
}

fn ld_a16_a(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let addr = cpu.fetch16(mmu);
    mmu.write_byte(addr, cpu.a);
    false
}

fn ld_a_a16(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let addr = cpu.fetch16(mmu);
    cpu.a = mmu.read_byte(addr);
    false
}

fn ld_hl_sp_e8(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let offset = cpu.fetch8(mmu);
    let val = cpu.sp_offset(offset);
    cpu.set_hl(val);
    false
}

fn ld_sp_hl(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.sp = cpu.get_hl();
    false
}

fn pop(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.pop_stack(mmu);
    match (opcode >> 4) & 0x03 {
        3 => cpu.set_af(val),
        index => cpu.write_pair(index, val),
    }
    false
}

fn push(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = match (opcode >> 4) & 0x03 {
        3 => cpu.get_af(),
        index => cpu.read_pair(index),
    };
    cpu.push_stack(mmu, val);
    false
}

// ------------------------------------------
// Arithmetic
// ------------------------------------------

fn inc_rr(cpu: &mut Cpu, _mmu: &mut Mmu, opcode: u8) -> bool {
    let index = opcode >> 4;
    let val = cpu.read_pair(index).wrapping_add(1);
    cpu.write_pair(index, val);
    false
}

fn dec_rr(cpu: &mut Cpu, _mmu: &mut Mmu, opcode: u8) -> bool {
    let index = opcode >> 4;
    let val = cpu.read_pair(index).wrapping_sub(1);
    cpu.write_pair(index, val);
    false
}

fn add_hl_rr(cpu: &mut Cpu, _mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_pair(opcode >> 4);
    cpu.add_hl(val);
    false
}

fn inc_r(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let index = opcode >> 3;
    let val = cpu.read_reg(mmu, index);
    let res = cpu.inc8(val);
    cpu.write_reg(mmu, index, res);
    false
}

fn dec_r(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let index = opcode >> 3;
    let val = cpu.read_reg(mmu, index);
    let res = cpu.dec8(val);
    cpu.write_reg(mmu, index, res);
    false
}

fn alu_r(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_reg(mmu, opcode);
    cpu.alu_op(opcode >> 3, val);
    false
}

fn alu_d8(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.fetch8(mmu);
    cpu.alu_op(opcode >> 3, val);
    false
}

fn add_sp_e8(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let offset = cpu.fetch8(mmu);
    cpu.sp = cpu.sp_offset(offset);
    false
}

fn daa(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.daa();
    false
}

fn cpl(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.a = !cpu.a;
    cpu.f |= FLAG_N | FLAG_H;
    false
}

fn scf(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.f = (cpu.f & FLAG_Z) | FLAG_C;
    false
}

fn ccf(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.f = (cpu.f & (FLAG_Z | FLAG_C)) ^ FLAG_C;
    false
}

/// RLCA, RRCA, RLA, RRA: the CB rotates on A with Z forced clear.
fn rotate_a(cpu: &mut Cpu, _mmu: &mut Mmu, opcode: u8) -> bool {
    cpu.a = cpu.shift_op(opcode >> 3, cpu.a);
    cpu.f &= !FLAG_Z;
    false
}

// ------------------------------------------
// Control flow
// ------------------------------------------

fn jr(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let offset = cpu.fetch8(mmu) as i8;
    cpu.pc = cpu.pc.wrapping_add(offset as u16);
    true
}

fn jr_cc(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let offset = cpu.fetch8(mmu) as i8;
    if !cpu.condition(opcode) {
        return false;
    }
    cpu.pc = cpu.pc.wrapping_add(offset as u16);
    true
}

fn jp(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.pc = cpu.fetch16(mmu);
    true
}

fn jp_cc(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let addr = cpu.fetch16(mmu);
    if !cpu.condition(opcode) {
        return false;
    }
    cpu.pc = addr;
    true
}

fn jp_hl(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.pc = cpu.get_hl();
    true
}

fn call(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    let addr = cpu.fetch16(mmu);
    let ret = cpu.pc;
    cpu.push_stack(mmu, ret);
    cpu.pc = addr;
    true
}

fn call_cc(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let addr = cpu.fetch16(mmu);
    if !cpu.condition(opcode) {
        return false;
    }
    let ret = cpu.pc;
    cpu.push_stack(mmu, ret);
    cpu.pc = addr;
    true
}

fn ret(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.pc = cpu.pop_stack(mmu);
    true
}

fn ret_cc(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    if !cpu.condition(opcode) {
        return false;
    }
    cpu.pc = cpu.pop_stack(mmu);
    true
}

fn reti(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.pc = cpu.pop_stack(mmu);
    cpu.ime = true;
    true
}

fn rst(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let ret = cpu.pc;
    cpu.push_stack(mmu, ret);
    cpu.pc = (opcode & 0x38) as u16;
    true
}

// ------------------------------------------
// CPU control
// ------------------------------------------

fn nop(_cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    false
}

fn halt(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    if !cpu.ime && !mmu.pending_interrupts().is_empty() {
        // HALT bug: no halt, and the next opcode byte is fetched twice
        cpu.halt_bug = true;
    } else {
        cpu.halted = true;
    }
    false
}

fn stop(cpu: &mut Cpu, mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.fetch8(mmu);
    mmu.write_byte(REG_DIV, 0);
    cpu.stopped = true;
    false
}

fn di(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    cpu.ime = false;
    cpu.ime_pending = false;
    false
}

fn ei(cpu: &mut Cpu, _mmu: &mut Mmu, _opcode: u8) -> bool {
    if !cpu.ime {
        cpu.ime_pending = true;
    }
    false
}

// ------------------------------------------
// 0xCB prefix
// ------------------------------------------

fn cb_shift(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_reg(mmu, opcode);
    let res = cpu.shift_op(opcode >> 3, val);
    cpu.write_reg(mmu, opcode, res);
    false
}

fn cb_bit(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_reg(mmu, opcode);
    cpu.bit((opcode >> 3) & 0x07, val);
    false
}

fn cb_res(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_reg(mmu, opcode);
    cpu.write_reg(mmu, opcode, val & !(1 << ((opcode >> 3) & 0x07)));
    false
}

fn cb_set(cpu: &mut Cpu, mmu: &mut Mmu, opcode: u8) -> bool {
    let val = cpu.read_reg(mmu, opcode);
    cpu.write_reg(mmu, opcode, val | (1 << ((opcode >> 3) & 0x07)));
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const ILLEGAL: [u8; 11] = [
        0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
    ];

    #[test]
    fn only_documented_holes_are_illegal() {
        for op in 0..=0xFFu8 {
            let illegal = matches!(OPCODES[op as usize], Dispatch::Illegal);
            assert_eq!(illegal, ILLEGAL.contains(&op), "opcode {op:02X}");
        }
        assert!(matches!(OPCODES[0xCB], Dispatch::PrefixCb));
    }

    fn cost(op: u8) -> (u8, u8) {
        match OPCODES[op as usize] {
            Dispatch::Execute(o) => (o.cycles, o.taken_cycles),
            _ => panic!("opcode {op:02X} has no handler"),
        }
    }

    #[test]
    fn spot_check_cycle_costs() {
        assert_eq!(cost(0x00), (4, 4));
        assert_eq!(cost(0x3E), (8, 8));
        assert_eq!(cost(0x3C), (4, 4));
        assert_eq!(cost(0x34), (12, 12));
        assert_eq!(cost(0x46), (8, 8));
        assert_eq!(cost(0x70), (8, 8));
        assert_eq!(cost(0x86), (8, 8));
        assert_eq!(cost(0xC3), (16, 16));
        assert_eq!(cost(0x20), (8, 12));
        assert_eq!(cost(0xC2), (12, 16));
        assert_eq!(cost(0xC4), (12, 24));
        assert_eq!(cost(0xC0), (8, 20));
        assert_eq!(cost(0xFF), (16, 16));
        assert_eq!(cost(0xFE), (8, 8));
        assert_eq!(cost(0x08), (20, 20));
        assert_eq!(cost(0xE8), (16, 16));
    }

    #[test]
    fn cb_costs_depend_on_operand() {
        assert_eq!(CB_OPCODES[0x00].cycles, 8);
        assert_eq!(CB_OPCODES[0x06].cycles, 16);
        assert_eq!(CB_OPCODES[0x46].cycles, 12);
        assert_eq!(CB_OPCODES[0x86].cycles, 16);
        assert_eq!(CB_OPCODES[0xFE].cycles, 16);
        assert_eq!(CB_OPCODES[0x7F].cycles, 8);
    }
}

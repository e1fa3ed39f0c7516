//! Arithmetic, logic and bit-shift primitives with their flag rules.

use super::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

#[inline]
fn zero(val: u8) -> u8 {
    if val == 0 { FLAG_Z } else { 0 }
}

impl Cpu {
    /// Apply one of the eight accumulator operations selected by bits 3-5 of
    /// the 0x80-0xBF and 0xC6-0xFE opcode groups.
    pub(crate) fn alu_op(&mut self, op: u8, val: u8) {
        match op & 0x07 {
            0 => self.add8(val, false),
            1 => self.add8(val, true),
            2 => self.a = self.sub8(val, false),
            3 => self.a = self.sub8(val, true),
            4 => {
                self.a &= val;
                self.f = zero(self.a) | FLAG_H;
            }
            5 => {
                self.a ^= val;
                self.f = zero(self.a);
            }
            6 => {
                self.a |= val;
                self.f = zero(self.a);
            }
            _ => {
                self.sub8(val, false);
            }
        }
    }

    fn add8(&mut self, val: u8, with_carry: bool) {
        let carry = (with_carry && self.flag(FLAG_C)) as u8;
        let a = self.a;
        let res = a.wrapping_add(val).wrapping_add(carry);
        let mut f = zero(res);
        if (a & 0x0F) + (val & 0x0F) + carry > 0x0F {
            f |= FLAG_H;
        }
        if a as u16 + val as u16 + carry as u16 > 0xFF {
            f |= FLAG_C;
        }
        self.a = res;
        self.f = f;
    }

    /// Subtract from A, set flags and return the difference without storing it.
    fn sub8(&mut self, val: u8, with_carry: bool) -> u8 {
        let carry = (with_carry && self.flag(FLAG_C)) as u8;
        let a = self.a;
        let res = a.wrapping_sub(val).wrapping_sub(carry);
        let mut f = zero(res) | FLAG_N;
        if (a & 0x0F) < (val & 0x0F) + carry {
            f |= FLAG_H;
        }
        if (a as u16) < val as u16 + carry as u16 {
            f |= FLAG_C;
        }
        self.f = f;
        res
    }

    pub(crate) fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        let mut f = (self.f & FLAG_C) | zero(res);
        if val & 0x0F == 0x0F {
            f |= FLAG_H;
        }
        self.f = f;
        res
    }

    pub(crate) fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        let mut f = (self.f & FLAG_C) | FLAG_N | zero(res);
        if val & 0x0F == 0 {
            f |= FLAG_H;
        }
        self.f = f;
        res
    }

    pub(crate) fn add_hl(&mut self, val: u16) {
        let hl = self.get_hl();
        let res = hl.wrapping_add(val);
        let mut f = self.f & FLAG_Z;
        if (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF {
            f |= FLAG_H;
        }
        if hl as u32 + val as u32 > 0xFFFF {
            f |= FLAG_C;
        }
        self.set_hl(res);
        self.f = f;
    }

    /// SP plus a signed offset, as used by `ADD SP,e8` and `LD HL,SP+e8`.
    /// Flags come from the unsigned add of the low byte.
    pub(crate) fn sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let val = offset as i8 as i16 as u16;
        let mut f = 0;
        if (sp & 0x0F) + (val & 0x0F) > 0x0F {
            f |= FLAG_H;
        }
        if (sp & 0xFF) + (val & 0xFF) > 0xFF {
            f |= FLAG_C;
        }
        self.f = f;
        sp.wrapping_add(val)
    }

    pub(crate) fn daa(&mut self) {
        let mut a = self.a;
        let mut correction = 0u8;
        let mut carry = false;
        if self.flag(FLAG_H) || (!self.flag(FLAG_N) && (a & 0x0F) > 0x09) {
            correction |= 0x06;
        }
        if self.flag(FLAG_C) || (!self.flag(FLAG_N) && a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        a = if self.flag(FLAG_N) {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        self.a = a;
        self.f = zero(a) | (self.f & FLAG_N) | if carry { FLAG_C } else { 0 };
    }

    /// Rotate/shift selected by bits 3-5 of a CB opcode: RLC, RRC, RL, RR,
    /// SLA, SRA, SWAP, SRL.
    pub(crate) fn shift_op(&mut self, op: u8, val: u8) -> u8 {
        let carry_in = self.flag(FLAG_C) as u8;
        let (res, carry) = match op & 0x07 {
            0 => (val.rotate_left(1), val & 0x80 != 0),
            1 => (val.rotate_right(1), val & 0x01 != 0),
            2 => ((val << 1) | carry_in, val & 0x80 != 0),
            3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            4 => (val << 1, val & 0x80 != 0),
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => (val.rotate_left(4), false),
            _ => (val >> 1, val & 0x01 != 0),
        };
        self.f = zero(res) | if carry { FLAG_C } else { 0 };
        res
    }

    pub(crate) fn bit(&mut self, bit: u8, val: u8) {
        let mut f = (self.f & FLAG_C) | FLAG_H;
        if val & (1 << bit) == 0 {
            f |= FLAG_Z;
        }
        self.f = f;
    }
}

use crate::mmu::{Interrupts, Mmu, REG_P1};

bitflags::bitflags! {
    /// Host-side button state. The low nibble is the direction group, the high
    /// nibble the action group, each in P1 line order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Buttons: u8 {
        const RIGHT  = 1 << 0;
        const LEFT   = 1 << 1;
        const UP     = 1 << 2;
        const DOWN   = 1 << 3;
        const A      = 1 << 4;
        const B      = 1 << 5;
        const SELECT = 1 << 6;
        const START  = 1 << 7;
    }
}

/// Joypad matrix feeding P1 (0xFF00).
///
/// Lines are active low. A line going from high to low raises the joypad
/// interrupt.
pub struct Joypad {
    pressed: Buttons,
    lines: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            pressed: Buttons::empty(),
            lines: 0x0F,
        }
    }

    pub fn press(&mut self, buttons: Buttons) {
        self.pressed |= buttons;
    }

    pub fn release(&mut self, buttons: Buttons) {
        self.pressed &= !buttons;
    }

    pub fn pressed(&self) -> Buttons {
        self.pressed
    }

    /// Drive the P1 input lines from the current button state and the
    /// selection bits last written by the game.
    pub fn update(&mut self, mmu: &mut Mmu) {
        let select = mmu.read_byte(REG_P1) & 0x30;
        let mut lines = 0x0F;
        if select & 0x10 == 0 {
            lines &= !(self.pressed.bits() & 0x0F);
        }
        if select & 0x20 == 0 {
            lines &= !(self.pressed.bits() >> 4);
        }
        if self.lines & !lines & 0x0F != 0 {
            mmu.request_interrupt(Interrupts::JOYPAD);
        }
        self.lines = lines;
        mmu.write(REG_P1, 0xC0 | select | lines, true);
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_group_pulls_lines_low() {
        let mut mmu = Mmu::new();
        let mut pad = Joypad::new();
        pad.press(Buttons::START | Buttons::LEFT);

        mmu.write_byte(REG_P1, 0x10); // action keys
        pad.update(&mut mmu);
        assert_eq!(mmu.read_byte(REG_P1) & 0x0F, 0x07);

        mmu.write_byte(REG_P1, 0x20); // direction keys
        pad.update(&mut mmu);
        assert_eq!(mmu.read_byte(REG_P1) & 0x0F, 0x0D);

        mmu.write_byte(REG_P1, 0x30);
        pad.update(&mut mmu);
        assert_eq!(mmu.read_byte(REG_P1) & 0x0F, 0x0F);
    }

    #[test]
    fn press_raises_interrupt_once() {
        let mut mmu = Mmu::new();
        mmu.if_reg = Interrupts::empty();
        let mut pad = Joypad::new();
        mmu.write_byte(REG_P1, 0x10);
        pad.update(&mut mmu);
        assert!(!mmu.if_reg.contains(Interrupts::JOYPAD));

        pad.press(Buttons::A);
        pad.update(&mut mmu);
        assert!(mmu.if_reg.contains(Interrupts::JOYPAD));

        mmu.if_reg = Interrupts::empty();
        pad.update(&mut mmu);
        assert!(!mmu.if_reg.contains(Interrupts::JOYPAD));
    }
}

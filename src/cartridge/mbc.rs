//! Bank controllers.
//!
//! Each controller only tracks its register state; the ROM and RAM buffers
//! stay with the [`Cartridge`](super::Cartridge) and are handed in per access.

use super::Banks;

/// Address-window rules of one cartridge bank controller.
pub trait BankController {
    /// Read from the 0x0000-0x7FFF ROM window.
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8;

    /// Write into the 0x0000-0x7FFF control window.
    fn write_control(&mut self, addr: u16, val: u8);

    /// Read from the 0xA000-0xBFFF external RAM window.
    fn read_ram(&self, ram: &Banks, addr: u16) -> u8;

    /// Write to the 0xA000-0xBFFF external RAM window.
    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8);
}

#[inline]
fn ram_enable_value(val: u8) -> bool {
    val & 0x0F == 0x0A
}

#[inline]
fn ram_offset(addr: u16) -> usize {
    (addr as usize) & 0x1FFF
}

#[inline]
fn rom_offset(addr: u16) -> usize {
    (addr as usize) & 0x3FFF
}

/// Plain 32 KiB cartridge with optional unbanked RAM.
#[derive(Debug, Default)]
pub struct NoMbc;

impl BankController for NoMbc {
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8 {
        let bank = (addr as usize) >> 14;
        rom.read(bank, rom_offset(addr))
    }

    fn write_control(&mut self, _addr: u16, _val: u8) {}

    fn read_ram(&self, ram: &Banks, addr: u16) -> u8 {
        ram.read(0, ram_offset(addr))
    }

    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8) {
        ram.write(0, ram_offset(addr), val);
    }
}

#[derive(Debug)]
pub struct Mbc1 {
    ram_enable: bool,
    /// 5-bit primary ROM bank, never zero
    rom_bank: u8,
    /// 2-bit secondary field: ROM bits 5-6 or RAM bank
    upper: u8,
    /// Banking mode, `true` when the secondary field also applies to
    /// 0x0000-0x3FFF and to RAM
    advanced: bool,
}

impl Default for Mbc1 {
    fn default() -> Self {
        Self {
            ram_enable: false,
            rom_bank: 1,
            upper: 0,
            advanced: false,
        }
    }
}

impl Mbc1 {
    fn low_bank(&self) -> usize {
        if self.advanced {
            (self.upper as usize) << 5
        } else {
            0
        }
    }

    fn high_bank(&self) -> usize {
        ((self.upper as usize) << 5) | self.rom_bank as usize
    }

    fn ram_bank(&self) -> usize {
        if self.advanced {
            self.upper as usize
        } else {
            0
        }
    }
}

impl BankController for Mbc1 {
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => rom.read(self.low_bank(), rom_offset(addr)),
            _ => rom.read(self.high_bank(), rom_offset(addr)),
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = ram_enable_value(val),
            0x2000..=0x3FFF => {
                self.rom_bank = val & 0x1F;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            0x4000..=0x5FFF => self.upper = val & 0x03,
            _ => self.advanced = val & 0x01 != 0,
        }
    }

    fn read_ram(&self, ram: &Banks, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        ram.read(self.ram_bank(), ram_offset(addr))
    }

    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8) {
        if self.ram_enable {
            ram.write(self.ram_bank(), ram_offset(addr), val);
        }
    }
}

/// MBC2 with its 512x4-bit built-in RAM.
#[derive(Debug)]
pub struct Mbc2 {
    ram_enable: bool,
    rom_bank: u8,
}

impl Default for Mbc2 {
    fn default() -> Self {
        Self {
            ram_enable: false,
            rom_bank: 1,
        }
    }
}

impl BankController for Mbc2 {
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => rom.read(0, rom_offset(addr)),
            _ => rom.read(self.rom_bank as usize, rom_offset(addr)),
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        // Address bit 8 picks the register across the whole lower half.
        if addr >= 0x4000 {
            return;
        }
        if addr & 0x0100 == 0 {
            self.ram_enable = ram_enable_value(val);
        } else {
            self.rom_bank = val & 0x0F;
            if self.rom_bank == 0 {
                self.rom_bank = 1;
            }
        }
    }

    fn read_ram(&self, ram: &Banks, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        0xF0 | ram.read(0, (addr as usize) & 0x01FF)
    }

    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8) {
        if self.ram_enable {
            ram.write(0, (addr as usize) & 0x01FF, val & 0x0F);
        }
    }
}

/// MBC3 banking. The clock registers can be written and latched but are not
/// advanced.
#[derive(Debug)]
pub struct Mbc3 {
    ram_enable: bool,
    rom_bank: u8,
    /// 0x00-0x03 selects a RAM bank, 0x08-0x0C a clock register
    ram_select: u8,
    clock: [u8; 5],
    latched: [u8; 5],
    latch_armed: bool,
}

impl Default for Mbc3 {
    fn default() -> Self {
        Self {
            ram_enable: false,
            rom_bank: 1,
            ram_select: 0,
            clock: [0; 5],
            latched: [0; 5],
            latch_armed: false,
        }
    }
}

impl Mbc3 {
    fn clock_index(&self) -> Option<usize> {
        match self.ram_select {
            0x08..=0x0C => Some((self.ram_select - 0x08) as usize),
            _ => None,
        }
    }
}

impl BankController for Mbc3 {
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => rom.read(0, rom_offset(addr)),
            _ => rom.read(self.rom_bank as usize, rom_offset(addr)),
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = ram_enable_value(val),
            0x2000..=0x3FFF => {
                self.rom_bank = val & 0x7F;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            0x4000..=0x5FFF => self.ram_select = val & 0x0F,
            _ => {
                if val == 0x01 && self.latch_armed {
                    self.latched = self.clock;
                }
                self.latch_armed = val == 0x00;
            }
        }
    }

    fn read_ram(&self, ram: &Banks, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        match self.clock_index() {
            Some(reg) => self.latched[reg],
            None if self.ram_select <= 0x03 => {
                ram.read(self.ram_select as usize, ram_offset(addr))
            }
            None => 0xFF,
        }
    }

    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8) {
        if !self.ram_enable {
            return;
        }
        match self.clock_index() {
            Some(reg) => self.clock[reg] = val,
            None if self.ram_select <= 0x03 => {
                ram.write(self.ram_select as usize, ram_offset(addr), val)
            }
            None => {}
        }
    }
}

#[derive(Debug)]
pub struct Mbc5 {
    ram_enable: bool,
    /// 9-bit ROM bank, zero allowed
    rom_bank: u16,
    ram_bank: u8,
}

impl Default for Mbc5 {
    fn default() -> Self {
        Self {
            ram_enable: false,
            rom_bank: 1,
            ram_bank: 0,
        }
    }
}

impl BankController for Mbc5 {
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => rom.read(0, rom_offset(addr)),
            _ => rom.read(self.rom_bank as usize, rom_offset(addr)),
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = ram_enable_value(val),
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | val as u16,
            0x3000..=0x3FFF => self.rom_bank = (self.rom_bank & 0x0FF) | ((val as u16 & 1) << 8),
            0x4000..=0x5FFF => self.ram_bank = val & 0x0F,
            _ => {}
        }
    }

    fn read_ram(&self, ram: &Banks, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        ram.read(self.ram_bank as usize, ram_offset(addr))
    }

    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8) {
        if self.ram_enable {
            ram.write(self.ram_bank as usize, ram_offset(addr), val);
        }
    }
}

/// Enum dispatch over every supported controller.
#[derive(Debug)]
pub enum Mbc {
    NoMbc(NoMbc),
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl BankController for Mbc {
    fn read_rom(&self, rom: &Banks, addr: u16) -> u8 {
        match self {
            Mbc::NoMbc(m) => m.read_rom(rom, addr),
            Mbc::Mbc1(m) => m.read_rom(rom, addr),
            Mbc::Mbc2(m) => m.read_rom(rom, addr),
            Mbc::Mbc3(m) => m.read_rom(rom, addr),
            Mbc::Mbc5(m) => m.read_rom(rom, addr),
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match self {
            Mbc::NoMbc(m) => m.write_control(addr, val),
            Mbc::Mbc1(m) => m.write_control(addr, val),
            Mbc::Mbc2(m) => m.write_control(addr, val),
            Mbc::Mbc3(m) => m.write_control(addr, val),
            Mbc::Mbc5(m) => m.write_control(addr, val),
        }
    }

    fn read_ram(&self, ram: &Banks, addr: u16) -> u8 {
        match self {
            Mbc::NoMbc(m) => m.read_ram(ram, addr),
            Mbc::Mbc1(m) => m.read_ram(ram, addr),
            Mbc::Mbc2(m) => m.read_ram(ram, addr),
            Mbc::Mbc3(m) => m.read_ram(ram, addr),
            Mbc::Mbc5(m) => m.read_ram(ram, addr),
        }
    }

    fn write_ram(&mut self, ram: &mut Banks, addr: u16, val: u8) {
        match self {
            Mbc::NoMbc(m) => m.write_ram(ram, addr, val),
            Mbc::Mbc1(m) => m.write_ram(ram, addr, val),
            Mbc::Mbc2(m) => m.write_ram(ram, addr, val),
            Mbc::Mbc3(m) => m.write_ram(ram, addr, val),
            Mbc::Mbc5(m) => m.write_ram(ram, addr, val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_rom(banks: usize) -> Banks {
        let mut data = vec![0u8; banks * 0x4000];
        for (i, chunk) in data.chunks_mut(0x4000).enumerate() {
            chunk.fill(i as u8);
        }
        Banks::new(data, 0x4000)
    }

    #[test]
    fn mbc1_advanced_mode_maps_upper_bits_into_bank_zero_window() {
        let rom = numbered_rom(128);
        let mut mbc = Mbc1::default();
        mbc.write_control(0x4000, 0x02);
        assert_eq!(mbc.read_rom(&rom, 0x0000), 0);
        mbc.write_control(0x6000, 0x01);
        assert_eq!(mbc.read_rom(&rom, 0x0000), 64);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 65);
    }

    #[test]
    fn mbc2_register_selected_by_address_bit_8() {
        let rom = numbered_rom(16);
        let mut ram = Banks::new(vec![0; 0x200], 0x200);
        let mut mbc = Mbc2::default();
        mbc.write_control(0x2100, 0x05);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 5);
        // bit 8 clear: this is a RAM-enable write, not a bank write
        mbc.write_control(0x2000, 0x0A);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 5);
        mbc.write_ram(&mut ram, 0xA000, 0xAB);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 0xFB);
        assert_eq!(mbc.read_ram(&ram, 0xA200), 0xFB);
    }

    #[test]
    fn mbc3_clock_registers_read_latched_values() {
        let mut ram = Banks::new(vec![0; 0x8000], 0x2000);
        let mut mbc = Mbc3::default();
        mbc.write_control(0x0000, 0x0A);
        mbc.write_control(0x4000, 0x08);
        mbc.write_ram(&mut ram, 0xA000, 42);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 0);
        mbc.write_control(0x6000, 0x00);
        mbc.write_control(0x6000, 0x01);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 42);
    }

    #[test]
    fn mbc5_allows_bank_zero_and_ninth_bit() {
        let rom = numbered_rom(512);
        let mut mbc = Mbc5::default();
        mbc.write_control(0x2000, 0x00);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 0);
        mbc.write_control(0x2000, 0x02);
        mbc.write_control(0x3000, 0x01);
        // bank 0x102 of a numbered ROM stores its index truncated to a byte
        assert_eq!(mbc.read_rom(&rom, 0x4000), 0x02);
        assert_eq!(mbc.rom_bank, 0x102);
    }
}

#![allow(dead_code)]

use once_cell::sync::OnceCell;

use dmg_core::cartridge::Cartridge;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Route `log` output through env_logger once per test binary.
pub fn init_logger() {
    LOGGER.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// A blank 32KB image with the given cartridge type and RAM size code.
pub fn blank_rom(cart_type: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000 << rom_size_code];
    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_size_code;
    rom[0x0149] = ram_size_code;
    rom[0x014D] = header_checksum(&rom);
    rom
}

pub fn header_checksum(rom: &[u8]) -> u8 {
    rom[0x0134..=0x014C]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

/// A no-MBC cartridge with `program` placed at the 0x0100 entry point.
pub fn program_cart(program: &[u8]) -> Cartridge {
    let mut rom = blank_rom(0x00, 0x00, 0x00);
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    Cartridge::from_bytes(rom).unwrap()
}

/// A ROM whose every bank is filled with its own bank number.
pub fn numbered_rom(cart_type: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
    let mut rom = blank_rom(cart_type, rom_size_code, ram_size_code);
    let header = rom[0x0100..0x0150].to_vec();
    for (i, chunk) in rom.chunks_mut(0x4000).enumerate() {
        chunk.fill(i as u8);
    }
    rom[0x0100..0x0150].copy_from_slice(&header);
    rom
}

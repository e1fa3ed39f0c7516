use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{info, warn};
use thiserror::Error;

mod mbc;

pub use mbc::{BankController, Mbc, Mbc1, Mbc2, Mbc3, Mbc5, NoMbc};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

/// Built-in RAM of an MBC2, in 4-bit cells.
const MBC2_RAM_SIZE: usize = 0x200;

const HEADER_END: usize = 0x0150;

#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("failed to read cartridge image: {0}")]
    Io(#[from] io::Error),

    #[error("image is {0} bytes, too small to hold a cartridge header")]
    TooSmall(usize),

    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedType(u8),

    #[error("invalid ROM size code {0:#04X}")]
    InvalidRomSize(u8),

    #[error("invalid RAM size code {0:#04X}")]
    InvalidRamSize(u8),

    #[error("header declares {expected} bytes of ROM but the image holds {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Owned, bank-strided storage.
///
/// Bank numbers are reduced modulo the real bank count and offsets wrap
/// inside the buffer, so no selection can index past the end.
#[derive(Debug, Clone)]
pub struct Banks {
    data: Vec<u8>,
    bank_size: usize,
}

impl Banks {
    pub fn new(data: Vec<u8>, bank_size: usize) -> Self {
        Self { data, bank_size }
    }

    pub fn empty(bank_size: usize) -> Self {
        Self::new(Vec::new(), bank_size)
    }

    pub fn bank_count(&self) -> usize {
        self.data.len().div_ceil(self.bank_size)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn index(&self, bank: usize, offset: usize) -> Option<usize> {
        if self.data.is_empty() {
            return None;
        }
        let bank = bank % self.bank_count();
        Some((bank * self.bank_size + offset % self.bank_size) % self.data.len())
    }

    pub fn read(&self, bank: usize, offset: usize) -> u8 {
        self.index(bank, offset)
            .and_then(|i| self.data.get(i).copied())
            .unwrap_or(0xFF)
    }

    pub fn write(&mut self, bank: usize, offset: usize, val: u8) {
        if let Some(b) = self.index(bank, offset).and_then(|i| self.data.get_mut(i)) {
            *b = val;
        }
    }
}

/// Fields decoded from the 0x0100-0x014F cartridge header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub header_checksum: u8,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TooSmall(data.len()));
        }
        let mut title = &data[0x0134..0x0144];
        if let Some(pos) = title.iter().position(|&b| b == 0) {
            title = &title[..pos];
        }
        Ok(Self {
            title: String::from_utf8_lossy(title).trim().to_string(),
            cart_type: data[0x0147],
            rom_size_code: data[0x0148],
            ram_size_code: data[0x0149],
            header_checksum: data[0x014D],
        })
    }

    pub fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            other => Err(CartridgeError::UnsupportedType(other)),
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    /// ROM size in bytes.
    pub fn rom_size(&self) -> Result<usize, CartridgeError> {
        match self.rom_size_code {
            code @ 0x00..=0x08 => Ok(0x8000 << code),
            0x52 => Ok(72 * ROM_BANK_SIZE),
            0x53 => Ok(80 * ROM_BANK_SIZE),
            0x54 => Ok(96 * ROM_BANK_SIZE),
            other => Err(CartridgeError::InvalidRomSize(other)),
        }
    }

    /// External RAM size in bytes. MBC2 ignores the header field.
    pub fn ram_size(&self) -> Result<usize, CartridgeError> {
        if matches!(self.cart_type, 0x05 | 0x06) {
            return Ok(MBC2_RAM_SIZE);
        }
        match self.ram_size_code {
            0x00 => Ok(0),
            0x01 => Ok(0x800),   // 2KB
            0x02 => Ok(0x2000),  // 8KB
            0x03 => Ok(0x8000),  // 32KB (4 banks)
            0x04 => Ok(0x20000), // 128KB (16 banks)
            0x05 => Ok(0x10000), // 64KB (8 banks)
            other => Err(CartridgeError::InvalidRamSize(other)),
        }
    }

    /// Checksum over 0x0134-0x014C as computed by the boot ROM.
    pub fn computed_checksum(data: &[u8]) -> u8 {
        data[0x0134..=0x014C]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
    }
}

#[derive(Debug)]
pub struct Cartridge {
    pub header: Header,
    pub mbc_type: MbcType,
    pub rom: Banks,
    pub ram: Banks,
    mbc: Mbc,
    save_path: Option<PathBuf>,
}

impl Cartridge {
    /// Build a cartridge from a raw ROM image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let mbc_type = header.mbc_type()?;
        let expected = header.rom_size()?;
        let ram_size = header.ram_size()?;

        if data.len() < expected {
            return Err(CartridgeError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        if data.len() > expected {
            warn!(
                "ROM image is {} bytes, header declares {}; extra data ignored",
                data.len(),
                expected
            );
        }

        let checksum = Header::computed_checksum(&data);
        if checksum != header.header_checksum {
            warn!(
                "header checksum mismatch: stored {:02X}, computed {:02X}",
                header.header_checksum, checksum
            );
        }

        let mut rom = data;
        rom.truncate(expected);

        let mbc = match mbc_type {
            MbcType::NoMbc => Mbc::NoMbc(NoMbc),
            MbcType::Mbc1 => Mbc::Mbc1(Mbc1::default()),
            MbcType::Mbc2 => Mbc::Mbc2(Mbc2::default()),
            MbcType::Mbc3 => Mbc::Mbc3(Mbc3::default()),
            MbcType::Mbc5 => Mbc::Mbc5(Mbc5::default()),
        };
        let ram_bank_size = if mbc_type == MbcType::Mbc2 {
            MBC2_RAM_SIZE
        } else {
            RAM_BANK_SIZE
        };

        Ok(Self {
            header,
            mbc_type,
            rom: Banks::new(rom, ROM_BANK_SIZE),
            ram: Banks::new(vec![0; ram_size], ram_bank_size),
            mbc,
            save_path: None,
        })
    }

    /// Load a ROM image from disk along with its `.sav` file when the
    /// cartridge is battery backed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let mut cart = Self::from_bytes(data)?;

        if cart.header.has_battery() && !cart.ram.is_empty() {
            let save = path.as_ref().with_extension("sav");
            match fs::read(&save) {
                Ok(bytes) => {
                    for (d, s) in cart.ram.as_mut_slice().iter_mut().zip(bytes.iter()) {
                        *d = *s;
                    }
                    info!("Loaded battery RAM from {}", save.display());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to read {}: {e}", save.display()),
            }
            cart.save_path = Some(save);
        }

        info!(
            "Loaded ROM: {} (MBC: {:?}, {} ROM banks, {} bytes RAM)",
            cart.header.title,
            cart.mbc_type,
            cart.rom.bank_count(),
            cart.ram.as_slice().len()
        );
        Ok(cart)
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.mbc.read_rom(&self.rom, addr),
            0xA000..=0xBFFF => self.mbc.read_ram(&self.ram, addr),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.mbc.write_control(addr, val),
            0xA000..=0xBFFF => self.mbc.write_ram(&mut self.ram, addr, val),
            _ => {}
        }
    }

    /// Write battery-backed RAM next to the ROM it was loaded from.
    pub fn save_ram(&self) -> io::Result<()> {
        if let Some(path) = &self.save_path
            && !self.ram.is_empty()
        {
            fs::write(path, self.ram.as_slice())?;
        }
        Ok(())
    }
}

use log::debug;

use crate::mmu::{Interrupts, Mmu, REG_SB, REG_SC};

/// Cycles needed to shift out one byte on the internal 8192 Hz clock.
const TRANSFER_CYCLES: u32 = 8 * 512;

/// Single-byte serial shift register.
///
/// Only internally clocked transfers complete. No partner is attached, so the
/// received byte is always 0xFF. Every byte sent is kept in [`Serial::output`].
#[derive(Default)]
pub struct Serial {
    out_buf: Vec<u8>,
    /// Cycles left in the running transfer
    remaining: Option<u32>,
}

impl Serial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the shift clock, starting transfers requested through SC and
    /// completing them after a full byte time.
    pub fn step(&mut self, mmu: &mut Mmu, cycles: u32) {
        let sc = mmu.read_byte(REG_SC);
        if sc & 0x81 != 0x81 {
            self.remaining = None;
            return;
        }
        let left = self.remaining.unwrap_or(TRANSFER_CYCLES);
        if left > cycles {
            self.remaining = Some(left - cycles);
            return;
        }

        let byte = mmu.read_byte(REG_SB);
        debug!("serial out {byte:02X}");
        self.out_buf.push(byte);
        mmu.write(REG_SB, 0xFF, true);
        mmu.write(REG_SC, sc & 0x7F, true);
        mmu.request_interrupt(Interrupts::SERIAL);
        self.remaining = None;
    }

    /// Bytes transmitted so far.
    pub fn output(&self) -> &[u8] {
        &self.out_buf
    }

    /// Drain the transmitted bytes.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }
}

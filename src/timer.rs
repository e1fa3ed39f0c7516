use crate::hardware::DmgRevision;

/// Sub-cycles between TIMA wrapping to zero and the TMA reload landing.
const OVERFLOW_DELAY: u8 = 4;

/// Divider bit watched for each TAC clock-select value.
const TAC_BITS: [u16; 4] = [9, 3, 5, 7];

pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    last_signal: bool,
    /// Spurious increment owed to a DIV or TAC write, applied on the next tick
    glitch: bool,
    /// Sub-cycles left before an overflowed TIMA is reloaded from TMA
    reload_delay: u8,
    /// Whether the reload was applied on the most recent tick
    reloading: bool,
    interrupt: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            glitch: false,
            reload_delay: 0,
            reloading: false,
            interrupt: false,
        }
    }

    /// Create a timer whose divider carries the post-boot phase of `revision`.
    pub fn new_with_revision(revision: DmgRevision) -> Self {
        let mut timer = Self::new();
        timer.div = revision.boot_div();
        timer.last_signal = timer.signal();
        timer
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => {
                // the reload sub-cycle wins over a concurrent write
                if self.reloading {
                    return;
                }
                // writing inside the overflow delay cancels the reload
                self.reload_delay = 0;
                self.tima = val;
            }
            0xFF06 => {
                self.tma = val;
                if self.reloading {
                    self.tima = val;
                }
            }
            0xFF07 => {
                let prev = self.signal();
                self.tac = val & 0x07;
                let new = self.signal();
                if prev && !new {
                    self.glitch = true;
                }
                self.last_signal = new;
            }
            _ => {}
        }
    }

    /// Advance the timer by a single sub-cycle.
    pub fn tick(&mut self) {
        self.reloading = false;
        if self.reload_delay > 0 {
            self.reload_delay -= 1;
            if self.reload_delay == 0 {
                self.tima = self.tma;
                self.interrupt = true;
                self.reloading = true;
            }
        }
        if std::mem::take(&mut self.glitch) {
            self.increment();
        }
        self.div = self.div.wrapping_add(1);
        let new = self.signal();
        if self.last_signal && !new {
            self.increment();
        }
        self.last_signal = new;
    }

    /// Advance the timer by `cycles` sub-cycles.
    pub fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Reset the internal divider counter, applying TIMA edge logic.
    pub fn reset_div(&mut self) {
        if self.signal() {
            self.glitch = true;
        }
        self.div = 0;
        self.last_signal = false;
    }

    pub fn interrupt_pending(&self) -> bool {
        self.interrupt
    }

    /// Returns and clears the pending timer interrupt.
    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt)
    }

    /// Whether an overflow is waiting for its TMA reload.
    pub fn reload_pending(&self) -> bool {
        self.reload_delay > 0
    }

    fn increment(&mut self) {
        let (tima, overflow) = self.tima.overflowing_add(1);
        self.tima = tima;
        if overflow {
            self.reload_delay = OVERFLOW_DELAY;
        }
    }

    fn signal(&self) -> bool {
        Self::signal_with(self.div, self.tac)
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        tac & 0x04 != 0 && (div >> TAC_BITS[(tac & 0x03) as usize]) & 1 != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_timer_never_counts() {
        let mut timer = Timer::new();
        timer.write(0xFF07, 0x01);
        timer.step(4096);
        assert_eq!(timer.tima, 0);
        assert_eq!(timer.read(0xFF04), 0x10);
    }

    #[test]
    fn tac_reads_back_with_upper_bits_set() {
        let mut timer = Timer::new();
        timer.write(0xFF07, 0xFD);
        assert_eq!(timer.tac, 0x05);
        assert_eq!(timer.read(0xFF07), 0xFD);
    }

    #[test]
    fn each_clock_select_uses_its_divider_bit() {
        for (tac, period) in [(0x04u8, 1024u32), (0x05, 16), (0x06, 64), (0x07, 256)] {
            let mut timer = Timer::new();
            timer.write(0xFF07, tac);
            timer.step(period - 1);
            assert_eq!(timer.tima, 0, "tac={tac:02X}");
            timer.tick();
            assert_eq!(timer.tima, 1, "tac={tac:02X}");
        }
    }
}

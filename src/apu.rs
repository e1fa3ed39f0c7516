//! Sound register plumbing.
//!
//! Channel synthesis lives outside the core. The bus stores every sound
//! register write and reports the ones with side effects to an
//! [`AudioSink`].

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Square1,
    Square2,
    Wave,
    Noise,
}

/// Receiver for sound events raised by register writes.
///
/// All methods default to doing nothing so a host only implements what it
/// renders.
pub trait AudioSink: Send {
    /// NR52 bit 7 was written.
    fn power(&mut self, _on: bool) {}

    /// NRx4 was written with bit 7 set.
    fn trigger(&mut self, _channel: Channel) {}

    /// NRx1 was written; `length` is the raw length field.
    fn reload_length(&mut self, _channel: Channel, _length: u8) {}

    /// NRx2 (or NR32 for the wave channel) was written.
    fn envelope(&mut self, _channel: Channel, _value: u8) {}

    /// The channel's period changed. For the noise channel this is the raw
    /// NR43 byte.
    fn frequency(&mut self, _channel: Channel, _value: u16) {}

    /// NR10 was written.
    fn sweep(&mut self, _value: u8) {}
}

/// Sink used when no audio backend is attached.
#[derive(Default)]
pub struct NullAudio;

impl AudioSink for NullAudio {}

/// Which channel a sound register in 0xFF10-0xFF23 belongs to, and its
/// position (0-4) within that channel's NRx0-NRx4 block.
pub(crate) fn channel_register(addr: u16) -> Option<(Channel, u16)> {
    match addr {
        0xFF10..=0xFF14 => Some((Channel::Square1, addr - 0xFF10)),
        0xFF15..=0xFF19 => Some((Channel::Square2, addr - 0xFF15)),
        0xFF1A..=0xFF1E => Some((Channel::Wave, addr - 0xFF1A)),
        0xFF1F..=0xFF23 => Some((Channel::Noise, addr - 0xFF1F)),
        _ => None,
    }
}

/// Readback mask for 0xFF10-0xFF26; set bits always read as 1.
pub(crate) const SOUND_READ_MASK: [u8; 0x17] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // NR20-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // NR40-NR44
    0x00, 0x00, 0x70, // NR50-NR52
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// DMG hardware revision.
///
/// Selects the register file left behind by the boot ROM and the phase of the
/// divider when cartridge code starts running.
pub enum DmgRevision {
    Rev0,
    RevA,
    RevB,
    #[default]
    RevC,
}

impl DmgRevision {
    /// Internal divider value observed at 0x0100 after the boot ROM hands off.
    pub const fn boot_div(self) -> u16 {
        match self {
            DmgRevision::Rev0 => 0x1830,
            DmgRevision::RevA | DmgRevision::RevB | DmgRevision::RevC => 0xABCC,
        }
    }

    #[inline]
    /// Returns whether this is the original, pre-production board.
    pub const fn is_rev0(self) -> bool {
        matches!(self, DmgRevision::Rev0)
    }
}

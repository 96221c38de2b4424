//! PCI configuration-space access used while bringing up the video card.
//!
//! Only 32-bit accesses at dword-aligned offsets are needed: the option ROM logic touches the
//! ROM base register and the BARs that may alias the ROM window, nothing else.

/// Offset of BAR0 in a type 0 configuration header.
pub const PCI_BASE_ADDRESS_0: u8 = 0x10;
/// Offset of BAR1.
pub const PCI_BASE_ADDRESS_1: u8 = 0x14;
/// Offset of BAR2.
pub const PCI_BASE_ADDRESS_2: u8 = 0x18;
/// Offset of BAR4.
pub const PCI_BASE_ADDRESS_4: u8 = 0x20;
/// Offset of the expansion ROM base address register.
pub const PCI_ROM_ADDRESS: u8 = 0x30;

/// Bit 0 of a BAR: set for I/O space, clear for memory space.
pub const PCI_BAR_SPACE_IO: u32 = 0x1;
/// Bit 0 of the ROM base register: address decode enable.
pub const PCI_ROM_ADDRESS_ENABLE: u32 = 0x1;

/// PCI bus/device/function identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PciBdf {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciBdf {
    /// Creates a new BDF.
    ///
    /// The caller is responsible for keeping the values within the PCI ranges:
    /// device < 32, function < 8.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }

    /// Packed device/function byte, `(device << 3) | function`.
    pub const fn devfn(self) -> u8 {
        debug_assert!(self.device < 32);
        debug_assert!(self.function < 8);
        (self.device << 3) | (self.function & 0x7)
    }

    /// Value a video BIOS expects in AX on entry to its POST routine: AH = bus, AL = devfn.
    pub const fn post_ax(self) -> u16 {
        ((self.bus as u16) << 8) | (self.devfn() as u16)
    }
}

impl core::fmt::Display for PciBdf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Platform access to PCI configuration space.
pub trait PciConfigSpace {
    /// Read a 32-bit PCI config register.
    ///
    /// `offset` must be 4-byte aligned.
    fn read_config_dword(&mut self, bdf: PciBdf, offset: u8) -> u32;

    /// Write a 32-bit PCI config register.
    ///
    /// `offset` must be 4-byte aligned.
    fn write_config_dword(&mut self, bdf: PciBdf, offset: u8, value: u32);
}

impl<T: PciConfigSpace + ?Sized> PciConfigSpace for &mut T {
    fn read_config_dword(&mut self, bdf: PciBdf, offset: u8) -> u32 {
        (**self).read_config_dword(bdf, offset)
    }

    fn write_config_dword(&mut self, bdf: PciBdf, offset: u8, value: u32) {
        (**self).write_config_dword(bdf, offset, value)
    }
}

/// Returns true if a raw BAR value decodes I/O space.
pub const fn bar_is_io(value: u32) -> bool {
    value & PCI_BAR_SPACE_IO != 0
}

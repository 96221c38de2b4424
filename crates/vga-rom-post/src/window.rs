//! BAR window probing and I/O base fixups.

use tracing::debug;

use crate::mapper::BarSnapshot;
use crate::pci::{
    bar_is_io, PciBdf, PciConfigSpace, PCI_BASE_ADDRESS_0, PCI_BASE_ADDRESS_1, PCI_BASE_ADDRESS_4,
};

/// Highest I/O base a real-mode video BIOS can address through a 16-bit port number.
pub const MAX_REAL_MODE_IO_BASE: u32 = 0xFFFE;

/// BARs searched for a window that can alias the ROM, in scan order.
const ROM_WINDOW_CANDIDATES: [u8; 2] = [PCI_BASE_ADDRESS_0, PCI_BASE_ADDRESS_1];

/// Low BAR bits that never belong to the decoded base or size.
const BAR_CONTROL_MASK: u32 = 0xFF;

/// A memory BAR large enough to alias the option ROM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RomWindowBar {
    /// Config-space offset of the BAR.
    pub offset: u8,
    /// Bus address the BAR decoded before probing, control bits cleared.
    pub bus_base: u32,
    /// Decoded window size in bytes.
    pub size: u32,
}

/// Decoded window size from the value read back after writing all ones to a BAR.
pub fn decoded_window_size(probe_readback: u32) -> u32 {
    (!(probe_readback & !BAR_CONTROL_MASK)).wrapping_add(1)
}

/// Searches the device's memory BARs for one whose window can hold `min_size` bytes.
///
/// We use a mapping the device already decodes so that any bridge between the CPU and the card
/// forwards the range. Usually this finds the framebuffer BAR.
///
/// Every memory BAR visited is left holding the all-ones probe value, including the returned
/// one. The caller must restore them.
///
/// The search ends at the first BAR large enough. If that BAR has no bus address assigned,
/// there is no usable window and `None` is returned.
pub fn find_rom_window<P: PciConfigSpace + ?Sized>(
    pci: &mut P,
    bdf: PciBdf,
    min_size: u32,
) -> Option<RomWindowBar> {
    for offset in ROM_WINDOW_CANDIDATES {
        let base = pci.read_config_dword(bdf, offset);
        if bar_is_io(base) {
            continue;
        }

        pci.write_config_dword(bdf, offset, 0xFFFF_FFFF);
        let size = decoded_window_size(pci.read_config_dword(bdf, offset));
        debug!(%bdf, offset, size, "probed BAR window");

        // A BAR that decodes nothing reads back zero, which wraps to a size of 0 here.
        if size >= min_size {
            let bus_base = base & !BAR_CONTROL_MASK;
            // An unassigned BAR would put the ROM decoder on top of system RAM at bus address 0.
            if bus_base == 0 {
                debug!(%bdf, offset, "ROM window BAR is unassigned");
                return None;
            }
            return Some(RomWindowBar {
                offset,
                bus_base,
                size,
            });
        }
    }
    None
}

/// Truncates an I/O BAR base above [`MAX_REAL_MODE_IO_BASE`] to 16 bits and writes the fixed
/// value back. Returns the (possibly updated) value.
///
/// Some platforms assign relocatable I/O above 64K, which a video BIOS using 16-bit port
/// numbers cannot reach.
pub fn fixup_io_base<P: PciConfigSpace + ?Sized>(
    pci: &mut P,
    bdf: PciBdf,
    offset: u8,
    value: u32,
) -> u32 {
    if !bar_is_io(value) || value <= MAX_REAL_MODE_IO_BASE {
        return value;
    }

    let fixed = value & 0xFFFF;
    debug!(%bdf, offset, from = value, to = fixed, "truncating I/O BAR below 64K");
    pci.write_config_dword(bdf, offset, fixed);
    fixed
}

/// Normalizes the I/O BAR the video BIOS will use.
///
/// BAR1 is fixed up when it is assigned; layouts that leave BAR1 empty put the I/O range in
/// BAR4. The snapshot is updated so that restoring it keeps the normalized base.
pub fn normalize_io_bars<P: PciConfigSpace + ?Sized>(
    pci: &mut P,
    bdf: PciBdf,
    saved: &mut BarSnapshot,
) {
    if saved.bar1 != 0 {
        saved.bar1 = fixup_io_base(pci, bdf, PCI_BASE_ADDRESS_1, saved.bar1);
    } else {
        saved.bar4 = fixup_io_base(pci, bdf, PCI_BASE_ADDRESS_4, saved.bar4);
    }
}

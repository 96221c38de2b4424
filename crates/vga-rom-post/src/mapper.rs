//! Exposing the option ROM through an existing BAR window.
//!
//! Many cards cannot be read through their ROM BAR at its assigned address (the ROM BAR is
//! often left zeroed after a previous POST, or the range is not forwarded by an upstream bridge).
//! Instead we borrow a memory BAR the device already decodes, disable it, and point the ROM BAR
//! at its bus address so the ROM appears in its place.
//!
//! The BARs touched here are captured in a [`BarSnapshot`] first. The snapshot is owned by the
//! [`RomMapping`] guard and written back when the guard is dropped, so the device never stays
//! in the remapped state past the mapping's scope, whichever way the caller leaves it.

use tracing::{debug, warn};

use crate::config::PostConfig;
use crate::error::{PostError, Result};
use crate::image::{ROM_SIGNATURE, ROM_SIZE_BYTE};
use crate::pci::{
    PciBdf, PciConfigSpace, PCI_BASE_ADDRESS_0, PCI_BASE_ADDRESS_1, PCI_BASE_ADDRESS_2,
    PCI_BASE_ADDRESS_4, PCI_ROM_ADDRESS, PCI_ROM_ADDRESS_ENABLE,
};
use crate::window::{find_rom_window, normalize_io_bars, RomWindowBar};

/// Read access to a mapped, uncached bus window.
pub trait RomWindow {
    fn read_u8(&self, offset: usize) -> u8;

    fn read(&self, offset: usize, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_u8(offset + i);
        }
    }
}

/// Platform hooks for reaching device memory from the CPU.
pub trait BusWindowMapper {
    /// Map `len` bytes of `bdf`'s memory space at `bus_addr`, uncached.
    ///
    /// There is no explicit unmap; dropping the window releases it.
    fn map_uncached(&mut self, bdf: PciBdf, bus_addr: u32, len: usize)
        -> Option<Box<dyn RomWindow>>;

    /// Busy-wait for at least `micros` microseconds.
    fn udelay(&mut self, micros: u32);
}

/// The configuration registers that mapping the ROM may rewrite.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BarSnapshot {
    pub rom: u32,
    pub bar0: u32,
    pub bar1: u32,
    pub bar2: u32,
    pub bar4: u32,
}

impl BarSnapshot {
    pub fn capture<P: PciConfigSpace + ?Sized>(pci: &mut P, bdf: PciBdf) -> Self {
        Self {
            rom: pci.read_config_dword(bdf, PCI_ROM_ADDRESS),
            bar0: pci.read_config_dword(bdf, PCI_BASE_ADDRESS_0),
            bar1: pci.read_config_dword(bdf, PCI_BASE_ADDRESS_1),
            bar2: pci.read_config_dword(bdf, PCI_BASE_ADDRESS_2),
            bar4: pci.read_config_dword(bdf, PCI_BASE_ADDRESS_4),
        }
    }

    /// Writes every register back at the offset it was read from, ROM decoder first.
    pub fn restore<P: PciConfigSpace + ?Sized>(&self, pci: &mut P, bdf: PciBdf) {
        pci.write_config_dword(bdf, PCI_ROM_ADDRESS, self.rom);
        pci.write_config_dword(bdf, PCI_BASE_ADDRESS_0, self.bar0);
        pci.write_config_dword(bdf, PCI_BASE_ADDRESS_1, self.bar1);
        pci.write_config_dword(bdf, PCI_BASE_ADDRESS_2, self.bar2);
        pci.write_config_dword(bdf, PCI_BASE_ADDRESS_4, self.bar4);
    }
}

/// A device whose ROM is temporarily visible through a borrowed BAR window.
///
/// Dropping the mapping (or calling [`RomMapping::unmap`]) restores the snapshot.
pub struct RomMapping<'p, P: PciConfigSpace + ?Sized> {
    pci: &'p mut P,
    bdf: PciBdf,
    saved: BarSnapshot,
    bar: Option<RomWindowBar>,
    window: Option<Box<dyn RomWindow>>,
}

impl<'p, P: PciConfigSpace + ?Sized> RomMapping<'p, P> {
    fn new(pci: &'p mut P, bdf: PciBdf) -> Self {
        let saved = BarSnapshot::capture(pci, bdf);
        Self {
            pci,
            bdf,
            saved,
            bar: None,
            window: None,
        }
    }

    pub fn bdf(&self) -> PciBdf {
        self.bdf
    }

    /// Register values that will be written back on unmap.
    pub fn saved(&self) -> &BarSnapshot {
        &self.saved
    }

    /// The BAR whose window the ROM is visible through.
    pub fn window_bar(&self) -> Option<RomWindowBar> {
        self.bar
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        match &self.window {
            Some(window) => window.read_u8(offset),
            None => 0xFF,
        }
    }

    pub fn read(&self, offset: usize, buf: &mut [u8]) {
        match &self.window {
            Some(window) => window.read(offset, buf),
            None => buf.fill(0xFF),
        }
    }

    /// Image length declared by the mapped header, in bytes.
    pub fn declared_len(&self) -> usize {
        usize::from(self.read_u8(ROM_SIZE_BYTE)) * 512
    }

    /// Unmaps the ROM and restores the device's BARs.
    pub fn unmap(self) {}
}

impl<P: PciConfigSpace + ?Sized> Drop for RomMapping<'_, P> {
    fn drop(&mut self) {
        // Release the CPU-side window before the bus range behind it changes.
        self.window = None;
        self.saved.restore(&mut *self.pci, self.bdf);
        debug!(bdf = %self.bdf, "restored BARs after ROM mapping");
    }
}

/// Maps `bdf`'s option ROM into a CPU-visible window.
///
/// On failure the BARs have already been restored when this returns.
pub fn map_rom_image<'p, P, M>(
    pci: &'p mut P,
    mapper: &mut M,
    bdf: PciBdf,
    config: &PostConfig,
) -> Result<RomMapping<'p, P>>
where
    P: PciConfigSpace + ?Sized,
    M: BusWindowMapper + ?Sized,
{
    let mut mapping = RomMapping::new(pci, bdf);

    normalize_io_bars(&mut *mapping.pci, bdf, &mut mapping.saved);

    let Some(bar) = find_rom_window(&mut *mapping.pci, bdf, config.max_rom_len) else {
        warn!(%bdf, required = config.max_rom_len, "no BAR window large enough for the video ROM");
        return Err(PostError::NoSuitableWindow {
            bdf,
            required: config.max_rom_len,
        });
    };
    mapping.bar = Some(bar);

    let window = mapper
        .map_uncached(bdf, bar.bus_base, config.max_rom_len as usize)
        .ok_or(PostError::MapFailed {
            bdf,
            bus_addr: bar.bus_base,
        })?;
    mapping.window = Some(window);

    mapping.pci.write_config_dword(bdf, bar.offset, 0);
    mapping
        .pci
        .write_config_dword(bdf, PCI_ROM_ADDRESS, bar.bus_base | PCI_ROM_ADDRESS_ENABLE);
    debug!(%bdf, bar = bar.offset, bus_base = bar.bus_base, "ROM decoder moved onto BAR window");

    mapper.udelay(config.settle_delay_us);

    let mut header = [0u8; 3];
    mapping.read(0, &mut header);
    if header[..2] != ROM_SIGNATURE || header[ROM_SIZE_BYTE] == 0 {
        warn!(%bdf, ?header, "mapped video ROM has no valid header");
        return Err(PostError::InvalidImage("bad header in mapped ROM"));
    }

    Ok(mapping)
}

//! [`BusWindowMapper`] for firmware running with identity-mapped, uncached PCI memory.

use std::time::{Duration, Instant};

use crate::mapper::{BusWindowMapper, RomWindow};
use crate::pci::PciBdf;

/// A window of device memory read with volatile byte loads.
#[derive(Debug)]
pub struct MmioWindow {
    base: *const u8,
    len: usize,
}

impl MmioWindow {
    /// # Safety
    ///
    /// `base..base + len` must stay mapped, uncached and readable for the lifetime of the
    /// window, and must not alias memory Rust code holds references to.
    pub unsafe fn new(base: *const u8, len: usize) -> Self {
        Self { base, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl RomWindow for MmioWindow {
    fn read_u8(&self, offset: usize) -> u8 {
        if offset >= self.len {
            return 0xFF;
        }
        // SAFETY: in bounds per the check above; validity of the range is the contract of
        // `MmioWindow::new`.
        unsafe { core::ptr::read_volatile(self.base.add(offset)) }
    }
}

/// Maps bus addresses 1:1 onto CPU addresses, offset by a fixed bus-to-CPU translation.
#[derive(Debug)]
pub struct IdentityBusMapper {
    cpu_offset: u64,
}

impl IdentityBusMapper {
    /// # Safety
    ///
    /// Every bus address a caller maps, plus `cpu_offset`, must be an uncached CPU mapping of
    /// that bus address for as long as the returned windows live.
    pub unsafe fn new(cpu_offset: u64) -> Self {
        Self { cpu_offset }
    }
}

impl BusWindowMapper for IdentityBusMapper {
    fn map_uncached(
        &mut self,
        _bdf: PciBdf,
        bus_addr: u32,
        len: usize,
    ) -> Option<Box<dyn RomWindow>> {
        let cpu_addr = u64::from(bus_addr).checked_add(self.cpu_offset)?;
        if cpu_addr == 0 {
            return None;
        }
        let base = usize::try_from(cpu_addr).ok()? as *const u8;
        // SAFETY: guaranteed by the contract of `IdentityBusMapper::new`.
        Some(Box::new(unsafe { MmioWindow::new(base, len) }))
    }

    fn udelay(&mut self, micros: u32) {
        let deadline = Instant::now() + Duration::from_micros(u64::from(micros));
        while Instant::now() < deadline {
            core::hint::spin_loop();
        }
    }
}

//! Interface to the x86 real-mode interpreter that runs the video BIOS.
//!
//! The POST logic never looks inside the executor. It only needs to:
//! - create the emulated real-mode address space ([`RealModeExecutor::init`]),
//! - load the ROM image and tell the executor which PCI device owns it
//!   ([`RealModeExecutor::set_vga`]),
//! - far-call into the image and issue software interrupts,
//! - read back the (possibly modified) image and scratch memory afterwards.

use crate::error::ExecutorError;
use crate::pci::PciBdf;
use crate::realmode::{RealModeRegs, SegmentRegs};

/// Host-side handler for a real-mode software interrupt.
///
/// Returns `true` if the interrupt was handled and the executor should not chain to the
/// vector installed by the emulated firmware.
pub type InterruptHandler = Box<dyn FnMut(&mut RealModeRegs) -> bool>;

pub trait RealModeExecutor {
    /// Allocate and zero the emulated memory starting at `base_memory` for `size` bytes.
    fn init(&mut self, base_memory: u32, size: u32, flags: u32) -> Result<(), ExecutorError>;

    /// Bind the executor's virtual VGA context to `bdf` and shadow `image` at the legacy video
    /// BIOS segment.
    fn set_vga(&mut self, bdf: PciBdf, image: &[u8]);

    /// Synchronous far call to `seg:off`. Registers are updated in place with the state at
    /// return.
    fn call_far(
        &mut self,
        seg: u16,
        off: u16,
        regs: &mut RealModeRegs,
        sregs: &mut SegmentRegs,
    ) -> Result<(), ExecutorError>;

    /// Issue `INT vector` with `regs` (and `sregs` for ES:DI style buffers).
    fn int86(
        &mut self,
        vector: u8,
        regs: &mut RealModeRegs,
        sregs: &mut SegmentRegs,
    ) -> Result<(), ExecutorError>;

    /// Copy the shadowed image back into `image`, reflecting anything the BIOS rewrote.
    fn get_vga(&mut self, image: &mut [u8]);

    /// Read `buf.len()` bytes of emulated memory at linear offset `offset`.
    fn read_memory(&self, offset: u32, buf: &mut [u8]);

    fn set_interrupt_handler(&mut self, vector: u8, handler: InterruptHandler);

    /// Release the emulated memory. The executor may be re-initialized afterwards.
    fn exit(&mut self);
}

impl<T: RealModeExecutor + ?Sized> RealModeExecutor for Box<T> {
    fn init(&mut self, base_memory: u32, size: u32, flags: u32) -> Result<(), ExecutorError> {
        (**self).init(base_memory, size, flags)
    }

    fn set_vga(&mut self, bdf: PciBdf, image: &[u8]) {
        (**self).set_vga(bdf, image)
    }

    fn call_far(
        &mut self,
        seg: u16,
        off: u16,
        regs: &mut RealModeRegs,
        sregs: &mut SegmentRegs,
    ) -> Result<(), ExecutorError> {
        (**self).call_far(seg, off, regs, sregs)
    }

    fn int86(
        &mut self,
        vector: u8,
        regs: &mut RealModeRegs,
        sregs: &mut SegmentRegs,
    ) -> Result<(), ExecutorError> {
        (**self).int86(vector, regs, sregs)
    }

    fn get_vga(&mut self, image: &mut [u8]) {
        (**self).get_vga(image)
    }

    fn read_memory(&self, offset: u32, buf: &mut [u8]) {
        (**self).read_memory(offset, buf)
    }

    fn set_interrupt_handler(&mut self, vector: u8, handler: InterruptHandler) {
        (**self).set_interrupt_handler(vector, handler)
    }

    fn exit(&mut self) {
        (**self).exit()
    }
}

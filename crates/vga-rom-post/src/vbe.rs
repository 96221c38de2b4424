//! VBE mode selection after POST.

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::error::{PostError, Result};
use crate::executor::RealModeExecutor;
use crate::realmode::{RealModeRegs, SegmentRegs};

pub const VBE_SUCCESS: u16 = 0x004F;
pub const VBE_GET_MODE_INFO: u16 = 0x4F01;
pub const VBE_SET_MODE: u16 = 0x4F02;

const VIDEO_SERVICES_VECTOR: u8 = 0x10;

/// Size of a VBE 2.0+ ModeInfoBlock.
pub const VBE_MODE_INFO_SIZE: usize = 256;

/// End of the real-mode addressable range. ES:DI cannot reach past it.
const REAL_MODE_LIMIT: u32 = 0x10_0000;

bitflags! {
    /// Control bits carried in the BX mode number of VBE function 4F02h.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct VbeModeFlags: u16 {
        const LINEAR_FRAMEBUFFER = 1 << 14;
        const PRESERVE_DISPLAY_MEMORY = 1 << 15;
    }
}

/// Mode number sent to 4F02h for `mode`: linear framebuffer, display memory cleared.
pub fn mode_set_request(mode: u16) -> u16 {
    let mut flags = VbeModeFlags::from_bits_retain(mode);
    flags.insert(VbeModeFlags::LINEAR_FRAMEBUFFER);
    flags.remove(VbeModeFlags::PRESERVE_DISPLAY_MEMORY);
    flags.bits()
}

/// A VBE ModeInfoBlock returned by 4F01h.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VbeModeInfo {
    block: [u8; VBE_MODE_INFO_SIZE],
}

impl VbeModeInfo {
    pub fn from_bytes(block: [u8; VBE_MODE_INFO_SIZE]) -> Self {
        Self { block }
    }

    pub fn as_bytes(&self) -> &[u8; VBE_MODE_INFO_SIZE] {
        &self.block
    }

    fn u16_at(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.block[off], self.block[off + 1]])
    }

    fn u32_at(&self, off: usize) -> u32 {
        u32::from_le_bytes([
            self.block[off],
            self.block[off + 1],
            self.block[off + 2],
            self.block[off + 3],
        ])
    }

    pub fn mode_attributes(&self) -> u16 {
        self.u16_at(0)
    }

    pub fn bytes_per_scan_line(&self) -> u16 {
        self.u16_at(16)
    }

    pub fn x_resolution(&self) -> u16 {
        self.u16_at(18)
    }

    pub fn y_resolution(&self) -> u16 {
        self.u16_at(20)
    }

    pub fn bits_per_pixel(&self) -> u8 {
        self.block[25]
    }

    pub fn memory_model(&self) -> u8 {
        self.block[27]
    }

    /// Physical address of the linear framebuffer.
    pub fn phys_base_ptr(&self) -> u32 {
        self.u32_at(40)
    }
}

/// Sets VBE `mode` through INT 10h and returns its ModeInfoBlock.
///
/// The block is fetched through a staging buffer at linear `staging` in executor memory. The
/// whole block must sit below 1 MiB; otherwise nothing is issued to the executor.
pub fn set_vesa_mode<E: RealModeExecutor + ?Sized>(
    executor: &mut E,
    regs: &mut RealModeRegs,
    mode: u16,
    staging: u32,
) -> Result<VbeModeInfo> {
    if u64::from(staging) + VBE_MODE_INFO_SIZE as u64 > u64::from(REAL_MODE_LIMIT) {
        warn!(staging, "VBE staging buffer is not real-mode addressable");
        return Err(PostError::StagingOutOfRange { offset: staging });
    }

    let request = mode_set_request(mode);
    debug!(mode = request, "setting VBE mode");

    let mut sregs = SegmentRegs::default();
    regs.eax = u32::from(VBE_SET_MODE);
    regs.ebx = u32::from(request);
    vbe_call(executor, regs, &mut sregs)?;

    *regs = RealModeRegs {
        eax: u32::from(VBE_GET_MODE_INFO),
        ecx: u32::from(request),
        ..RealModeRegs::default()
    };
    sregs.es = (staging >> 4) as u16;
    regs.set_di((staging & 0xF) as u16);
    vbe_call(executor, regs, &mut sregs)?;

    let mut block = [0u8; VBE_MODE_INFO_SIZE];
    executor.read_memory(staging, &mut block);
    let info = VbeModeInfo::from_bytes(block);
    debug!(
        width = info.x_resolution(),
        height = info.y_resolution(),
        bpp = info.bits_per_pixel(),
        lfb = info.phys_base_ptr(),
        "VBE mode active"
    );
    Ok(info)
}

fn vbe_call<E: RealModeExecutor + ?Sized>(
    executor: &mut E,
    regs: &mut RealModeRegs,
    sregs: &mut SegmentRegs,
) -> Result<()> {
    let function = regs.ax();
    executor
        .int86(VIDEO_SERVICES_VECTOR, regs, sregs)
        .map_err(PostError::DispatchFailed)?;

    let status = regs.ax();
    if status != VBE_SUCCESS {
        warn!(function, status, "VBE call failed");
        return Err(PostError::VbeCallFailed { function, status });
    }
    Ok(())
}

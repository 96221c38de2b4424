/// General-purpose register file handed to and returned from the real-mode executor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RealModeRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,

    /// Real-mode FLAGS register bits, passed through untouched.
    pub eflags: u32,
}

/// Segment registers for a far call into real-mode code.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SegmentRegs {
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub ss: u16,
    pub fs: u16,
    pub gs: u16,
}

impl SegmentRegs {
    pub fn seg_off(seg: u16, off: u16) -> u32 {
        (seg as u32) * 16 + (off as u32)
    }
}

impl RealModeRegs {
    pub fn ax(&self) -> u16 {
        self.eax as u16
    }

    pub fn set_ax(&mut self, val: u16) {
        self.eax = (self.eax & 0xFFFF_0000) | (val as u32);
    }

    pub fn ah(&self) -> u8 {
        (self.eax >> 8) as u8
    }

    pub fn al(&self) -> u8 {
        self.eax as u8
    }

    pub fn bx(&self) -> u16 {
        self.ebx as u16
    }

    pub fn set_bx(&mut self, val: u16) {
        self.ebx = (self.ebx & 0xFFFF_0000) | (val as u32);
    }

    pub fn cx(&self) -> u16 {
        self.ecx as u16
    }

    pub fn di(&self) -> u16 {
        self.edi as u16
    }

    pub fn set_di(&mut self, val: u16) {
        self.edi = (self.edi & 0xFFFF_0000) | (val as u32);
    }
}

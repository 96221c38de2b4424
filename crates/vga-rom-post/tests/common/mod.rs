#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use vga_rom_post::error::ExecutorError;
use vga_rom_post::pci::{PCI_ROM_ADDRESS, PCI_ROM_ADDRESS_ENABLE};
use vga_rom_post::{
    BusWindowMapper, InterruptHandler, PciBdf, PciConfigSpace, RealModeExecutor, RealModeRegs,
    RomWindow, SegmentRegs,
};

pub const CARD: PciBdf = PciBdf::new(1, 0, 0);

#[derive(Clone, Copy, Debug)]
pub enum BarDef {
    Mem { size: u32 },
    Io { size: u32 },
}

#[derive(Default)]
struct CardState {
    regs: BTreeMap<u8, u32>,
    defs: BTreeMap<u8, BarDef>,
    probing: BTreeMap<u8, bool>,
    rom: Vec<u8>,
    writes: Vec<(u8, u32)>,
    delays: Vec<u32>,
    maps: Vec<u32>,
    fail_map: bool,
}

/// A video card model with BAR size probing and an option ROM that appears wherever the ROM
/// base register points.
#[derive(Clone, Default)]
pub struct FakeVgaCard {
    state: Rc<RefCell<CardState>>,
}

impl FakeVgaCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a sized BAR at `offset` currently assigned to `value`.
    pub fn with_bar(self, offset: u8, def: BarDef, value: u32) -> Self {
        {
            let mut st = self.state.borrow_mut();
            st.defs.insert(offset, def);
            st.regs.insert(offset, value);
        }
        self
    }

    /// Sets a raw register without a size definition.
    pub fn with_reg(self, offset: u8, value: u32) -> Self {
        self.state.borrow_mut().regs.insert(offset, value);
        self
    }

    pub fn with_rom(self, rom: Vec<u8>) -> Self {
        self.state.borrow_mut().rom = rom;
        self
    }

    pub fn with_failing_map(self) -> Self {
        self.state.borrow_mut().fail_map = true;
        self
    }

    pub fn reg(&self, offset: u8) -> u32 {
        self.state.borrow().regs.get(&offset).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(u8, u32)> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }

    pub fn delays(&self) -> Vec<u32> {
        self.state.borrow().delays.clone()
    }

    pub fn maps(&self) -> Vec<u32> {
        self.state.borrow().maps.clone()
    }

    pub fn is_probing(&self, offset: u8) -> bool {
        self.state.borrow().probing.get(&offset).copied().unwrap_or(false)
    }

    /// The five registers the ROM mapping saves and restores.
    pub fn window_regs(&self) -> [u32; 5] {
        [0x30, 0x10, 0x14, 0x18, 0x20].map(|off| self.reg(off))
    }
}

impl PciConfigSpace for FakeVgaCard {
    fn read_config_dword(&mut self, bdf: PciBdf, offset: u8) -> u32 {
        assert_eq!(bdf, CARD);
        let st = self.state.borrow();
        if st.probing.get(&offset).copied().unwrap_or(false) {
            if let Some(def) = st.defs.get(&offset) {
                return match *def {
                    BarDef::Mem { size } => !(size - 1) & 0xFFFF_FFF0,
                    BarDef::Io { size } => (!(size - 1) & 0xFFFF_FFFC) | 0x1,
                };
            }
        }
        st.regs.get(&offset).copied().unwrap_or(0)
    }

    fn write_config_dword(&mut self, bdf: PciBdf, offset: u8, value: u32) {
        assert_eq!(bdf, CARD);
        let mut st = self.state.borrow_mut();
        st.writes.push((offset, value));
        if value == 0xFFFF_FFFF && st.defs.contains_key(&offset) {
            st.probing.insert(offset, true);
            return;
        }
        st.probing.insert(offset, false);
        st.regs.insert(offset, value);
    }
}

struct CardWindow {
    state: Rc<RefCell<CardState>>,
    bus_addr: u32,
}

impl RomWindow for CardWindow {
    fn read_u8(&self, offset: usize) -> u8 {
        let st = self.state.borrow();
        let rom_reg = st.regs.get(&PCI_ROM_ADDRESS).copied().unwrap_or(0);
        if rom_reg != self.bus_addr | PCI_ROM_ADDRESS_ENABLE {
            return 0xFF;
        }
        st.rom.get(offset).copied().unwrap_or(0xFF)
    }
}

impl BusWindowMapper for FakeVgaCard {
    fn map_uncached(
        &mut self,
        bdf: PciBdf,
        bus_addr: u32,
        _len: usize,
    ) -> Option<Box<dyn RomWindow>> {
        assert_eq!(bdf, CARD);
        let mut st = self.state.borrow_mut();
        st.maps.push(bus_addr);
        if st.fail_map {
            return None;
        }
        Some(Box::new(CardWindow {
            state: self.state.clone(),
            bus_addr,
        }))
    }

    fn udelay(&mut self, micros: u32) {
        self.state.borrow_mut().delays.push(micros);
    }
}

/// A ROM image of `blocks` 512-byte blocks with a valid header.
pub fn rom_image(blocks: u8) -> Vec<u8> {
    let mut rom = vec![0u8; usize::from(blocks) * 512];
    rom[0] = 0x55;
    rom[1] = 0xAA;
    rom[2] = blocks;
    // JMP short at the POST entry point.
    rom[3] = 0xEB;
    rom
}

/// Image-rewriting behaviour of the fake BIOS during POST.
pub type PostHook = Box<dyn FnMut(&mut [u8], &mut RealModeRegs)>;

/// Records every call and services VBE 4F01h/4F02h for a fixed mode table.
#[derive(Default)]
pub struct FakeExecutor {
    pub memory: Vec<u8>,
    pub init_args: Option<(u32, u32, u32)>,
    pub fail_init: bool,
    pub fail_call: bool,
    pub fail_mode_info: bool,
    pub far_calls: Vec<(u16, u16, RealModeRegs)>,
    pub interrupts: Vec<(u8, RealModeRegs, SegmentRegs)>,
    pub vga: Option<(PciBdf, Vec<u8>)>,
    pub handlers: Vec<u8>,
    pub exited: bool,
    pub modes: BTreeMap<u16, [u8; 256]>,
    pub current_mode: Option<u16>,
    post_hook: Option<PostHook>,
    handler_table: BTreeMap<u8, InterruptHandler>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_failing_call(mut self) -> Self {
        self.fail_call = true;
        self
    }

    /// 4F01h reports failure for every mode.
    pub fn with_failing_mode_info(mut self) -> Self {
        self.fail_mode_info = true;
        self
    }

    pub fn with_post_hook(mut self, hook: PostHook) -> Self {
        self.post_hook = Some(hook);
        self
    }

    pub fn with_mode(mut self, mode: u16, width: u16, height: u16, bpp: u8, lfb: u32) -> Self {
        self.add_mode(mode, width, height, bpp, lfb);
        self
    }

    pub fn add_mode(&mut self, mode: u16, width: u16, height: u16, bpp: u8, lfb: u32) {
        let mut block = [0u8; 256];
        block[0..2].copy_from_slice(&0x009Bu16.to_le_bytes());
        block[16..18].copy_from_slice(&(width * u16::from(bpp / 8)).to_le_bytes());
        block[18..20].copy_from_slice(&width.to_le_bytes());
        block[20..22].copy_from_slice(&height.to_le_bytes());
        block[25] = bpp;
        block[27] = 6;
        block[40..44].copy_from_slice(&lfb.to_le_bytes());
        self.modes.insert(mode, block);
    }

    fn vbe(&mut self, regs: &mut RealModeRegs, sregs: &SegmentRegs) {
        match regs.ax() {
            0x4F02 => {
                let mode = regs.bx() & 0x3FFF;
                if self.modes.contains_key(&mode) {
                    self.current_mode = Some(mode);
                    regs.set_ax(0x004F);
                } else {
                    regs.set_ax(0x014F);
                }
            }
            0x4F01 => {
                if self.fail_mode_info {
                    regs.set_ax(0x014F);
                    return;
                }
                let mode = regs.cx() & 0x3FFF;
                let Some(block) = self.modes.get(&mode).copied() else {
                    regs.set_ax(0x014F);
                    return;
                };
                let dest = SegmentRegs::seg_off(sregs.es, regs.di()) as usize;
                self.memory[dest..dest + block.len()].copy_from_slice(&block);
                regs.set_ax(0x004F);
            }
            _ => regs.set_ax(0x0100),
        }
    }
}

impl RealModeExecutor for FakeExecutor {
    fn init(&mut self, base_memory: u32, size: u32, flags: u32) -> Result<(), ExecutorError> {
        if self.fail_init {
            return Err(ExecutorError::OutOfMemory { requested: size });
        }
        self.init_args = Some((base_memory, size, flags));
        self.memory = vec![0; size as usize];
        self.exited = false;
        Ok(())
    }

    fn set_vga(&mut self, bdf: PciBdf, image: &[u8]) {
        self.vga = Some((bdf, image.to_vec()));
    }

    fn call_far(
        &mut self,
        seg: u16,
        off: u16,
        regs: &mut RealModeRegs,
        _sregs: &mut SegmentRegs,
    ) -> Result<(), ExecutorError> {
        self.far_calls.push((seg, off, *regs));
        if self.fail_call {
            return Err(ExecutorError::Fault { cs: seg, ip: off });
        }
        if let (Some(hook), Some((_, image))) = (self.post_hook.as_mut(), self.vga.as_mut()) {
            hook(image.as_mut_slice(), regs);
        }
        Ok(())
    }

    fn int86(
        &mut self,
        vector: u8,
        regs: &mut RealModeRegs,
        sregs: &mut SegmentRegs,
    ) -> Result<(), ExecutorError> {
        self.interrupts.push((vector, *regs, *sregs));
        if let Some(handler) = self.handler_table.get_mut(&vector) {
            if handler(regs) {
                return Ok(());
            }
        }
        if vector != 0x10 {
            return Err(ExecutorError::Other(format!(
                "INT {vector:02x}h is not emulated"
            )));
        }
        self.vbe(regs, sregs);
        Ok(())
    }

    fn get_vga(&mut self, image: &mut [u8]) {
        if let Some((_, shadow)) = &self.vga {
            let len = image.len().min(shadow.len());
            image[..len].copy_from_slice(&shadow[..len]);
        }
    }

    fn read_memory(&self, offset: u32, buf: &mut [u8]) {
        let start = offset as usize;
        buf.copy_from_slice(&self.memory[start..start + buf.len()]);
    }

    fn set_interrupt_handler(&mut self, vector: u8, handler: InterruptHandler) {
        self.handlers.push(vector);
        self.handler_table.insert(vector, handler);
    }

    fn exit(&mut self) {
        self.exited = true;
        self.memory = Vec::new();
    }
}

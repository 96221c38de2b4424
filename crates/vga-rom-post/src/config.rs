use serde::{Deserialize, Serialize};

/// Largest option ROM image the card is expected to expose (128 KiB).
pub const MAX_ROM_LEN: u32 = 128 * 1024;

/// Legacy video BIOS POST entry point, `C000:0003`.
pub const POST_ENTRY_SEGMENT: u16 = 0xC000;
pub const POST_ENTRY_OFFSET: u16 = 0x0003;

/// Tunables for a POST run.
///
/// The defaults match a PC-compatible video BIOS; boards that need different values can load
/// overrides from their own configuration store (any serde format), missing keys keep their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    /// Minimum decoded BAR window size accepted for mapping the ROM, in bytes.
    pub max_rom_len: u32,
    /// Delay after enabling the ROM decoder before the image is read.
    pub settle_delay_us: u32,
    /// Base of the executor's emulated real-mode memory.
    pub executor_base: u32,
    /// Size of the executor's emulated real-mode memory.
    pub executor_mem_size: u32,
    /// Linear offset in executor memory used as the VBE mode-info staging buffer. The 256-byte
    /// block must end at or below 1 MiB so ES:DI can address it.
    pub vbe_staging_offset: u32,
    pub post_entry_segment: u16,
    pub post_entry_offset: u16,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            max_rom_len: MAX_ROM_LEN,
            settle_delay_us: 1,
            executor_base: 0,
            executor_mem_size: 64 * 1024,
            vbe_staging_offset: 0x2000,
            post_entry_segment: POST_ENTRY_SEGMENT,
            post_entry_offset: POST_ENTRY_OFFSET,
        }
    }
}

//! Video option ROM POST for PCI/AGP display controllers.
//!
//! Before an OS driver exists, the only code that knows how to initialize a video card is the
//! BIOS in its option ROM. This crate locates that ROM over PCI configuration space, copies it
//! out through a borrowed BAR window, validates it, and runs its POST entry point on a
//! caller-provided real-mode executor. Afterwards it can select a VBE mode for an early
//! framebuffer console.
//!
//! Platform services are consumed through traits:
//! - [`pci::PciConfigSpace`] for configuration-space access,
//! - [`mapper::BusWindowMapper`] for reaching device memory (see [`mmio`] for the
//!   identity-mapped implementation),
//! - [`executor::RealModeExecutor`] for the x86 interpreter.
//!
//! Only one controller is supported per boot.

pub mod config;
pub mod error;
pub mod executor;
pub mod image;
pub mod mapper;
pub mod mmio;
pub mod pci;
pub mod realmode;
pub mod session;
pub mod vbe;
pub mod window;

pub use config::PostConfig;
pub use error::{ExecutorError, PostError, Result};
pub use executor::{InterruptHandler, RealModeExecutor};
pub use image::RomImage;
pub use mapper::{BarSnapshot, BusWindowMapper, RomMapping, RomWindow};
pub use pci::{PciBdf, PciConfigSpace};
pub use realmode::{RealModeRegs, SegmentRegs};
pub use session::{
    boot_device_firmware, run_post, DispatchState, PostOutcome, PostReport, PostRequest,
    PostSession,
};
pub use vbe::{VbeModeFlags, VbeModeInfo};

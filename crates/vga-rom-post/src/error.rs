use thiserror::Error;

use crate::pci::PciBdf;

pub type Result<T> = std::result::Result<T, PostError>;

/// Failure reported by a [`crate::executor::RealModeExecutor`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("not enough memory for the executor context ({requested} bytes requested)")]
    OutOfMemory { requested: u32 },

    #[error("real-mode code faulted at {cs:04x}:{ip:04x}")]
    Fault { cs: u16, ip: u16 },

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the option ROM POST path.
///
/// None of these are fatal to the boot: the caller decides whether to try another device,
/// supply its own image, or continue without a display.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostError {
    #[error("{bdf}: no memory BAR can hold a {required} byte ROM window")]
    NoSuitableWindow { bdf: PciBdf, required: u32 },

    #[error("{bdf}: failed to map ROM window at bus address {bus_addr:#010x}")]
    MapFailed { bdf: PciBdf, bus_addr: u32 },

    #[error("video ROM image is invalid: {0}")]
    InvalidImage(&'static str),

    #[error("out of memory copying a {len} byte video ROM")]
    AllocationFailed { len: usize },

    #[error("real-mode executor initialization failed")]
    ExecutorInitFailed(#[source] ExecutorError),

    #[error("real-mode dispatch failed")]
    DispatchFailed(#[source] ExecutorError),

    #[error("VBE function {function:#06x} failed with status {status:#06x}")]
    VbeCallFailed { function: u16, status: u16 },

    #[error("VBE staging buffer at {offset:#x} is outside the first megabyte")]
    StagingOutOfRange { offset: u32 },
}

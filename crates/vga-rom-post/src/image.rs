//! Option ROM image ownership and validation.

use tracing::{debug, warn};

use crate::config::PostConfig;
use crate::error::{PostError, Result};
use crate::mapper::{map_rom_image, BusWindowMapper};
use crate::pci::{PciBdf, PciConfigSpace};

/// Bytes 0..2 of every PC option ROM.
pub const ROM_SIGNATURE: [u8; 2] = [0x55, 0xAA];
/// Header byte holding the image length in 512-byte units.
pub const ROM_SIZE_BYTE: usize = 2;
pub const ROM_BLOCK_SIZE: usize = 512;

/// A video BIOS image, either supplied by the caller or copied out of the card.
#[derive(Debug)]
pub enum RomImage<'a> {
    /// Caller-owned image. Never copied, never freed here.
    Borrowed(&'a mut [u8]),
    /// Extracted from the device; released with the session.
    Owned(Vec<u8>),
}

impl RomImage<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::Owned(bytes) => bytes,
        }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::Owned(bytes) => bytes,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Length the image declares for itself in its header.
    pub fn declared_len(&self) -> usize {
        declared_len(self.as_bytes())
    }
}

/// Length declared by an option ROM header, `byte[2] * 512`. Zero if the header is truncated.
pub fn declared_len(image: &[u8]) -> usize {
    image
        .get(ROM_SIZE_BYTE)
        .map_or(0, |&blocks| usize::from(blocks) * ROM_BLOCK_SIZE)
}

/// Checks the `55 AA` signature.
pub fn validate_signature(image: &[u8]) -> Result<()> {
    if image.len() < ROM_SIGNATURE.len() || image[..2] != ROM_SIGNATURE {
        return Err(PostError::InvalidImage("missing 55 AA signature"));
    }
    Ok(())
}

/// Returns the image to POST: the caller's if one is given, otherwise a copy extracted from
/// `bdf`'s option ROM.
///
/// The device's BARs are restored before this returns, on success and on failure.
pub fn extract_or_use<'a, P, M>(
    pci: &mut P,
    mapper: &mut M,
    bdf: PciBdf,
    supplied: Option<&'a mut [u8]>,
    config: &PostConfig,
) -> Result<RomImage<'a>>
where
    P: PciConfigSpace + ?Sized,
    M: BusWindowMapper + ?Sized,
{
    let image = match supplied {
        Some(bytes) => {
            debug!(%bdf, len = bytes.len(), "using caller-supplied video ROM");
            RomImage::Borrowed(bytes)
        }
        None => RomImage::Owned(copy_from_device(pci, mapper, bdf, config)?),
    };

    if let Err(err) = validate_signature(image.as_bytes()) {
        warn!(%bdf, "video ROM image is invalid");
        return Err(err);
    }
    Ok(image)
}

fn copy_from_device<P, M>(
    pci: &mut P,
    mapper: &mut M,
    bdf: PciBdf,
    config: &PostConfig,
) -> Result<Vec<u8>>
where
    P: PciConfigSpace + ?Sized,
    M: BusWindowMapper + ?Sized,
{
    let mapping = map_rom_image(pci, mapper, bdf, config)?;

    // Provisional: the BIOS may shrink its declared length while it runs.
    let len = mapping.declared_len();
    let mut copy = match allocate_image(len) {
        Ok(copy) => copy,
        Err(err) => {
            warn!(%bdf, len, "out of memory copying video ROM");
            return Err(err);
        }
    };
    mapping.read(0, &mut copy);
    mapping.unmap();

    debug!(%bdf, len, "copied video ROM out of the device");
    Ok(copy)
}

/// Zeroed buffer of `len` bytes, or `AllocationFailed` if it cannot be reserved.
fn allocate_image(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| PostError::AllocationFailed { len })?;
    buf.resize(len, 0);
    Ok(buf)
}

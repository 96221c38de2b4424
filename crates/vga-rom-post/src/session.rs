//! POST session lifecycle.
//!
//! Bringing a card up is split into three steps so the executor can outlive the POST itself:
//!
//! 1. [`PostSession::setup`] creates the executor's real-mode address space.
//! 2. [`PostSession::run`] extracts (or takes) the ROM image and runs its POST entry point, then
//!    optionally selects a VBE mode.
//! 3. [`PostSession::teardown`] releases the executor and any image copied from the card.
//!
//! A display driver that keeps calling into the video BIOS after boot (VBE services, DDC) holds
//! on to the session instead of tearing it down.
//!
//! Only one controller is supported per boot: the executor shadows a single image at the legacy
//! video BIOS segment.

use tracing::{debug, info, warn};

use crate::config::PostConfig;
use crate::error::{PostError, Result};
use crate::executor::{InterruptHandler, RealModeExecutor};
use crate::image::{extract_or_use, RomImage};
use crate::mapper::BusWindowMapper;
use crate::pci::{PciBdf, PciConfigSpace};
use crate::realmode::{RealModeRegs, SegmentRegs};
use crate::vbe::{set_vesa_mode, VbeModeInfo};

/// Where the real-mode dispatch of the last [`PostSession::run`] got to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DispatchState {
    #[default]
    Idle,
    /// Entry registers built and the executor bound to the device.
    Configured,
    /// Control transferred to the POST entry point.
    Dispatched,
    /// POST returned; the executor can service further real-mode calls.
    Returned,
}

/// Parameters for one POST run.
#[derive(Debug)]
pub struct PostRequest<'a> {
    pub bdf: PciBdf,
    /// Image to run instead of extracting the card's own ROM.
    pub image: Option<&'a mut [u8]>,
    /// VBE mode to select once POST returns.
    pub vesa_mode: Option<u16>,
}

impl<'a> PostRequest<'a> {
    pub fn new(bdf: PciBdf) -> Self {
        Self {
            bdf,
            image: None,
            vesa_mode: None,
        }
    }

    pub fn with_image(mut self, image: &'a mut [u8]) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_vesa_mode(mut self, mode: u16) -> Self {
        self.vesa_mode = Some(mode);
        self
    }
}

/// Result of a successful POST run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostReport {
    /// Image length declared by the ROM header after POST.
    pub image_len: usize,
    /// Register state returned by the POST entry point.
    pub regs: RealModeRegs,
    /// Present only if a VBE mode was requested and set.
    pub mode_info: Option<VbeModeInfo>,
    /// Why the requested VBE mode could not be set. POST itself still succeeded.
    pub mode_error: Option<PostError>,
}

pub struct PostSession<'a, E: RealModeExecutor> {
    executor: E,
    config: PostConfig,
    bdf: PciBdf,
    image: Option<RomImage<'a>>,
    image_len: usize,
    state: DispatchState,
}

impl<'a, E: RealModeExecutor> PostSession<'a, E> {
    /// Initializes `executor` for a POST of `bdf`.
    pub fn setup(bdf: PciBdf, mut executor: E, config: PostConfig) -> Result<Self> {
        info!(
            bus = bdf.bus,
            device = bdf.device,
            function = bdf.function,
            "booting PCI video card"
        );

        executor
            .init(config.executor_base, config.executor_mem_size, 0)
            .map_err(PostError::ExecutorInitFailed)?;

        Ok(Self {
            executor,
            config,
            bdf,
            image: None,
            image_len: 0,
            state: DispatchState::Idle,
        })
    }

    pub fn bdf(&self) -> PciBdf {
        self.bdf
    }

    pub fn config(&self) -> &PostConfig {
        &self.config
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// The image loaded by the last run.
    pub fn image(&self) -> Option<&RomImage<'a>> {
        self.image.as_ref()
    }

    /// Image length as declared by the ROM after the last POST.
    pub fn image_len(&self) -> usize {
        self.image_len
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Runs the video BIOS POST for `request.bdf`.
    ///
    /// Without a supplied image the card's ROM is copied out through a borrowed BAR window;
    /// the card's BARs are back to their previous values before the BIOS is entered.
    ///
    /// Fails only if the image cannot be obtained or the POST call itself fails. A requested
    /// VBE mode that cannot be set is reported in [`PostReport::mode_error`].
    pub fn run<P, M>(
        &mut self,
        pci: &mut P,
        mapper: &mut M,
        request: PostRequest<'a>,
    ) -> Result<PostReport>
    where
        P: PciConfigSpace + ?Sized,
        M: BusWindowMapper + ?Sized,
    {
        let PostRequest {
            bdf,
            image,
            vesa_mode,
        } = request;

        self.state = DispatchState::Idle;
        let image = extract_or_use(pci, mapper, bdf, image, &self.config)?;
        self.bdf = bdf;
        self.image_len = image.len();
        self.image = Some(image);

        let mut regs = self.dispatch_post()?;

        // The BIOS may have rewritten its own header; its declared length is authoritative.
        self.image_len = self.image.as_ref().map_or(0, RomImage::declared_len);
        info!(%bdf, image_len = self.image_len, "video BIOS POST complete");

        let (mode_info, mode_error) = match vesa_mode {
            Some(mode) => match set_vesa_mode(
                &mut self.executor,
                &mut regs,
                mode,
                self.config.vbe_staging_offset,
            ) {
                Ok(info) => (Some(info), None),
                Err(err) => {
                    warn!(%bdf, mode, error = %err, "VBE mode not set; continuing without it");
                    (None, Some(err))
                }
            },
            None => (None, None),
        };

        Ok(PostReport {
            image_len: self.image_len,
            regs,
            mode_info,
            mode_error,
        })
    }

    fn dispatch_post(&mut self) -> Result<RealModeRegs> {
        let Some(image) = self.image.as_mut() else {
            return Err(PostError::InvalidImage("no image loaded"));
        };

        let mut regs = RealModeRegs::default();
        let mut sregs = SegmentRegs::default();
        regs.set_ax(self.bdf.post_ax());
        self.executor.set_vga(self.bdf, image.as_bytes());
        self.state = DispatchState::Configured;

        let (seg, off) = (self.config.post_entry_segment, self.config.post_entry_offset);
        debug!(bdf = %self.bdf, ax = regs.ax(), seg, off, "entering video BIOS POST");
        self.state = DispatchState::Dispatched;
        self.executor
            .call_far(seg, off, &mut regs, &mut sregs)
            .map_err(PostError::DispatchFailed)?;

        self.executor.get_vga(image.as_bytes_mut());
        self.state = DispatchState::Returned;
        Ok(regs)
    }

    /// Issues a software interrupt through the session's executor, e.g. a VBE call from a
    /// display driver long after POST.
    pub fn int86(
        &mut self,
        vector: u8,
        regs: &mut RealModeRegs,
        sregs: &mut SegmentRegs,
    ) -> Result<()> {
        self.executor
            .int86(vector, regs, sregs)
            .map_err(PostError::DispatchFailed)
    }

    /// Overrides a real-mode interrupt vector with a host-side handler.
    pub fn set_interrupt_handler(&mut self, vector: u8, handler: InterruptHandler) {
        self.executor.set_interrupt_handler(vector, handler);
    }

    /// Shuts the executor down and releases the session. An image copied from the card is
    /// freed here; a caller-supplied image is left alone.
    ///
    /// The executor is handed back so it can be reinitialized or dropped by its owner.
    pub fn teardown(mut self) -> E {
        self.executor.exit();
        let owned = self.image.take().is_some_and(|image| image.is_owned());
        debug!(bdf = %self.bdf, released_image = owned, "POST session torn down");
        self.executor
    }
}

/// Result of [`run_post`].
pub struct PostOutcome<'a, E: RealModeExecutor> {
    pub report: PostReport,
    /// The live session, unless it was torn down.
    pub session: Option<PostSession<'a, E>>,
}

/// Runs `request` on `session` and tears it down afterwards if `teardown_after` is set.
///
/// On failure the session is released without further calls into the executor.
pub fn run_post<'a, E, P, M>(
    mut session: PostSession<'a, E>,
    pci: &mut P,
    mapper: &mut M,
    request: PostRequest<'a>,
    teardown_after: bool,
) -> Result<PostOutcome<'a, E>>
where
    E: RealModeExecutor,
    P: PciConfigSpace + ?Sized,
    M: BusWindowMapper + ?Sized,
{
    let report = session.run(pci, mapper, request)?;

    let session = if teardown_after {
        session.teardown();
        None
    } else {
        Some(session)
    };
    Ok(PostOutcome { report, session })
}

/// Sets up a session for `bdf`, POSTs the card's own ROM and, on success, returns the session
/// unless `teardown_after` is set.
pub fn boot_device_firmware<E, P, M>(
    pci: &mut P,
    mapper: &mut M,
    executor: E,
    bdf: PciBdf,
    config: PostConfig,
    teardown_after: bool,
) -> Result<Option<PostSession<'static, E>>>
where
    E: RealModeExecutor,
    P: PciConfigSpace + ?Sized,
    M: BusWindowMapper + ?Sized,
{
    let session = PostSession::setup(bdf, executor, config)?;
    let outcome = run_post(session, pci, mapper, PostRequest::new(bdf), teardown_after)?;
    Ok(outcome.session)
}

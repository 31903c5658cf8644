//! Firmware update manager.
//!
//! Flow: GET image → status + length checks → slot begin → N × 512-byte
//! chunk → finish → mark test boot. The manager never restarts the
//! device; the telemetry channel does that after a reported success.
//!
//! [`confirm_running_image`] is the other half of the contract: it runs
//! once per boot and makes a freshly tested image permanent.

pub mod session;

use core::fmt;

use log::{info, warn};

use crate::app::ports::{BootPort, FirmwareUpdater, ImageSource, SlotPort};
use session::OtaSession;

/// Body bytes moved from the image source to the slot per write.
pub const CHUNK_SIZE: usize = 512;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    InvalidHost,
    Transport,
    MalformedResponse,
    HttpStatus(u16),
    MissingLength,
    EmptyImage,
    Oversize { declared: u32, capacity: u32 },
    Truncated { expected: u32, received: u32 },
    AlreadyInProgress,
    NotReceiving,
    Overflow,
    BeginFailed,
    FlashWrite,
    MarkFailed,
    ConfirmFailed,
    EraseFailed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHost => write!(f, "update host is empty"),
            Self::Transport => write!(f, "image transfer failed"),
            Self::MalformedResponse => write!(f, "malformed HTTP response"),
            Self::HttpStatus(code) => write!(f, "server answered HTTP {}", code),
            Self::MissingLength => write!(f, "response has no Content-Length"),
            Self::EmptyImage => write!(f, "image is empty"),
            Self::Oversize { declared, capacity } => {
                write!(f, "image of {} bytes exceeds slot of {} bytes", declared, capacity)
            }
            Self::Truncated { expected, received } => {
                write!(f, "body ended after {} of {} bytes", received, expected)
            }
            Self::AlreadyInProgress => write!(f, "update already in progress"),
            Self::NotReceiving => write!(f, "no transfer is open"),
            Self::Overflow => write!(f, "body longer than declared length"),
            Self::BeginFailed => write!(f, "could not open secondary slot"),
            Self::FlashWrite => write!(f, "flash write failed"),
            Self::MarkFailed => write!(f, "could not mark image for test boot"),
            Self::ConfirmFailed => write!(f, "could not confirm running image"),
            Self::EraseFailed => write!(f, "could not erase secondary slot"),
        }
    }
}

impl std::error::Error for OtaError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub bytes_written: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The image was on trial and is now permanent.
    Confirmed,
    AlreadyConfirmed,
}

// ── Manager ───────────────────────────────────────────────────

pub struct FirmwareUpdateManager<S, F>
where
    S: ImageSource,
    F: SlotPort + BootPort,
{
    source: S,
    slot: F,
    port: u16,
    path: String,
    session: OtaSession,
}

impl<S, F> FirmwareUpdateManager<S, F>
where
    S: ImageSource,
    F: SlotPort + BootPort,
{
    pub fn new(source: S, slot: F, port: u16, path: impl Into<String>) -> Self {
        Self {
            source,
            slot,
            port,
            path: path.into(),
            session: OtaSession::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn slot(&self) -> &F {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut F {
        &mut self.slot
    }

    /// Open the download and validate the head. Nothing touches the slot
    /// until this returns the image size.
    fn negotiate(&mut self, host: &str) -> Result<u32, OtaError> {
        let head = self.source.open(host, self.port, &self.path)?;
        if head.status != 200 {
            return Err(OtaError::HttpStatus(head.status));
        }
        let declared = head.content_length.ok_or(OtaError::MissingLength)?;
        self.session.begin(declared, self.slot.capacity())?;
        Ok(declared)
    }

    fn stream(&mut self) -> Result<u32, OtaError> {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = self.source.read(&mut chunk)?;
            if n == 0 {
                return self.session.complete();
            }
            self.session.accept(n)?;
            self.slot.write(&chunk[..n])?;
        }
    }

    fn install(&mut self, host: &str) -> Result<u32, OtaError> {
        let declared = self.negotiate(host)?;
        info!("FOTA: downloading {} bytes from {}", declared, host);

        self.slot.begin()?;
        if let Err(e) = self.stream() {
            self.slot.abort();
            return Err(e);
        }
        self.slot.finish()?;

        self.slot.mark_test_boot()?;
        self.session.mark()
    }
}

impl<S, F> FirmwareUpdater for FirmwareUpdateManager<S, F>
where
    S: ImageSource,
    F: SlotPort + BootPort,
{
    fn update(&mut self, host: &str) -> Result<UpdateReport, OtaError> {
        if host.is_empty() {
            return Err(OtaError::InvalidHost);
        }
        self.session.reset();

        let result = self.install(host);
        self.source.close();
        match result {
            Ok(bytes_written) => {
                info!("FOTA: image of {} bytes marked for test boot", bytes_written);
                Ok(UpdateReport { bytes_written })
            }
            Err(e) => {
                warn!("FOTA: update from {} failed: {}", host, e);
                self.session.fail();
                Err(e)
            }
        }
    }
}

// ── Boot confirmation ─────────────────────────────────────────

/// Confirm a freshly booted image and reclaim the slot it replaced.
///
/// Without the confirm the bootloader reverts to the previous image on
/// the next reset.
pub fn confirm_running_image<B: BootPort>(boot: &mut B) -> Result<ConfirmOutcome, OtaError> {
    if boot.is_running_confirmed()? {
        return Ok(ConfirmOutcome::AlreadyConfirmed);
    }
    boot.confirm_running()?;
    boot.erase_secondary()?;
    Ok(ConfirmOutcome::Confirmed)
}

// ── Tests ─────────────────────────────────────────────────────

//! Packet capture abstraction.
//!
//! This module defines the `CaptureSource` trait the runner reads from, and
//! its implementations: live capture on a network interface via pnet,
//! offline replay of a pcap file, and, when a capture filter is set, either
//! of those through libpcap. A source is closed by dropping it.

mod file_capture;
#[cfg(feature = "libpcap")]
mod libpcap_capture;
mod pnet_capture;

pub use file_capture::FileCapture;
#[cfg(feature = "libpcap")]
pub use libpcap_capture::LibpcapCapture;
pub use pnet_capture::PnetCapture;

use crate::config::{CaptureSettings, DeviceSpec};
use crate::error::CaptureError;
use crate::pcap::{Frame, LinkType};

/// A source of captured frames.
///
/// `read_frame` blocks for at most the configured read timeout. Besides
/// real failures it reports two expected conditions:
/// - `CaptureError::Timeout` when no frame arrived in time,
/// - `CaptureError::EndOfStream` when a finite source is exhausted.
pub trait CaptureSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Link type written into output file headers.
    fn link_type(&self) -> LinkType;

    /// Interface name or file path, for logging.
    fn name(&self) -> &str;
}

/// Builds capture sources from settings, so the runner can reopen one after
/// a reload.
pub trait SourceOpener: Send {
    fn open(&self, settings: &CaptureSettings) -> Result<Box<dyn CaptureSource>, CaptureError>;
}

/// Opens a `PnetCapture` for interfaces and a `FileCapture` for `file:`
/// devices. With a capture filter set, both go through `LibpcapCapture`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOpener;

impl SourceOpener for DefaultOpener {
    fn open(&self, settings: &CaptureSettings) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let source = if settings.filter.is_empty() {
            open_unfiltered(settings)?
        } else {
            open_filtered(settings)?
        };

        tracing::info!(
            source = %source.name(),
            link_type = %source.link_type(),
            "opened capture source"
        );
        Ok(source)
    }
}

fn open_unfiltered(settings: &CaptureSettings) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(match settings.device_spec() {
        DeviceSpec::File(path) => Box::new(FileCapture::open(path, settings)?),
        DeviceSpec::Interface(name) => Box::new(PnetCapture::new(name, settings)?),
        DeviceSpec::DefaultInterface => Box::new(PnetCapture::on_default_interface(settings)?),
    })
}

#[cfg(feature = "libpcap")]
fn open_filtered(settings: &CaptureSettings) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(match settings.device_spec() {
        DeviceSpec::File(path) => Box::new(LibpcapCapture::offline(path, settings)?),
        DeviceSpec::Interface(name) => Box::new(LibpcapCapture::live(Some(name), settings)?),
        DeviceSpec::DefaultInterface => Box::new(LibpcapCapture::live(None, settings)?),
    })
}

#[cfg(not(feature = "libpcap"))]
fn open_filtered(settings: &CaptureSettings) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::UnsupportedFilter(settings.filter.clone()))
}

/// Cut `data` to `snaplen` bytes, keeping the wire length.
pub(crate) fn truncate_frame(mut frame: Frame, snaplen: u32) -> Frame {
    if frame.data.len() > snaplen as usize {
        frame.data.truncate(snaplen as usize);
    }
    frame
}

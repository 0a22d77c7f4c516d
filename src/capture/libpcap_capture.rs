//! libpcap-backed capture, used whenever a capture filter is set.
//!
//! The filter expression is compiled and installed by libpcap when the
//! source is opened, so a bad expression fails at startup or reload rather
//! than on the first read.

use std::path::Path;
use std::time::Duration;

use ::pcap::{Activated, Capture, Device};

use super::{truncate_frame, CaptureSource};
use crate::config::CaptureSettings;
use crate::error::CaptureError;
use crate::pcap::{Frame, LinkType};

/// Capture through libpcap on an interface or a capture file.
///
/// Timestamps are the ones libpcap records for each packet: the kernel
/// capture time for live interfaces, the record time for files.
pub struct LibpcapCapture {
    name: String,
    capture: Capture<dyn Activated>,
    link_type: LinkType,
    snaplen: u32,
}

impl LibpcapCapture {
    /// Open a live capture; `None` asks libpcap for its default device.
    pub fn live(device: Option<&str>, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let device = match device {
            Some(name) => Device::from(name),
            None => Device::lookup()
                .map_err(open_error)?
                .ok_or_else(|| {
                    CaptureError::InterfaceNotFound("no suitable interface found".to_string())
                })?,
        };
        let name = device.name.clone();

        let capture = Capture::from_device(device)
            .map_err(open_error)?
            .promisc(settings.promisc)
            .snaplen(i32::try_from(settings.snaplen).unwrap_or(i32::MAX))
            .timeout(i32::try_from(settings.read_timeout_ms).unwrap_or(i32::MAX))
            .open()
            .map_err(open_error)?;

        tracing::info!(
            interface = %name,
            promisc = settings.promisc,
            read_timeout_ms = settings.read_timeout_ms,
            "open interface"
        );
        Self::install(name, capture.into(), settings)
    }

    /// Replay a capture file through libpcap.
    pub fn offline(path: &Path, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let capture = Capture::from_file(path)?;
        tracing::info!(file = %path.display(), "open capture file");
        Self::install(path.display().to_string(), capture.into(), settings)
    }

    fn install(
        name: String,
        mut capture: Capture<dyn Activated>,
        settings: &CaptureSettings,
    ) -> Result<Self, CaptureError> {
        if !settings.filter.is_empty() {
            capture
                .filter(&settings.filter, true)
                .map_err(|e| CaptureError::Filter {
                    expression: settings.filter.clone(),
                    message: e.to_string(),
                })?;
            tracing::info!(filter = %settings.filter, source = %name, "installed capture filter");
        }

        let link_type = LinkType(u32::try_from(capture.get_datalink().0).unwrap_or_default());
        Ok(Self {
            name,
            capture,
            link_type,
            snaplen: settings.snaplen,
        })
    }
}

impl CaptureSource for LibpcapCapture {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let secs = u64::try_from(ts.tv_sec).unwrap_or_default();
                let micros = u32::try_from(ts.tv_usec).unwrap_or_default().min(999_999);
                let frame = Frame {
                    timestamp: Duration::new(secs, micros * 1000),
                    original_len: packet.header.len,
                    data: packet.data.to_vec(),
                };
                Ok(truncate_frame(frame, self.snaplen))
            }
            Err(::pcap::Error::TimeoutExpired) => Err(CaptureError::Timeout),
            Err(::pcap::Error::NoMorePackets) => Err(CaptureError::EndOfStream),
            Err(e) => Err(e.into()),
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn open_error(e: ::pcap::Error) -> CaptureError {
    let msg = e.to_string();
    if msg.contains("ermission") || msg.contains("not permitted") {
        return CaptureError::InsufficientPermissions;
    }
    CaptureError::Libpcap(e)
}

//! pnet-based live capture.

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};

use super::{truncate_frame, CaptureSource};
use crate::config::CaptureSettings;
use crate::error::CaptureError;
use crate::pcap::{Frame, LinkType};

/// Large enough for any frame so the wire length is known before snaplen
/// truncation.
const READ_BUFFER_SIZE: usize = 65536;

/// Live capture on one interface using a pnet datalink channel.
///
/// pnet does not expose kernel capture timestamps. Each frame is stamped
/// with the system clock when `rx.next()` returns, so frames queued in the
/// socket buffer carry the time they were read, not the time they arrived.
/// Use a capture filter (libpcap source) where arrival time matters.
pub struct PnetCapture {
    interface: NetworkInterface,
    rx: Box<dyn DataLinkReceiver>,
    snaplen: u32,
}

impl PnetCapture {
    /// Open a capture on the named interface.
    pub fn new(interface_name: &str, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface_name.to_string()))?;

        Self::open(interface, settings)
    }

    /// Open a capture on the first suitable interface.
    ///
    /// Looks for an interface that is up and not a loopback.
    pub fn on_default_interface(settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or_else(|| {
                CaptureError::InterfaceNotFound("no suitable interface found".to_string())
            })?;

        tracing::info!(interface = %interface.name, "no device is set, using default interface");
        Self::open(interface, settings)
    }

    /// List all available network interfaces.
    pub fn list_interfaces() -> Vec<String> {
        datalink::interfaces()
            .into_iter()
            .map(|iface| {
                let status = if iface.is_up() { "UP" } else { "DOWN" };
                let ips: Vec<_> = iface.ips.iter().map(|ip| ip.to_string()).collect();
                format!(
                    "{}: {} [{}]",
                    iface.name,
                    status,
                    if ips.is_empty() {
                        "no IP".to_string()
                    } else {
                        ips.join(", ")
                    }
                )
            })
            .collect()
    }

    fn open(interface: NetworkInterface, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        // pnet cannot compile BPF expressions.
        if !settings.filter.is_empty() {
            return Err(CaptureError::UnsupportedFilter(settings.filter.clone()));
        }

        let config = Config {
            read_timeout: Some(settings.read_timeout()),
            read_buffer_size: READ_BUFFER_SIZE,
            promiscuous: settings.promisc,
            ..Config::default()
        };

        let rx = match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => return Err(CaptureError::UnsupportedChannel(interface.name.clone())),
            Err(e) => {
                let msg = e.to_string();
                if e.kind() == io::ErrorKind::PermissionDenied
                    || msg.contains("permission")
                    || msg.contains("Operation not permitted")
                {
                    return Err(CaptureError::InsufficientPermissions);
                }
                return Err(CaptureError::ChannelCreation(msg));
            }
        };

        tracing::info!(
            interface = %interface.name,
            promisc = settings.promisc,
            read_timeout_ms = settings.read_timeout_ms,
            "open interface"
        );

        Ok(Self {
            interface,
            rx,
            snaplen: settings.snaplen,
        })
    }
}

impl CaptureSource for PnetCapture {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        match self.rx.next() {
            Ok(packet) => {
                Ok(truncate_frame(
                    Frame::new(read_time(), packet.to_vec()),
                    self.snaplen,
                ))
            }
            Err(e) if is_timeout(&e) => Err(CaptureError::Timeout),
            Err(e) => Err(CaptureError::Io(e)),
        }
    }

    fn link_type(&self) -> LinkType {
        // Channel::Ethernet is the only channel type accepted in open().
        LinkType::ETHERNET
    }

    fn name(&self) -> &str {
        &self.interface.name
    }
}

/// Read time, not arrival time.
fn read_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

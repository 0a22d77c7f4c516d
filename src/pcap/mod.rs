//! Classic libpcap container format.
//!
//! A 24-byte global header followed by records of a 16-byte header plus
//! payload. Reading goes through `pcap-file`, which accepts either byte
//! order and both timestamp resolutions. Output is always little endian
//! with microsecond timestamps, written by hand so a file that already has
//! a header can be continued.
//!
//! Useful resources:
//! * https://wiki.wireshark.org/Development/LibpcapFileFormat
//! * https://www.tcpdump.org/linktypes.html

mod reader;
mod writer;

pub use reader::{read_header, PcapReader};
pub use writer::PcapWriter;

use std::fmt;
use std::time::Duration;

/// Magic number of a microsecond-resolution file.
pub const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;
pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// LINKTYPE_* value stored in the global header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkType(pub u32);

impl LinkType {
    pub const NULL: LinkType = LinkType(0);
    pub const ETHERNET: LinkType = LinkType(1);
    pub const RAW: LinkType = LinkType(101);
    pub const LINUX_SLL: LinkType = LinkType(113);
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LinkType::NULL => write!(f, "NULL"),
            LinkType::ETHERNET => write!(f, "Ethernet"),
            LinkType::RAW => write!(f, "Raw"),
            LinkType::LINUX_SLL => write!(f, "Linux SLL"),
            LinkType(other) => write!(f, "LinkType({})", other),
        }
    }
}

/// Decoded global header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub big_endian: bool,
    pub nanosecond: bool,
    pub version_major: u16,
    pub version_minor: u16,
    pub snaplen: u32,
    pub link_type: LinkType,
}

/// One captured frame with its capture metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture time since the Unix epoch.
    pub timestamp: Duration,
    /// Length of the frame on the wire; `data` may be shorter.
    pub original_len: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(timestamp: Duration, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            original_len: data.len() as u32,
            data,
        }
    }

    /// Whole seconds of the capture time, used as the rotation clock.
    pub fn unix_secs(&self) -> i64 {
        self.timestamp.as_secs() as i64
    }
}

//! pcap reader on top of `pcap-file`.

use std::io::Read;

use pcap_file::pcap::{PcapHeader, PcapReader as FileReader};
use pcap_file::{Endianness, PcapError, TsResolution};

use super::{FileHeader, Frame, LinkType};

/// Reads records from a pcap stream of either byte order and resolution.
pub struct PcapReader<R: Read> {
    inner: FileReader<R>,
    header: FileHeader,
}

impl<R: Read> PcapReader<R> {
    /// Read and decode the global header.
    pub fn new(inner: R) -> Result<Self, PcapError> {
        let inner = FileReader::new(inner)?;
        let header = file_header(&inner.header());
        Ok(Self { inner, header })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn link_type(&self) -> LinkType {
        self.header.link_type
    }

    /// Next record, or `None` at a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, PcapError> {
        let Some(packet) = self.inner.next_packet() else {
            return Ok(None);
        };
        let packet = packet?;
        Ok(Some(Frame {
            timestamp: packet.timestamp,
            original_len: packet.orig_len,
            data: packet.data.into_owned(),
        }))
    }
}

/// Decode the global header at the start of `r`.
pub fn read_header(r: impl Read) -> Result<FileHeader, PcapError> {
    let reader = FileReader::new(r)?;
    Ok(file_header(&reader.header()))
}

fn file_header(header: &PcapHeader) -> FileHeader {
    FileHeader {
        big_endian: matches!(header.endianness, Endianness::Big),
        nanosecond: matches!(header.ts_resolution, TsResolution::NanoSecond),
        version_major: header.version_major,
        version_minor: header.version_minor,
        snaplen: header.snaplen,
        link_type: LinkType(u32::from(header.datalink)),
    }
}

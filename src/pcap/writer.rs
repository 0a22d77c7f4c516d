//! pcap writer.

use std::io::{self, Write};

use super::{Frame, LinkType, MAGIC_MICROS, VERSION_MAJOR, VERSION_MINOR};

/// Writes a little endian, microsecond-resolution pcap stream.
///
/// The header is written separately so a writer can continue a file that
/// already has one.
pub struct PcapWriter<W: Write> {
    inner: W,
    snaplen: u32,
}

impl<W: Write> PcapWriter<W> {
    /// Wrap `inner`; payloads longer than `snaplen` are truncated.
    pub fn new(inner: W, snaplen: u32) -> Self {
        Self { inner, snaplen }
    }

    pub fn write_header(&mut self, link_type: LinkType) -> io::Result<()> {
        let mut header = [0u8; super::GLOBAL_HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC_MICROS.to_le_bytes());
        header[4..6].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
        header[6..8].copy_from_slice(&VERSION_MINOR.to_le_bytes());
        // thiszone (8..12) and sigfigs (12..16) stay zero: timestamps are UTC.
        header[16..20].copy_from_slice(&self.snaplen.to_le_bytes());
        header[20..24].copy_from_slice(&link_type.0.to_le_bytes());
        self.inner.write_all(&header)
    }

    /// Write one record.
    ///
    /// Seconds are 32 bits on disk; a later timestamp is refused with
    /// `InvalidInput` before anything is written. If writing itself fails
    /// the record may be partially written and the stream should not be
    /// used further.
    pub fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let secs = u32::try_from(frame.timestamp.as_secs()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "timestamp {}s does not fit a pcap record",
                    frame.timestamp.as_secs()
                ),
            )
        })?;
        let caplen = frame.data.len().min(self.snaplen as usize);
        let original_len = frame.original_len.max(frame.data.len() as u32);

        let mut header = [0u8; super::RECORD_HEADER_LEN];
        header[0..4].copy_from_slice(&secs.to_le_bytes());
        header[4..8].copy_from_slice(&frame.timestamp.subsec_micros().to_le_bytes());
        header[8..12].copy_from_slice(&(caplen as u32).to_le_bytes());
        header[12..16].copy_from_slice(&original_len.to_le_bytes());

        self.inner.write_all(&header)?;
        self.inner.write_all(&frame.data[..caplen])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_header_layout() {
        let mut writer = PcapWriter::new(Vec::new(), 65535);
        writer.write_header(LinkType::ETHERNET).unwrap();
        let bytes = writer.into_inner();

        assert_eq!(
            bytes,
            vec![
                0xd4, 0xc3, 0xb2, 0xa1, // magic
                0x02, 0x00, 0x04, 0x00, // version 2.4
                0x00, 0x00, 0x00, 0x00, // thiszone
                0x00, 0x00, 0x00, 0x00, // sigfigs
                0xff, 0xff, 0x00, 0x00, // snaplen
                0x01, 0x00, 0x00, 0x00, // ethernet
            ]
        );
    }

    #[test]
    fn test_record_layout() {
        let mut writer = PcapWriter::new(Vec::new(), 65535);
        let frame = Frame::new(Duration::new(0x0001_5181, 250_000_000), vec![0xaa, 0xbb, 0xcc]);
        writer.write_frame(&frame).unwrap();
        let bytes = writer.into_inner();

        assert_eq!(
            bytes,
            vec![
                0x81, 0x51, 0x01, 0x00, // ts_sec = 86401
                0x90, 0xd0, 0x03, 0x00, // ts_usec = 250000
                0x03, 0x00, 0x00, 0x00, // incl_len
                0x03, 0x00, 0x00, 0x00, // orig_len
                0xaa, 0xbb, 0xcc,
            ]
        );
    }

    #[test]
    fn test_record_truncated_to_snaplen() {
        let mut writer = PcapWriter::new(Vec::new(), 4);
        let frame = Frame::new(Duration::from_secs(1), vec![1, 2, 3, 4, 5, 6]);
        writer.write_frame(&frame).unwrap();
        let bytes = writer.into_inner();

        assert_eq!(bytes.len(), 16 + 4);
        assert_eq!(&bytes[8..12], &4u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &6u32.to_le_bytes());
        assert_eq!(&bytes[16..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_timestamp_past_u32_rejected() {
        let mut writer = PcapWriter::new(Vec::new(), 65535);
        let frame = Frame::new(Duration::from_secs(1 << 32), vec![1, 2, 3]);
        let err = writer.write_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(writer.into_inner().is_empty());

        let mut writer = PcapWriter::new(Vec::new(), 65535);
        let last = Frame::new(Duration::from_secs(u64::from(u32::MAX)), vec![1]);
        writer.write_frame(&last).unwrap();
        assert_eq!(&writer.into_inner()[0..4], &[0xff; 4]);
    }
}

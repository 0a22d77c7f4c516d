//! Offline replay of a pcap file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{truncate_frame, CaptureSource};
use crate::config::CaptureSettings;
use crate::error::CaptureError;
use crate::pcap::{Frame, LinkType, PcapReader};

/// Reads frames from a pcap file in order, then reports `EndOfStream`.
pub struct FileCapture {
    name: String,
    reader: PcapReader<BufReader<File>>,
    snaplen: u32,
}

impl FileCapture {
    pub fn open(path: &Path, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        if !settings.filter.is_empty() {
            return Err(CaptureError::UnsupportedFilter(settings.filter.clone()));
        }

        let file = File::open(path)?;
        let reader = PcapReader::new(BufReader::new(file))?;

        tracing::info!(
            file = %path.display(),
            link_type = %reader.link_type(),
            snaplen = reader.header().snaplen,
            "open capture file"
        );

        Ok(Self {
            name: path.display().to_string(),
            reader,
            snaplen: settings.snaplen,
        })
    }
}

impl CaptureSource for FileCapture {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        match self.reader.next_frame()? {
            Some(frame) => Ok(truncate_frame(frame, self.snaplen)),
            None => Err(CaptureError::EndOfStream),
        }
    }

    fn link_type(&self) -> LinkType {
        self.reader.link_type()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//! Rotating pcap writer.
//!
//! The writer is either Closed (no file) or Open (file handle live, header
//! written or verified). `update` is the only place a file is opened or
//! rotated; `write_packet` only appends to whatever is open.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::WriterError;
use crate::naming::FileNamer;
use crate::pcap::{read_header, Frame, LinkType, PcapWriter};
use crate::rotation::RotationSchedule;

/// An open output file.
struct Session {
    path: PathBuf,
    pcap: PcapWriter<BufWriter<File>>,
}

/// Writes frames into files that are rotated every interval.
pub struct Writer {
    namer: FileNamer,
    schedule: RotationSchedule,
    link_type: LinkType,
    snaplen: u32,
    append: bool,
    /// Start of the current bucket; `None` until the first `update`.
    bucket_start: Option<i64>,
    num_packets: u64,
    session: Option<Session>,
}

impl Writer {
    pub fn new(config: &Config, link_type: LinkType) -> Result<Self, WriterError> {
        Ok(Self {
            namer: FileNamer::from_settings(&config.output)?,
            schedule: RotationSchedule::from_settings(&config.rotation),
            link_type,
            snaplen: config.capture.snaplen,
            append: config.output.append,
            bucket_start: None,
            num_packets: 0,
            session: None,
        })
    }

    /// Packets written to the current file. Reset on rotation.
    pub fn num_packets(&self) -> u64 {
        self.num_packets
    }

    pub fn bucket_start(&self) -> Option<i64> {
        self.bucket_start
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Advance the rotation clock to `ts`, opening or rotating the output
    /// file as needed.
    pub fn update(&mut self, ts: i64) -> Result<(), WriterError> {
        let start = match self.bucket_start {
            None => {
                let start = if self.schedule.is_enabled() {
                    self.schedule.first_bucket_start(ts)
                } else {
                    ts
                };
                self.bucket_start = Some(start);
                start
            }
            Some(last) if self.schedule.should_rotate(ts, last) => {
                self.close()?;
                let next = self.schedule.next_bucket_start(last, ts);
                self.bucket_start = Some(next);
                next
            }
            Some(last) => last,
        };

        if self.session.is_none() {
            self.open_bucket(start)?;
        }
        Ok(())
    }

    /// Append one frame to the open file. Never rotates.
    pub fn write_packet(&mut self, frame: &Frame) -> Result<(), WriterError> {
        let session = self.session.as_mut().ok_or(WriterError::NotOpen)?;
        self.num_packets += 1;
        session
            .pcap
            .write_frame(frame)
            .map_err(|source| WriterError::Write {
                path: session.path.clone(),
                source,
            })
    }

    /// Flush and close the current file. Closing a closed writer is a no-op.
    pub fn close(&mut self) -> Result<(), WriterError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        tracing::info!(
            path = %session.path.display(),
            packets = self.num_packets,
            "capture {} packets",
            self.num_packets
        );

        session.pcap.flush().map_err(|source| WriterError::Write {
            path: session.path.clone(),
            source,
        })
    }

    fn open_bucket(&mut self, bucket_start: i64) -> Result<(), WriterError> {
        let path = self.namer.resolve(bucket_start)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| WriterError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut options = OpenOptions::new();
        if self.append {
            options.read(true).append(true).create(true);
        } else {
            options.write(true).create_new(true);
        }
        let mut file = options.open(&path).map_err(|source| WriterError::Open {
            path: path.clone(),
            source,
        })?;

        let existing_len = file
            .metadata()
            .map_err(|source| WriterError::Open {
                path: path.clone(),
                source,
            })?
            .len();
        if existing_len > 0 {
            self.verify_existing(&mut file, &path)?;
        }

        let mut pcap = PcapWriter::new(BufWriter::new(file), self.snaplen);
        if existing_len == 0 {
            pcap.write_header(self.link_type)
                .map_err(|source| WriterError::Header {
                    path: path.clone(),
                    source,
                })?;
        }

        tracing::info!(
            path = %path.display(),
            bucket_start,
            appended = existing_len > 0,
            "dump packets into a file"
        );

        self.num_packets = 0;
        self.session = Some(Session { path, pcap });
        Ok(())
    }

    /// An appended file must already be a little endian microsecond pcap
    /// file of the same link type, or the records written after it would be
    /// unreadable.
    fn verify_existing(&self, file: &mut File, path: &Path) -> Result<(), WriterError> {
        let incompatible = |reason: String| WriterError::IncompatibleAppend {
            path: path.to_path_buf(),
            reason,
        };

        let header = read_header(file).map_err(|e| incompatible(e.to_string()))?;
        if header.big_endian || header.nanosecond {
            return Err(incompatible(
                "existing file is not little endian with microsecond timestamps".to_string(),
            ));
        }
        if header.link_type != self.link_type {
            return Err(incompatible(format!(
                "existing link type {} differs from {}",
                header.link_type, self.link_type
            )));
        }
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("failed to close writer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UtcOffset;
    use crate::pcap::PcapReader;
    use std::io::BufReader;
    use std::time::Duration;

    fn config_in(dir: &Path, template: &str, interval: i64) -> Config {
        let mut config = Config::default();
        config.output.file_format = dir.join(template).to_string_lossy().into_owned();
        config.rotation.interval = interval;
        config
    }

    fn frame(ts: u64, byte: u8) -> Frame {
        Frame::new(Duration::from_secs(ts), vec![byte; 42])
    }

    fn read_all(path: &Path) -> (LinkType, Vec<Frame>) {
        let mut reader = PcapReader::new(BufReader::new(File::open(path).unwrap())).unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            frames.push(frame);
        }
        (reader.link_type(), frames)
    }

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_update_opens_and_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "test-%Y%m%d%H%M%S.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.update(60).unwrap();
        assert_eq!(writer.bucket_start(), Some(60));
        assert!(dir.path().join("test-19700101000100.pcap").exists());

        writer.update(90).unwrap();
        assert_eq!(writer.bucket_start(), Some(60));
        assert_eq!(file_count(dir.path()), 1);

        writer.update(120).unwrap();
        assert_eq!(writer.bucket_start(), Some(120));
        assert!(dir.path().join("test-19700101000200.pcap").exists());
        assert_eq!(
            writer.current_path(),
            Some(dir.path().join("test-19700101000200.pcap").as_path())
        );
    }

    #[test]
    fn test_rotation_boundary_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "%H%M%S.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.update(86401).unwrap();
        assert_eq!(writer.bucket_start(), Some(86400));

        writer.update(86459).unwrap();
        assert_eq!(writer.bucket_start(), Some(86400));

        writer.update(86460).unwrap();
        assert_eq!(writer.bucket_start(), Some(86460));
        assert_eq!(file_count(dir.path()), 2);
    }

    #[test]
    fn test_interval_zero_opens_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "single-%H%M%S.pcap", 0);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        for ts in (86401..86401 + 7200).step_by(30) {
            writer.update(ts).unwrap();
        }
        assert_eq!(file_count(dir.path()), 1);
        assert!(dir.path().join("single-000001.pcap").exists());
    }

    #[test]
    fn test_daily_buckets_aligned_to_tokyo_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), "%Y%m%d-%H%M.pcap", 86400);
        config.output.timezone = "Asia/Tokyo".to_string();
        config.rotation.utc_offset = UtcOffset::from_seconds(9 * 3600);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        for hour in 0..48 {
            let ts = 86400 + hour * 3600;
            writer.update(ts).unwrap();
            writer.write_packet(&frame(ts as u64, hour as u8)).unwrap();
        }
        writer.close().unwrap();

        assert_eq!(file_count(dir.path()), 3);
        for name in ["19700102-0000.pcap", "19700103-0000.pcap", "19700104-0000.pcap"] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }

        // 86400 (09:00 JST) .. 136800 (23:00 JST) is 15 hours.
        let (_, first) = read_all(&dir.path().join("19700102-0000.pcap"));
        assert_eq!(first.len(), 15);
        let (_, second) = read_all(&dir.path().join("19700103-0000.pcap"));
        assert_eq!(second.len(), 24);
        let (_, third) = read_all(&dir.path().join("19700104-0000.pcap"));
        assert_eq!(third.len(), 9);
    }

    #[test]
    fn test_idle_gap_rotates_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "%H%M%S.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.update(86401).unwrap();
        writer.update(86400 + 600 + 5).unwrap();
        assert_eq!(writer.bucket_start(), Some(86400 + 600));
        assert_eq!(file_count(dir.path()), 2);
    }

    #[test]
    fn test_packet_counter_resets_on_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "%H%M%S.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.update(86401).unwrap();
        for i in 0..5 {
            writer.write_packet(&frame(86401, i)).unwrap();
        }
        assert_eq!(writer.num_packets(), 5);

        writer.update(86460).unwrap();
        assert_eq!(writer.num_packets(), 0);
    }

    #[test]
    fn test_frames_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "out.pcap", 0);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.update(100).unwrap();
        let frames: Vec<_> = (0..10).map(|i| frame(100 + i, i as u8)).collect();
        for f in &frames {
            writer.write_packet(f).unwrap();
        }
        writer.close().unwrap();

        let (link_type, read) = read_all(&dir.path().join("out.pcap"));
        assert_eq!(link_type, LinkType::ETHERNET);
        assert_eq!(read, frames);
    }

    #[test]
    fn test_append_reuses_file_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), "%H%M.pcap", 60);
        config.output.append = true;

        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();
        writer.update(86401).unwrap();
        writer.write_packet(&frame(86401, 1)).unwrap();
        writer.close().unwrap();

        // A second session rotating into the same bucket appends.
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();
        writer.update(86430).unwrap();
        writer.write_packet(&frame(86430, 2)).unwrap();
        writer.close().unwrap();

        let path = dir.path().join("0000.pcap");
        assert_eq!(file_count(dir.path()), 1);
        let (_, frames) = read_all(&path);
        assert_eq!(frames, vec![frame(86401, 1), frame(86430, 2)]);

        let expected_len = 24 + 2 * (16 + 42);
        assert_eq!(fs::metadata(&path).unwrap().len(), expected_len as u64);
    }

    #[test]
    fn test_append_rejects_other_link_type() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), "same.pcap", 0);
        config.output.append = true;

        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();
        writer.update(1).unwrap();
        writer.close().unwrap();

        let mut writer = Writer::new(&config, LinkType::RAW).unwrap();
        assert!(matches!(
            writer.update(1),
            Err(WriterError::IncompatibleAppend { .. })
        ));
        assert!(!writer.is_open());
    }

    #[test]
    fn test_append_into_empty_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), "empty.pcap", 0);
        config.output.append = true;
        File::create(dir.path().join("empty.pcap")).unwrap();

        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();
        writer.update(1).unwrap();
        writer.write_packet(&frame(1, 9)).unwrap();
        writer.close().unwrap();

        let (_, frames) = read_all(&dir.path().join("empty.pcap"));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_without_append_existing_file_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "x.pcap", 0);
        fs::write(dir.path().join("x.pcap"), b"keep me").unwrap();

        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();
        writer.update(1).unwrap();
        assert_eq!(writer.current_path(), Some(dir.path().join("x-1.pcap").as_path()));
        assert_eq!(fs::read(dir.path().join("x.pcap")).unwrap(), b"keep me");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "%Y/%m/%d/%H%M%S.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.update(86401).unwrap();
        assert!(dir.path().join("1970/01/02/000000.pcap").exists());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "c.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        writer.close().unwrap();
        writer.update(86401).unwrap();
        assert!(writer.is_open());
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(!writer.is_open());
    }

    #[test]
    fn test_write_without_update_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "c.pcap", 60);
        let mut writer = Writer::new(&config, LinkType::ETHERNET).unwrap();

        assert!(matches!(
            writer.write_packet(&frame(1, 1)),
            Err(WriterError::NotOpen)
        ));
        assert_eq!(writer.num_packets(), 0);
    }

    #[test]
    fn test_unknown_timezone() {
        let mut config = Config::default();
        config.output.timezone = "Atlantis/Capital".to_string();
        assert!(matches!(
            Writer::new(&config, LinkType::ETHERNET),
            Err(WriterError::Timezone(_))
        ));
    }
}

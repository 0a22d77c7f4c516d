//! End-to-end replay of a capture file into rotated output files.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rotcap::clock::ManualClock;
use rotcap::pcap::{Frame, LinkType, PcapReader, PcapWriter};
use rotcap::{Config, DefaultOpener, Runner, RunnerControl, RunnerError};

fn write_input(path: &Path, link_type: LinkType, frames: &[Frame]) {
    let mut writer = PcapWriter::new(BufWriter::new(File::create(path).unwrap()), 65535);
    writer.write_header(link_type).unwrap();
    for frame in frames {
        writer.write_frame(frame).unwrap();
    }
    writer.flush().unwrap();
}

fn read_output(path: &Path) -> (LinkType, Vec<Frame>) {
    let mut reader = PcapReader::new(BufReader::new(File::open(path).unwrap())).unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_frame().unwrap() {
        frames.push(frame);
    }
    (reader.link_type(), frames)
}

fn frame(secs: u64, micros: u32, len: usize) -> Frame {
    Frame::new(
        Duration::new(secs, micros * 1000),
        (0..len).map(|i| i as u8).collect(),
    )
}

fn replay_config(input: &Path, out: &Path, template: &str) -> Config {
    let mut config = Config::default();
    config.capture.device = format!("file:{}", input.display());
    config.output.file_format = out.join(template).to_string_lossy().into_owned();
    config.rotation.interval = 60;
    config
}

/// Runner on the real opener with the clock pinned, so the update made at
/// end of stream stays inside the last bucket.
fn runner(config: Config, now: i64) -> Runner {
    Runner::with_parts(
        config,
        Box::new(DefaultOpener),
        Box::new(Arc::new(ManualClock::new(now))),
        RunnerControl::new(),
    )
    .unwrap()
}

#[test]
fn replay_rotates_by_packet_time() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.pcap");
    let out = dir.path().join("out");

    let frames = vec![
        frame(86401, 10, 64),
        frame(86420, 20, 64),
        frame(86459, 999_999, 64),
        frame(86460, 0, 128),
        frame(86530, 5, 256),
    ];
    write_input(&input, LinkType::ETHERNET, &frames);

    let mut runner = runner(replay_config(&input, &out, "%Y%m%d/%H%M%S.pcap"), 86530);
    runner.run().unwrap();

    let day = out.join("19700102");
    let mut names: Vec<_> = fs::read_dir(&day)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["000000.pcap", "000100.pcap", "000200.pcap"]);

    let (link_type, first) = read_output(&day.join("000000.pcap"));
    assert_eq!(link_type, LinkType::ETHERNET);
    assert_eq!(first, frames[..3]);
    assert_eq!(read_output(&day.join("000100.pcap")).1, frames[3..4]);
    assert_eq!(read_output(&day.join("000200.pcap")).1, frames[4..]);
}

#[test]
fn replay_keeps_link_type_and_applies_snaplen() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.pcap");
    let out = dir.path().join("out");
    write_input(&input, LinkType::RAW, &[frame(86401, 0, 1500)]);

    let mut config = replay_config(&input, &out, "raw-%H%M.pcap");
    config.capture.snaplen = 96;
    let mut runner = runner(config, 86401);
    runner.run().unwrap();

    let (link_type, frames) = read_output(&out.join("raw-0000.pcap"));
    assert_eq!(link_type, LinkType::RAW);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data.len(), 96);
    assert_eq!(frames[0].original_len, 1500);
}

#[test]
fn replay_with_zero_sampling_writes_headers_only() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.pcap");
    let out = dir.path().join("out");
    write_input(
        &input,
        LinkType::ETHERNET,
        &[frame(86401, 0, 60), frame(86402, 0, 60), frame(86461, 0, 60)],
    );

    let mut config = replay_config(&input, &out, "%H%M.pcap");
    config.sampling.rate = 0.0;
    let mut runner = runner(config, 86461);
    runner.run().unwrap();

    for name in ["0000.pcap", "0001.pcap"] {
        let path = out.join(name);
        assert_eq!(fs::metadata(&path).unwrap().len(), 24);
        assert!(read_output(&path).1.is_empty());
    }
}

#[test]
fn replay_of_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = replay_config(&dir.path().join("absent.pcap"), dir.path(), "%H%M.pcap");
    let mut runner = runner(config, 86401);

    assert!(matches!(runner.run(), Err(RunnerError::Source(_))));
}

#[test]
fn replay_twice_without_append_picks_new_names() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.pcap");
    let out = dir.path().join("out");
    write_input(&input, LinkType::ETHERNET, &[frame(86401, 0, 60)]);

    for _ in 0..2 {
        let mut runner = runner(replay_config(&input, &out, "%H%M.pcap"), 86401);
        runner.run().unwrap();
    }

    assert_eq!(read_output(&out.join("0000.pcap")).1.len(), 1);
    assert_eq!(read_output(&out.join("0000-1.pcap")).1.len(), 1);
}

#[test]
fn replay_twice_with_append_extends_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.pcap");
    let out = dir.path().join("out");
    write_input(&input, LinkType::ETHERNET, &[frame(86401, 0, 60)]);

    for _ in 0..2 {
        let mut config = replay_config(&input, &out, "%H%M.pcap");
        config.output.append = true;
        let mut runner = runner(config, 86401);
        runner.run().unwrap();
    }

    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    assert_eq!(read_output(&out.join("0000.pcap")).1.len(), 2);
}

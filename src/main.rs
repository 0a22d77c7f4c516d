//! rotcapd - rotating packet capture daemon.
//!
//! Captures from an interface (or replays a capture file) into pcap files
//! rotated every interval. SIGHUP reloads the config file, SIGINT and SIGTERM
//! stop after the current frame.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rotcap::capture::PnetCapture;
use rotcap::config::UtcOffset;
use rotcap::{logging, spawn_signal_listener, Config, Runner};

const EXIT_CONFIG: u8 = 1;
const EXIT_RUNTIME: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "rotcapd")]
#[command(about = "Capture packets into time-rotated pcap files")]
#[command(version)]
struct Args {
    /// TOML configuration file; reloaded on SIGHUP
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to capture on, or file:<path> to replay a capture file
    #[arg(short = 'i', long, conflicts_with = "config")]
    device: Option<String>,

    /// Bytes kept per frame
    #[arg(short, long, conflicts_with = "config")]
    snaplen: Option<u32>,

    /// Do not put the interface into promiscuous mode
    #[arg(short = 'p', long, conflicts_with = "config")]
    no_promisc: bool,

    /// Read timeout in milliseconds
    #[arg(short = 't', long, conflicts_with = "config")]
    read_timeout_ms: Option<u64>,

    /// Capture filter expression
    #[arg(short, long, conflicts_with = "config")]
    filter: Option<String>,

    /// Output file name template (strftime tokens)
    #[arg(short = 'w', long, conflicts_with = "config")]
    file_format: Option<String>,

    /// Append to an existing output file instead of picking a new name
    #[arg(short, long, conflicts_with = "config")]
    append: bool,

    /// Timezone used to expand the file name template (e.g. Asia/Tokyo)
    #[arg(short = 'z', long, conflicts_with = "config")]
    timezone: Option<String>,

    /// Rotation interval in seconds, 0 disables rotation
    #[arg(short = 'T', long, conflicts_with = "config")]
    interval: Option<i64>,

    /// Shift of rotation boundaries in seconds
    #[arg(long, conflicts_with = "config")]
    offset: Option<i64>,

    /// Align rotation boundaries to this UTC offset (e.g. +09:00)
    #[arg(long, conflicts_with = "config", allow_hyphen_values = true)]
    utc_offset: Option<UtcOffset>,

    /// Probability of keeping a frame, in [0, 1]
    #[arg(long, conflicts_with = "config")]
    sampling: Option<f64>,

    /// Rotate on the system clock instead of frame timestamps
    #[arg(short = 'S', long, conflicts_with = "config")]
    use_system_time: bool,

    /// Log filter directive (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List network interfaces and exit
    #[arg(long)]
    list_interfaces: bool,
}

impl Args {
    /// Configuration built from flags alone.
    fn to_config(&self) -> Config {
        let mut config = Config::default();

        let capture = &mut config.capture;
        if let Some(device) = &self.device {
            capture.device = device.clone();
        }
        if let Some(snaplen) = self.snaplen {
            capture.snaplen = snaplen;
        }
        capture.promisc = !self.no_promisc;
        if let Some(ms) = self.read_timeout_ms {
            capture.read_timeout_ms = ms;
        }
        if let Some(filter) = &self.filter {
            capture.filter = filter.clone();
        }

        let output = &mut config.output;
        if let Some(file_format) = &self.file_format {
            output.file_format = file_format.clone();
        }
        output.append = self.append;
        if let Some(timezone) = &self.timezone {
            output.timezone = timezone.clone();
        }

        let rotation = &mut config.rotation;
        if let Some(interval) = self.interval {
            rotation.interval = interval;
        }
        if let Some(offset) = self.offset {
            rotation.offset = offset;
        }
        if let Some(utc_offset) = self.utc_offset {
            rotation.utc_offset = utc_offset;
        }
        rotation.use_system_time = self.use_system_time;

        if let Some(rate) = self.sampling {
            config.sampling.rate = rate;
        }

        config
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => self.to_config(),
        };

        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }

        config.check().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.list_interfaces {
        for line in PnetCapture::list_interfaces() {
            println!("{}", line);
        }
        return ExitCode::SUCCESS;
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let _guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

fn run(config: Config) -> Result<()> {
    tracing::info!("Starting rotcapd");
    if let Some(path) = &config.path {
        tracing::info!("Config path: {:?}", path);
    }
    config.log_summary();

    let mut runner = Runner::new(config).context("failed to set up capture")?;
    spawn_signal_listener(runner.control()).context("failed to install signal handlers")?;

    runner.run().context("capture stopped")?;

    tracing::info!("rotcapd stopped");
    Ok(())
}

//! Daemon configuration.
//!
//! A `Config` is an immutable snapshot: it is loaded from a TOML file (or
//! built from command-line flags), validated once, and replaced wholesale on
//! reload. Every section has an explicit `Default` so a file only needs the
//! keys it changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, ConfigViolation};
use crate::naming::is_valid_template;

const DEFAULT_SNAPLEN: u32 = 65535;
const MAX_SNAPLEN: u32 = 262144;
const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
const MAX_READ_TIMEOUT_MS: u64 = 500;
const DEFAULT_FILE_FORMAT: &str = "pcap/%Y%m%d/%Y%m%d-%H%M%S.pcap";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_INTERVAL: i64 = 60;
/// A hundred years; bucket starts stay within what chrono can name.
const MAX_INTERVAL: i64 = 100 * 366 * 86400;
const DEFAULT_REPORT_EVERY: u64 = 10000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix of a device string that selects offline replay of a pcap file.
pub const FILE_DEVICE_PREFIX: &str = "file:";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// File this configuration was loaded from; reload reads it again.
    #[serde(skip)]
    pub path: Option<PathBuf>,
    pub capture: CaptureSettings,
    pub output: OutputSettings,
    pub rotation: RotationSettings,
    pub sampling: SamplingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureSettings {
    /// Interface name, `file:<path>` for offline replay, or empty for the
    /// first interface that is up and not a loopback.
    pub device: String,
    pub snaplen: u32,
    pub promisc: bool,
    pub read_timeout_ms: u64,
    pub filter: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: String::new(),
            snaplen: DEFAULT_SNAPLEN,
            promisc: true,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            filter: String::new(),
        }
    }
}

/// Where frames come from, as selected by `capture.device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec<'a> {
    DefaultInterface,
    Interface(&'a str),
    File(&'a Path),
}

impl CaptureSettings {
    pub fn device_spec(&self) -> DeviceSpec<'_> {
        if let Some(path) = self.device.strip_prefix(FILE_DEVICE_PREFIX) {
            DeviceSpec::File(Path::new(path))
        } else if self.device.is_empty() {
            DeviceSpec::DefaultInterface
        } else {
            DeviceSpec::Interface(&self.device)
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// strftime template for output paths, expanded with the bucket start.
    pub file_format: String,
    /// Reopen existing files for append instead of picking a `-N` suffix.
    pub append: bool,
    /// IANA timezone used to expand `file_format`.
    pub timezone: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            file_format: DEFAULT_FILE_FORMAT.to_string(),
            append: false,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl OutputSettings {
    pub fn location(&self) -> Option<Tz> {
        self.timezone.parse::<Tz>().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationSettings {
    /// Seconds per bucket; 0 writes a single file.
    pub interval: i64,
    /// Legacy non-negative shift of bucket boundaries, in seconds.
    pub offset: i64,
    /// Signed UTC offset (`+09:00`) aligning boundaries to local time.
    pub utc_offset: UtcOffset,
    /// Rotate on the system clock instead of packet timestamps.
    pub use_system_time: bool,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            offset: 0,
            utc_offset: UtcOffset::default(),
            use_system_time: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingSettings {
    /// Probability of keeping a captured frame, in `[0, 1]`.
    pub rate: f64,
    /// Captured frames between two sampling reports.
    pub report_every: u64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            report_every: DEFAULT_REPORT_EVERY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Signed offset from UTC, stored in seconds.
///
/// Written as `+HH:MM`, `-HH:MM`, `+HHMM`, `+HH` or `Z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UtcOffset(i64);

impl UtcOffset {
    pub fn from_seconds(secs: i64) -> Self {
        Self(secs)
    }

    pub fn seconds(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for UtcOffset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("z") {
            return Ok(Self(0));
        }

        let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
            (1, rest)
        } else if let Some(rest) = s.strip_prefix('-') {
            (-1, rest)
        } else {
            return Err(format!("utc offset must start with '+' or '-': {}", s));
        };

        let (hours, minutes) = match rest.split_once(':') {
            Some(parts) => parts,
            None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
            None if rest.len() <= 2 => (rest, "0"),
            None => return Err(format!("malformed utc offset: {}", s)),
        };

        let hours: i64 = hours
            .parse()
            .map_err(|_| format!("malformed utc offset hours: {}", s))?;
        let minutes: i64 = minutes
            .parse()
            .map_err(|_| format!("malformed utc offset minutes: {}", s))?;
        if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
            return Err(format!("utc offset out of range: {}", s));
        }

        Ok(Self(sign * (hours * 3600 + minutes * 60)))
    }
}

impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        let abs = self.0.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
    }
}

impl<'de> Deserialize<'de> for UtcOffset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// Returns `EmptyPath`, `NotFound`, `Read`, `Parse` or `Invalid`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.path = Some(path.to_path_buf());
        config.check()?;

        Ok(config)
    }

    /// Every field-level problem with this configuration. Empty when valid.
    pub fn validate(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();

        let capture = &self.capture;
        if capture.snaplen == 0 || capture.snaplen > MAX_SNAPLEN {
            violations.push(ConfigViolation::new(
                "capture.snaplen",
                format!("must be within 1..={}, got {}", MAX_SNAPLEN, capture.snaplen),
            ));
        }
        if capture.read_timeout_ms == 0 || capture.read_timeout_ms > MAX_READ_TIMEOUT_MS {
            violations.push(ConfigViolation::new(
                "capture.read_timeout_ms",
                format!(
                    "must be within 1..={}, got {}",
                    MAX_READ_TIMEOUT_MS, capture.read_timeout_ms
                ),
            ));
        }
        if let DeviceSpec::File(path) = capture.device_spec() {
            if path.as_os_str().is_empty() {
                violations.push(ConfigViolation::new("capture.device", "file: needs a path"));
            }
        }

        let output = &self.output;
        if output.file_format.is_empty() {
            violations.push(ConfigViolation::new("output.file_format", "must not be empty"));
        } else if output.file_format.ends_with('/') {
            violations.push(ConfigViolation::new(
                "output.file_format",
                format!("must name a file, not a directory: {}", output.file_format),
            ));
        } else if !is_valid_template(&output.file_format) {
            violations.push(ConfigViolation::new(
                "output.file_format",
                format!("unsupported strftime token in {}", output.file_format),
            ));
        }
        if output.location().is_none() {
            violations.push(ConfigViolation::new(
                "output.timezone",
                format!("unknown timezone: {}", output.timezone),
            ));
        }

        let rotation = &self.rotation;
        if !(0..=MAX_INTERVAL).contains(&rotation.interval) {
            violations.push(ConfigViolation::new(
                "rotation.interval",
                format!(
                    "must be within 0..={}, got {}",
                    MAX_INTERVAL, rotation.interval
                ),
            ));
        }
        if rotation.offset < 0 {
            violations.push(ConfigViolation::new(
                "rotation.offset",
                format!("must not be negative, got {}", rotation.offset),
            ));
        }
        if rotation.offset != 0 && !rotation.utc_offset.is_zero() {
            violations.push(ConfigViolation::new(
                "rotation.utc_offset",
                "cannot be combined with rotation.offset",
            ));
        }

        let sampling = &self.sampling;
        if !(0.0..=1.0).contains(&sampling.rate) {
            violations.push(ConfigViolation::new(
                "sampling.rate",
                format!("must be within [0, 1], got {}", sampling.rate),
            ));
        }
        if sampling.report_every == 0 {
            violations.push(ConfigViolation::new("sampling.report_every", "must be at least 1"));
        }

        if EnvFilter::try_new(&self.logging.level).is_err() {
            violations.push(ConfigViolation::new(
                "logging.level",
                format!("invalid filter directive: {}", self.logging.level),
            ));
        }

        violations
    }

    /// `validate` as a `Result`.
    pub fn check(&self) -> Result<(), ConfigError> {
        let violations = self.validate();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(violations))
        }
    }

    pub fn log_summary(&self) {
        let c = &self.capture;
        tracing::info!(
            device = %c.device,
            snaplen = c.snaplen,
            promisc = c.promisc,
            read_timeout_ms = c.read_timeout_ms,
            filter = %c.filter,
            "capture settings"
        );
        let o = &self.output;
        tracing::info!(
            file_format = %o.file_format,
            append = o.append,
            timezone = %o.timezone,
            "output settings"
        );
        let r = &self.rotation;
        let time_source = if r.use_system_time { "system" } else { "packet" };
        tracing::info!(
            interval = r.interval,
            offset = r.offset,
            utc_offset = %r.utc_offset,
            time_source,
            "rotation settings"
        );
        tracing::info!(rate = self.sampling.rate, "sampling settings");
    }
}

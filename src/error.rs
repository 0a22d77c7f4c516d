//! Error types for each layer of the daemon.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single invalid configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Dotted field name, e.g. `rotation.interval`.
    pub field: &'static str,
    /// What is wrong with the value.
    pub message: String,
}

impl ConfigViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config file is set")]
    EmptyPath,

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {}", join_violations(.0))]
    Invalid(Vec<ConfigViolation>),
}

impl ConfigError {
    /// Field-level violations, empty for non-validation errors.
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            ConfigError::Invalid(v) => v,
            _ => &[],
        }
    }
}

/// Errors from a capture source.
///
/// `Timeout` and `EndOfStream` are the two expected outcomes of a read; the
/// runner matches on them and treats every other variant as fatal.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("read timed out")]
    Timeout,

    #[error("end of capture stream")]
    EndOfStream,

    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("insufficient permissions to capture (try running as root or with CAP_NET_RAW)")]
    InsufficientPermissions,

    #[error("failed to create datalink channel: {0}")]
    ChannelCreation(String),

    #[error("unsupported channel type on {0}")]
    UnsupportedChannel(String),

    #[error("capture filters are not supported by this source: {0}")]
    UnsupportedFilter(String),

    #[error("invalid capture filter {expression:?}: {message}")]
    Filter { expression: String, message: String },

    #[cfg(feature = "libpcap")]
    #[error("libpcap error: {0}")]
    Libpcap(#[from] ::pcap::Error),

    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed capture file: {0}")]
    Format(#[from] pcap_file::PcapError),
}

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("unknown timezone: {0}")]
    Timezone(String),

    #[error("cannot expand file name template: {0}")]
    Template(String),

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write pcap header to {path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot append to {path}: {reason}")]
    IncompatibleAppend { path: PathBuf, reason: String },

    #[error("failed to write packet to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writer has no open file")]
    NotOpen,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no config file to reload from")]
    NoConfigPath,

    #[error("failed to set up capture source: {0}")]
    Source(#[source] CaptureError),

    #[error("failed to set up writer: {0}")]
    Setup(#[source] WriterError),

    #[error("failed to update writer: {0}")]
    Rotate(#[source] WriterError),

    #[error("failed to read packet: {0}")]
    Read(#[source] CaptureError),

    #[error("failed to write packet: {0}")]
    Write(#[source] WriterError),
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("log file path has no file name: {0}")]
    InvalidFile(PathBuf),

    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

//! rotcap - rotating packet capture.
//!
//! Frames are read from a live interface or a capture file and written into
//! pcap files that rotate at fixed, offset-aligned intervals. File names are
//! strftime templates expanded in a configured timezone. Frames can be
//! sampled, and the daemon reloads its configuration on SIGHUP.

pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod pcap;
pub mod rotation;
pub mod runner;
pub mod sampler;
pub mod writer;

pub use capture::{CaptureSource, DefaultOpener, SourceOpener};
pub use config::Config;
pub use error::{CaptureError, ConfigError, RunnerError, WriterError};
pub use runner::{spawn_signal_listener, Runner, RunnerControl};
pub use writer::Writer;

//! The capture loop.
//!
//! Each iteration reads one frame, advances the writer's rotation clock,
//! then writes the frame if the sampler keeps it. Reload and exit requests
//! arrive through `RunnerControl` and are polled at the top of the loop.

mod control;

pub use control::{spawn_signal_listener, RunnerControl};

use std::sync::Arc;

use crate::capture::{CaptureSource, DefaultOpener, SourceOpener};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CaptureError, RunnerError};
use crate::sampler::Sampler;
use crate::writer::Writer;

enum Flow {
    Continue,
    Stop,
}

/// Owns the capture source and the writer, and drives one from the other.
pub struct Runner {
    config: Arc<Config>,
    control: RunnerControl,
    opener: Box<dyn SourceOpener>,
    clock: Box<dyn Clock>,
    sampler: Sampler,
    source: Option<Box<dyn CaptureSource>>,
    writer: Option<Writer>,
}

impl Runner {
    /// Runner capturing from the configured device on the system clock.
    pub fn new(config: Config) -> Result<Self, RunnerError> {
        Self::with_parts(
            config,
            Box::new(DefaultOpener),
            Box::new(SystemClock),
            RunnerControl::new(),
        )
    }

    pub fn with_parts(
        config: Config,
        opener: Box<dyn SourceOpener>,
        clock: Box<dyn Clock>,
        control: RunnerControl,
    ) -> Result<Self, RunnerError> {
        config.check()?;

        Ok(Self {
            sampler: Sampler::from_settings(&config.sampling),
            config: Arc::new(config),
            control,
            opener,
            clock,
            source: None,
            writer: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle for requesting reload or exit from another thread.
    pub fn control(&self) -> RunnerControl {
        self.control.clone()
    }

    /// Run until an exit request, the end of a finite source, or a fatal
    /// error. The source and writer are closed on every path.
    pub fn run(&mut self) -> Result<(), RunnerError> {
        let result = self.run_loop();
        let closed = self.close();
        match (result, closed) {
            (Err(e), Err(close_err)) => {
                tracing::warn!("failed to close writer after error: {}", close_err);
                Err(e)
            }
            (result, closed) => result.and(closed),
        }
    }

    fn run_loop(&mut self) -> Result<(), RunnerError> {
        while !self.control.exit_requested() {
            if self.control.take_reload() {
                if let Err(e) = self.reload() {
                    tracing::error!("Failed to reload configuration: {}", e);
                }
            }

            if let Flow::Stop = self.step()? {
                return Ok(());
            }
        }

        tracing::info!("exit requested, stopping capture");
        Ok(())
    }

    fn step(&mut self) -> Result<Flow, RunnerError> {
        let source = match self.source.take() {
            Some(source) => source,
            None => self
                .opener
                .open(&self.config.capture)
                .map_err(RunnerError::Source)?,
        };
        let source = self.source.insert(source);

        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => Writer::new(&self.config, source.link_type()).map_err(RunnerError::Setup)?,
        };
        let writer = self.writer.insert(writer);

        let read = source.read_frame();
        let ts = match &read {
            Ok(frame) if !self.config.rotation.use_system_time => frame.unix_secs(),
            _ => self.clock.now_unix_sec(),
        };

        // Before error handling so idle periods still rotate.
        writer.update(ts).map_err(RunnerError::Rotate)?;

        let frame = match read {
            Ok(frame) => frame,
            Err(CaptureError::Timeout) => return Ok(Flow::Continue),
            Err(CaptureError::EndOfStream) => {
                tracing::info!(source = %source.name(), "capture source exhausted");
                return Ok(Flow::Stop);
            }
            Err(e) => return Err(RunnerError::Read(e)),
        };

        if !self.sampler.sample() {
            return Ok(Flow::Continue);
        }

        writer.write_packet(&frame).map_err(RunnerError::Write)?;
        Ok(Flow::Continue)
    }

    /// Load the configuration again from the file it came from.
    ///
    /// On success the source and writer are closed and rebuilt from the new
    /// configuration on the next iteration. On failure nothing changes.
    pub fn reload(&mut self) -> Result<(), RunnerError> {
        let path = self.config.path.clone().ok_or(RunnerError::NoConfigPath)?;
        let config = Config::load(&path)?;

        if let Err(e) = self.close() {
            tracing::warn!("error closing previous output: {}", e);
        }

        tracing::info!(path = %path.display(), "configuration reloaded");
        config.log_summary();

        self.sampler = Sampler::from_settings(&config.sampling);
        self.config = Arc::new(config);
        Ok(())
    }

    /// Close the writer and release the capture source. Safe to call more
    /// than once.
    pub fn close(&mut self) -> Result<(), RunnerError> {
        if let Some(source) = self.source.take() {
            tracing::debug!(source = %source.name(), "closing capture source");
        }
        match self.writer.take() {
            Some(mut writer) => writer.close().map_err(RunnerError::Write),
            None => Ok(()),
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("failed to close runner: {}", e);
        }
    }
}

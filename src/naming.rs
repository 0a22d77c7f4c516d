//! Output file naming.
//!
//! A bucket's file name is the strftime template expanded with the bucket
//! start in the configured timezone. Without append mode an existing file is
//! never reused: `name.pcap` becomes `name-1.pcap`, `name-2.pcap`, ...

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::OutputSettings;
use crate::error::WriterError;

/// Returns true if every `%` token of `template` is understood by chrono.
pub fn is_valid_template(template: &str) -> bool {
    !StrftimeItems::new(template).any(|item| matches!(item, Item::Error))
}

#[derive(Debug, Clone)]
pub struct FileNamer {
    template: String,
    location: Tz,
    append: bool,
}

impl FileNamer {
    pub fn new(template: impl Into<String>, location: Tz, append: bool) -> Self {
        Self {
            template: template.into(),
            location,
            append,
        }
    }

    pub fn from_settings(settings: &OutputSettings) -> Result<Self, WriterError> {
        let location = settings
            .location()
            .ok_or_else(|| WriterError::Timezone(settings.timezone.clone()))?;
        Ok(Self::new(settings.file_format.clone(), location, settings.append))
    }

    /// Path for the bucket starting at `bucket_start`.
    ///
    /// In append mode the expanded template is returned even if it exists.
    pub fn resolve(&self, bucket_start: i64) -> Result<PathBuf, WriterError> {
        let mut path = self.expand(&self.template, bucket_start)?;
        if self.append {
            return Ok(path);
        }

        let mut n = 1u32;
        while path.exists() {
            tracing::warn!(path = %path.display(), "file already exists");
            path = self.expand(&self.suffixed_template(n), bucket_start)?;
            n += 1;
        }

        Ok(path)
    }

    fn expand(&self, template: &str, ts: i64) -> Result<PathBuf, WriterError> {
        let local = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| WriterError::Template(format!("timestamp out of range: {}", ts)))?
            .with_timezone(&self.location);

        let mut name = String::new();
        write!(name, "{}", local.format(template))
            .map_err(|_| WriterError::Template(format!("invalid strftime token in {}", template)))?;

        Ok(PathBuf::from(name))
    }

    /// `dir/name.ext` -> `dir/name-N.ext`; templates without an extension
    /// get the suffix at the end.
    fn suffixed_template(&self, n: u32) -> String {
        let extension = Path::new(&self.template)
            .extension()
            .and_then(|ext| ext.to_str());

        match extension {
            Some(ext) => {
                let base = &self.template[..self.template.len() - ext.len() - 1];
                format!("{}-{}.{}", base, n, ext)
            }
            None => format!("{}-{}", self.template, n),
        }
    }
}

//! Append-only activity log.
//!
//! A plain text file of `<rfc3339> <message>` lines. Write failures are
//! logged at debug level and otherwise ignored: losing an activity line must
//! never affect a protocol response.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use sensormcp_core::logging::{debug, targets};

/// Append-only text sink keyed by a fixed path.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    path: Option<PathBuf>,
}

impl ActivityLog {
    /// A log appending to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// The file this log appends to.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one timestamped line.
    pub fn record(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let line = format!(
            "{} {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            debug!(
                target: targets::DEVICE,
                "Activity log write to {} failed: {}",
                path.display(),
                e
            );
        }
    }
}

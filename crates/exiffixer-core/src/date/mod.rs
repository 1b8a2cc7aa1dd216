pub mod exif;
pub mod video;

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Metadata field a capture date was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    DateTimeOriginal,
    DateTime,
    VideoCreationDate,
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DateSource::DateTimeOriginal => "DateTimeOriginal",
            DateSource::DateTime => "DateTime",
            DateSource::VideoCreationDate => "creation_time",
        };
        f.write_str(tag)
    }
}

/// A capture timestamp recovered from embedded metadata. Always > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedDate {
    epoch_millis: i64,
    source: DateSource,
}

impl ExtractedDate {
    /// Zero and negative instants are treated as absent.
    pub fn new(epoch_millis: i64, source: DateSource) -> Option<Self> {
        (epoch_millis > 0).then_some(Self { epoch_millis, source })
    }

    pub fn epoch_millis(&self) -> i64 {
        self.epoch_millis
    }

    pub fn source(&self) -> DateSource {
        self.source
    }
}

/// Render epoch milliseconds as local `YYYY-MM-DD HH:MM:SS` for log lines.
pub fn format_local(epoch_millis: i64) -> String {
    match DateTime::from_timestamp_millis(epoch_millis) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => epoch_millis.to_string(),
    }
}

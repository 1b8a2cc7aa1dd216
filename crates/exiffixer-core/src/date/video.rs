use std::path::PathBuf;

use chrono::NaiveDateTime;

use super::{DateSource, ExtractedDate};
use crate::error::FixError;
use crate::media::Locator;

/// Accepted container creation-date grammars, tried in order. All are UTC.
const VIDEO_DATE_FORMATS: &[&str] = &[
    "%Y%m%dT%H%M%S%.fZ",
    "%Y%m%dT%H%M%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// An open metadata session over one video container.
pub trait VideoSession {
    /// Raw value of the container's creation-date key, if present.
    fn creation_date(&mut self) -> anyhow::Result<Option<String>>;

    /// Free whatever the session holds. Called exactly once.
    fn release(&mut self);
}

/// Opens metadata sessions over video containers.
pub trait VideoMetadataReader: Send + Sync {
    fn open(&self, locator: &Locator) -> anyhow::Result<Box<dyn VideoSession>>;
}

/// Releases the wrapped session when dropped, whichever way the caller leaves.
struct SessionGuard(Box<dyn VideoSession>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Capture date of a video from its container creation date.
pub fn video_date(
    reader: &dyn VideoMetadataReader,
    locator: &Locator,
) -> Result<ExtractedDate, FixError> {
    let session = reader.open(locator).map_err(|e| FixError::ResourceFault {
        what: "video metadata".to_string(),
        message: e.to_string(),
    })?;
    let mut guard = SessionGuard(session);

    let raw = guard
        .0
        .creation_date()
        .map_err(|e| FixError::ResourceFault {
            what: "video creation date".to_string(),
            message: e.to_string(),
        })?
        .ok_or(FixError::MetadataAbsent)?;

    let millis = parse_video_date(&raw).ok_or_else(|| FixError::ParseFailure(raw.clone()))?;
    ExtractedDate::new(millis, DateSource::VideoCreationDate).ok_or(FixError::ParseFailure(raw))
}

/// Same as [`video_date`], with every failure folded into `None`.
pub fn extract_video_date(
    reader: &dyn VideoMetadataReader,
    locator: &Locator,
) -> Option<ExtractedDate> {
    match video_date(reader, locator) {
        Ok(date) => Some(date),
        Err(e) => {
            tracing::debug!("no video date for {}: {}", locator, e);
            None
        }
    }
}

/// Parse a container creation date as UTC epoch milliseconds.
pub fn parse_video_date(s: &str) -> Option<i64> {
    VIDEO_DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|dt| dt.and_utc().timestamp_millis())
    })
}

/// Reads container tags with the `ffprobe` executable.
///
/// Locators are resolved to paths through `resolve`; unresolvable ones fail to open.
pub struct FfprobeReader<F> {
    resolve: F,
}

impl<F> FfprobeReader<F>
where
    F: Fn(&Locator) -> Option<PathBuf> + Send + Sync,
{
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }
}

impl<F> VideoMetadataReader for FfprobeReader<F>
where
    F: Fn(&Locator) -> Option<PathBuf> + Send + Sync,
{
    fn open(&self, locator: &Locator) -> anyhow::Result<Box<dyn VideoSession>> {
        let path = (self.resolve)(locator)
            .ok_or_else(|| anyhow::anyhow!("cannot resolve {}", locator))?;
        let probe = ffprobe::ffprobe(&path)
            .map_err(|e| anyhow::anyhow!("ffprobe {}: {}", path.display(), e))?;
        Ok(Box::new(FfprobeSession {
            creation_time: probe.format.tags.and_then(|t| t.creation_time),
            released: false,
        }))
    }
}

struct FfprobeSession {
    creation_time: Option<String>,
    released: bool,
}

impl VideoSession for FfprobeSession {
    fn creation_date(&mut self) -> anyhow::Result<Option<String>> {
        if self.released {
            anyhow::bail!("session already released");
        }
        Ok(self.creation_time.clone())
    }

    fn release(&mut self) {
        self.creation_time = None;
        self.released = true;
    }
}

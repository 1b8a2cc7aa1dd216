use std::fmt;

use serde::{Deserialize, Serialize};

/// Extensions treated as photos (lowercase, without the dot)
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "webp"];
/// Extensions treated as videos (lowercase, without the dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "3gp"];

/// Volume name whose files may be touched through a direct path
pub const PRIMARY_VOLUME: &str = "primary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// Lowercased substring after the last `.`, or an empty string when there is none.
pub fn lower_extension(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.rfind('.') {
        Some(pos) => lower[pos + 1..].to_string(),
        None => String::new(),
    }
}

/// Decide whether a file name is a photo, a video, or neither.
pub fn classify(name: &str) -> Option<MediaKind> {
    kind_of_extension(&lower_extension(name))
}

fn kind_of_extension(ext: &str) -> Option<MediaKind> {
    if PHOTO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Opaque file reference of the form `<volume>:<relative-path>`.
///
/// The relative part always uses `/` separators and is empty for a volume root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    volume: String,
    relative: String,
}

impl Locator {
    pub fn new(volume: impl Into<String>, relative: impl Into<String>) -> Self {
        let relative: String = relative.into();
        Self {
            volume: volume.into(),
            relative: relative.trim_matches('/').to_string(),
        }
    }

    /// Root of a volume.
    pub fn root(volume: impl Into<String>) -> Self {
        Self::new(volume, "")
    }

    /// Parse `<volume>:<relative-path>`. The split happens on the first `:`.
    pub fn parse(s: &str) -> Option<Self> {
        let (volume, relative) = s.split_once(':')?;
        if volume.is_empty() {
            return None;
        }
        Some(Self::new(volume, relative))
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_primary(&self) -> bool {
        self.volume.eq_ignore_ascii_case(PRIMARY_VOLUME)
    }

    /// Locator of an entry inside this one.
    pub fn child(&self, name: &str) -> Self {
        if self.relative.is_empty() {
            Self::new(self.volume.clone(), name)
        } else {
            Self::new(self.volume.clone(), format!("{}/{}", self.relative, name))
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.volume, self.relative)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl TryFrom<String> for Locator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Locator::parse(&s).ok_or_else(|| format!("invalid locator: {:?}", s))
    }
}

/// One node yielded by directory enumeration.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub is_directory: bool,
    /// Milliseconds since the Unix epoch
    pub last_modified_millis: i64,
    pub locator: Locator,
}

/// A file selected for timestamp correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub locator: Locator,
    /// File name as listed
    pub name: String,
    pub lower_extension: String,
    /// Modification time at scan, milliseconds since the Unix epoch
    pub current_mtime: i64,
    pub kind: MediaKind,
}

impl MediaCandidate {
    /// Build a candidate from a listed file, or `None` when the name is not media.
    pub fn from_node(node: &Node) -> Option<Self> {
        if node.is_directory {
            return None;
        }
        let ext = lower_extension(&node.name);
        let kind = kind_of_extension(&ext)?;
        Some(Self {
            locator: node.locator.clone(),
            name: node.name.clone(),
            lower_extension: ext,
            current_mtime: node.last_modified_millis,
            kind,
        })
    }
}

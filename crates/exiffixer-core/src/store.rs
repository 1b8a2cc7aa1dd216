use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::apply::{file_time_from_millis, DocumentStore};
use crate::media::{Locator, Node};
use crate::scan::DirectoryListing;

/// Seekable byte stream over a media file.
pub trait MediaRead: BufRead + Seek {}

impl<T: BufRead + Seek> MediaRead for T {}

/// Host file access: opens the bytes behind a locator.
pub trait MediaStore {
    fn open(&self, locator: &Locator) -> io::Result<Box<dyn MediaRead>>;
}

/// Named volume roots on the local filesystem.
///
/// `primary:DCIM/a.jpg` resolves to `<root of "primary">/DCIM/a.jpg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTable {
    volumes: BTreeMap<String, PathBuf>,
}

impl VolumeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.insert(name, root);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, root: impl Into<PathBuf>) {
        self.volumes.insert(name.into(), root.into());
    }

    /// Root directory of a volume; names compare case-insensitively.
    pub fn root(&self, volume: &str) -> Option<&Path> {
        self.volumes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(volume))
            .map(|(_, root)| root.as_path())
    }

    /// Filesystem path of a locator. Paths escaping the volume root never resolve.
    pub fn resolve(&self, locator: &Locator) -> Option<PathBuf> {
        let root = self.root(locator.volume())?;
        let relative = Path::new(locator.relative());
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(root.join(relative))
    }

    fn resolve_or_not_found(&self, locator: &Locator) -> io::Result<PathBuf> {
        self.resolve(locator).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("unknown location {}", locator))
        })
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Node for one `read_dir` entry; entries that cannot be read are skipped.
fn entry_node(dir: &Locator, entry: io::Result<fs::DirEntry>) -> Option<Node> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!("skipping unreadable entry in {}: {}", dir, e);
            return None;
        }
    };
    let name = entry.file_name().to_string_lossy().into_owned();
    let is_directory = match entry.file_type() {
        Ok(file_type) => file_type.is_dir(),
        Err(e) => {
            tracing::warn!("skipping {}: {}", dir.child(&name), e);
            return None;
        }
    };
    let last_modified_millis = fs::metadata(entry.path())
        .and_then(|m| m.modified())
        .map(epoch_millis)
        .unwrap_or(0);
    Some(Node {
        locator: dir.child(&name),
        name,
        is_directory,
        last_modified_millis,
    })
}

impl DirectoryListing for VolumeTable {
    fn list(&self, dir: &Locator) -> io::Result<Vec<Node>> {
        let path = self.resolve_or_not_found(dir)?;
        let mut nodes: Vec<Node> = fs::read_dir(&path)?
            .filter_map(|entry| entry_node(dir, entry))
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }
}

impl MediaStore for VolumeTable {
    fn open(&self, locator: &Locator) -> io::Result<Box<dyn MediaRead>> {
        let path = self.resolve_or_not_found(locator)?;
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

impl DocumentStore for VolumeTable {
    /// Sets the modification time through an open file handle.
    fn update_last_modified(&self, locator: &Locator, millis: i64) -> anyhow::Result<u64> {
        let Some(path) = self.resolve(locator) else {
            return Ok(0);
        };
        let file = match OpenOptions::new().write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(anyhow::anyhow!("open {}: {}", path.display(), e)),
        };
        filetime::set_file_handle_times(&file, None, Some(file_time_from_millis(millis)))?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::io::Read;

    fn setup() -> (tempfile::TempDir, VolumeTable) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DCIM/Camera")).unwrap();
        fs::write(dir.path().join("DCIM/Camera/b.jpg"), b"bbb").unwrap();
        fs::write(dir.path().join("DCIM/a.mp4"), b"aaa").unwrap();
        let table = VolumeTable::new().with_volume("primary", dir.path());
        (dir, table)
    }

    #[test]
    fn test_resolve() {
        let table = VolumeTable::new()
            .with_volume("primary", "/storage/emulated/0")
            .with_volume("1A2B-3C4D", "/mnt/sd");
        assert_eq!(
            table.resolve(&Locator::new("primary", "DCIM/a.jpg")),
            Some(PathBuf::from("/storage/emulated/0/DCIM/a.jpg"))
        );
        assert_eq!(
            table.resolve(&Locator::new("1a2b-3c4d", "x.mov")),
            Some(PathBuf::from("/mnt/sd/x.mov"))
        );
        assert_eq!(table.resolve(&Locator::root("primary")), Some(PathBuf::from("/storage/emulated/0")));
        assert_eq!(table.resolve(&Locator::new("primary", "../../etc")), None);
        assert_eq!(table.resolve(&Locator::new("usb", "a.jpg")), None);
    }

    #[test]
    fn test_list_sorted_with_locators() {
        let (_dir, table) = setup();
        let nodes = table.list(&Locator::new("primary", "DCIM")).unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Camera", "a.mp4"]);
        assert!(nodes[0].is_directory);
        assert!(!nodes[1].is_directory);
        assert_eq!(nodes[1].locator.to_string(), "primary:DCIM/a.mp4");
        assert!(nodes[1].last_modified_millis > 0);
    }

    #[test]
    fn test_unreadable_entry_is_skipped() {
        let dir = Locator::root("primary");
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(entry_node(&dir, Err(err)).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_does_not_hide_siblings() {
        let (dir, table) = setup();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("DCIM/link.jpg")).unwrap();
        let nodes = table.list(&Locator::new("primary", "DCIM")).unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Camera", "a.mp4", "link.jpg"]);
        assert_eq!(nodes[2].last_modified_millis, 0);
    }

    #[test]
    fn test_open_reads_bytes() {
        let (_dir, table) = setup();
        let mut reader = table.open(&Locator::new("primary", "DCIM/Camera/b.jpg")).unwrap();
        let mut s = String::new();
        reader.read_to_string(&mut s).unwrap();
        assert_eq!(s, "bbb");
        assert!(table.open(&Locator::new("primary", "missing.jpg")).is_err());
    }

    #[test]
    fn test_update_last_modified_through_handle() {
        let (dir, table) = setup();
        let rows = table
            .update_last_modified(&Locator::new("primary", "DCIM/a.mp4"), 1_500_000_000_000)
            .unwrap();
        assert_eq!(rows, 1);
        let meta = fs::metadata(dir.path().join("DCIM/a.mp4")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_500_000_000);

        assert_eq!(table.update_last_modified(&Locator::new("primary", "nope.mp4"), 1).unwrap(), 0);
        assert_eq!(table.update_last_modified(&Locator::new("usb", "DCIM/a.mp4"), 1).unwrap(), 0);
    }
}

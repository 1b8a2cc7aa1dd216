use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::apply::{ContentIndex, IndexedDates};
use crate::media::Locator;

/// Current catalog file format version
const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub modified_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_millis: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog data stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    pub version: u32,
    /// Keyed by locator string
    pub entries: BTreeMap<String, CatalogEntry>,
    /// Files a gallery should re-read
    #[serde(default)]
    pub rescan: Vec<PathBuf>,
}

impl Default for CatalogData {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            entries: BTreeMap::new(),
            rescan: Vec::new(),
        }
    }
}

impl CatalogData {
    /// Load from `path`; a missing file is an empty catalog.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let reader = BufReader::new(File::open(path)?);
        let data: CatalogData = serde_json::from_reader(reader)?;
        if data.version != CATALOG_VERSION {
            anyhow::bail!("unsupported catalog version {} in {}", data.version, path.display());
        }
        Ok(data)
    }

    /// Write to a temp file first, then rename over `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        let writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(writer, self)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// A JSON file standing in for a media library's index.
pub struct JsonCatalog {
    path: PathBuf,
    data: Mutex<CatalogData>,
}

impl JsonCatalog {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = CatalogData::load(&path)?;
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn snapshot(&self) -> CatalogData {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn modify(&self, f: impl FnOnce(&mut CatalogData)) -> anyhow::Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data);
        data.save(&self.path)
    }
}

impl ContentIndex for JsonCatalog {
    fn update_dates(&self, locator: &Locator, dates: &IndexedDates) -> anyhow::Result<()> {
        self.modify(|data| {
            data.entries.insert(
                locator.to_string(),
                CatalogEntry {
                    modified_secs: dates.modified_secs,
                    taken_millis: dates.taken_millis,
                    updated_at: Utc::now(),
                },
            );
        })
    }

    fn request_rescan(&self, path: &Path) -> anyhow::Result<()> {
        self.modify(|data| {
            if !data.rescan.iter().any(|p| p == path) {
                data.rescan.push(path.to_path_buf());
            }
        })
    }
}

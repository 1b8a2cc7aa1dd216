use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use serde::{Deserialize, Serialize};

use crate::date::ExtractedDate;
use crate::error::{FixError, MutateError};
use crate::media::{Locator, MediaCandidate, MediaKind};

/// Differences up to this many milliseconds are not corrected.
pub const MTIME_TOLERANCE_MS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Direct filesystem write on the primary volume
    Primary,
    /// Update through the document store
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    NoMetadata,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixOutcome {
    AlreadyCorrect,
    Fixed { strategy: Strategy, new_time: i64 },
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

/// Outcome plus any best-effort side effect that went wrong on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub outcome: FixOutcome,
    pub warnings: Vec<String>,
}

impl From<FixOutcome> for Applied {
    fn from(outcome: FixOutcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
        }
    }
}

/// One way of changing a file's modification time.
pub trait StorageMutator {
    /// Set the modification time to `millis`. Returns the filesystem path that
    /// was written when the strategy works on direct paths.
    fn set_modified(
        &self,
        candidate: &MediaCandidate,
        millis: i64,
    ) -> Result<Option<PathBuf>, MutateError>;
}

/// Document store reached through an indirect content API.
pub trait DocumentStore {
    /// Update the document's last-modified field. Returns affected rows.
    fn update_last_modified(&self, locator: &Locator, millis: i64) -> anyhow::Result<u64>;
}

/// Dates pushed into an external media index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDates {
    pub modified_secs: i64,
    pub taken_millis: Option<i64>,
}

/// External media index. Every call is best-effort.
pub trait ContentIndex {
    fn update_dates(&self, locator: &Locator, dates: &IndexedDates) -> anyhow::Result<()>;
    fn request_rescan(&self, path: &Path) -> anyhow::Result<()>;
}

pub fn file_time_from_millis(millis: i64) -> FileTime {
    FileTime::from_unix_time(
        millis.div_euclid(1000),
        (millis.rem_euclid(1000) * 1_000_000) as u32,
    )
}

/// Writes modification times straight to files under the primary volume root.
pub struct DirectPathMutator {
    primary_root: Option<PathBuf>,
}

impl DirectPathMutator {
    pub fn new(primary_root: Option<PathBuf>) -> Self {
        Self { primary_root }
    }

    /// Direct path of a locator, if it lives on the primary volume.
    pub fn resolve(&self, locator: &Locator) -> Option<PathBuf> {
        if !locator.is_primary() {
            return None;
        }
        let root = self.primary_root.as_ref()?;
        let relative = Path::new(locator.relative());
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(root.join(relative))
    }
}

impl StorageMutator for DirectPathMutator {
    fn set_modified(
        &self,
        candidate: &MediaCandidate,
        millis: i64,
    ) -> Result<Option<PathBuf>, MutateError> {
        let path = self.resolve(&candidate.locator).ok_or_else(|| {
            MutateError::Inapplicable(format!("{} has no direct path", candidate.locator))
        })?;
        if !path.exists() {
            return Err(MutateError::Inapplicable(format!(
                "{} does not exist",
                path.display()
            )));
        }
        filetime::set_file_mtime(&path, file_time_from_millis(millis))?;
        Ok(Some(path))
    }
}

/// Updates the last-modified field through a [`DocumentStore`].
pub struct ContentApiMutator<D> {
    documents: D,
}

impl<D: DocumentStore> ContentApiMutator<D> {
    pub fn new(documents: D) -> Self {
        Self { documents }
    }
}

impl<D: DocumentStore> StorageMutator for ContentApiMutator<D> {
    fn set_modified(
        &self,
        candidate: &MediaCandidate,
        millis: i64,
    ) -> Result<Option<PathBuf>, MutateError> {
        let rows = self
            .documents
            .update_last_modified(&candidate.locator, millis)?;
        if rows == 0 {
            return Err(MutateError::NoRowsAffected);
        }
        Ok(None)
    }
}

/// Applies an extracted capture date to a candidate's modification time.
pub struct TimestampApplier<'a> {
    primary: &'a dyn StorageMutator,
    fallback: &'a dyn StorageMutator,
    index: Option<&'a dyn ContentIndex>,
}

impl<'a> TimestampApplier<'a> {
    pub fn new(primary: &'a dyn StorageMutator, fallback: &'a dyn StorageMutator) -> Self {
        Self {
            primary,
            fallback,
            index: None,
        }
    }

    pub fn with_index(mut self, index: &'a dyn ContentIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn apply(&self, candidate: &MediaCandidate, extracted: Option<ExtractedDate>) -> Applied {
        let Some(date) = extracted else {
            return FixOutcome::Skipped {
                reason: SkipReason::NoMetadata,
            }
            .into();
        };
        let target = date.epoch_millis();

        if (candidate.current_mtime - target).abs() <= MTIME_TOLERANCE_MS {
            return FixOutcome::AlreadyCorrect.into();
        }

        let primary_err = match self.primary.set_modified(candidate, target) {
            Ok(path) => {
                let warnings = self.propagate(candidate, target, path.as_deref());
                return Applied {
                    outcome: FixOutcome::Fixed {
                        strategy: Strategy::Primary,
                        new_time: target,
                    },
                    warnings,
                };
            }
            Err(e) => e,
        };
        tracing::debug!("{}: direct update unavailable ({}), falling back", candidate.name, primary_err);

        match self.fallback.set_modified(candidate, target) {
            Ok(_) => FixOutcome::Fixed {
                strategy: Strategy::Fallback,
                new_time: target,
            }
            .into(),
            Err(e) => FixOutcome::Failed {
                reason: FixError::MutationFailure(e.to_string()).to_string(),
            }
            .into(),
        }
    }

    /// Push the new time into the content index and ask for a rescan. Failures
    /// are returned as warnings and never change the outcome.
    fn propagate(&self, candidate: &MediaCandidate, target: i64, path: Option<&Path>) -> Vec<String> {
        let mut warnings = Vec::new();
        let Some(index) = self.index else {
            return warnings;
        };

        let dates = IndexedDates {
            modified_secs: target.div_euclid(1000),
            taken_millis: (candidate.kind == MediaKind::Photo).then_some(target),
        };
        if let Err(e) = index.update_dates(&candidate.locator, &dates) {
            tracing::warn!("{}: content index update failed: {:#}", candidate.name, e);
            warnings.push(format!("content index update failed: {}", e));
        }
        if let Some(path) = path {
            if let Err(e) = index.request_rescan(path) {
                tracing::warn!("{}: rescan request failed: {:#}", candidate.name, e);
                warnings.push(format!("rescan request failed: {}", e));
            }
        }
        warnings
    }
}

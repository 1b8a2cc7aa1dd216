pub mod apply;
pub mod catalog;
pub mod control;
pub mod date;
pub mod error;
pub mod media;
pub mod report;
pub mod scan;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use apply::{Applied, ContentApiMutator, ContentIndex, DirectPathMutator, FixOutcome, Strategy, TimestampApplier};
use date::video::{FfprobeReader, VideoMetadataReader};
use date::ExtractedDate;
use media::{Locator, MediaCandidate, MediaKind, PRIMARY_VOLUME};
use store::{MediaStore, VolumeTable};

pub use apply::SkipReason;
pub use catalog::JsonCatalog;
pub use control::{CancellationToken, CancelledError, JobSlot};
pub use report::{ActivityLog, BatchEvent, BatchSummary, Reporter};

fn default_volume() -> String {
    PRIMARY_VOLUME.to_string()
}

fn default_log_budget() -> usize {
    report::DEFAULT_LOG_BUDGET
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOptions {
    /// Directory to scan
    pub root: PathBuf,
    /// Volume name the root is registered under
    #[serde(default = "default_volume")]
    pub volume: String,
    /// Extra volumes reachable through the fallback strategy
    #[serde(default)]
    pub mounts: BTreeMap<String, PathBuf>,
    /// JSON catalog that receives updated dates
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Character budget of the activity log
    #[serde(default = "default_log_budget")]
    pub log_budget: usize,
}

impl FixOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            volume: default_volume(),
            mounts: BTreeMap::new(),
            catalog: None,
            log_budget: default_log_budget(),
        }
    }

    pub fn volume_table(&self) -> VolumeTable {
        let mut table = VolumeTable::new();
        for (name, root) in &self.mounts {
            table.insert(name.clone(), root.clone());
        }
        table.insert(self.volume.clone(), self.root.clone());
        table
    }

    pub fn root_locator(&self) -> Locator {
        Locator::root(self.volume.clone())
    }
}

/// Collaborators used while fixing one batch.
pub struct FixContext<'a> {
    pub store: &'a dyn MediaStore,
    pub video: &'a dyn VideoMetadataReader,
    pub applier: TimestampApplier<'a>,
}

/// Capture date of a candidate, chosen by its kind. Every failure is `None`.
pub fn extract_date(ctx: &FixContext, candidate: &MediaCandidate) -> Option<ExtractedDate> {
    match candidate.kind {
        MediaKind::Photo => match ctx.store.open(&candidate.locator) {
            Ok(mut reader) => date::exif::extract_photo_date(&mut reader),
            Err(e) => {
                tracing::debug!("{}: cannot open: {}", candidate.locator, e);
                None
            }
        },
        MediaKind::Video => date::video::extract_video_date(ctx.video, &candidate.locator),
    }
}

/// Extract and apply for one candidate. A panic anywhere inside becomes `Failed`.
pub fn process_candidate(ctx: &FixContext, candidate: &MediaCandidate) -> Applied {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let extracted = extract_date(ctx, candidate);
        if let Some(date) = &extracted {
            tracing::debug!(
                "{}: {} = {}",
                candidate.name,
                date.source(),
                date::format_local(date.epoch_millis())
            );
        }
        ctx.applier.apply(candidate, extracted)
    }));
    result.unwrap_or_else(|payload| {
        FixOutcome::Failed {
            reason: panic_message(payload.as_ref()),
        }
        .into()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected fault".to_string()
    }
}

/// Activity log line for an outcome; files already correct are not logged.
pub fn outcome_line(name: &str, outcome: &FixOutcome) -> Option<String> {
    match outcome {
        FixOutcome::AlreadyCorrect => None,
        FixOutcome::Fixed { strategy, new_time } => {
            let via = match strategy {
                Strategy::Primary => "direct",
                Strategy::Fallback => "fallback",
            };
            Some(format!("FIXED ({}): {} -> {}", via, name, date::format_local(*new_time)))
        }
        FixOutcome::Skipped { .. } => Some(format!("SKIP: No metadata date for {}", name)),
        FixOutcome::Failed { reason } => Some(format!("FAIL: {} - {}", name, reason)),
    }
}

/// Process candidates one at a time, checking `token` before each.
///
/// Changes already applied stay applied when cancelled.
pub fn run_fix_phase(
    candidates: &[MediaCandidate],
    ctx: &FixContext,
    token: &CancellationToken,
    reporter: &Reporter,
) -> BatchSummary {
    let total = candidates.len() as u64;
    let mut summary = BatchSummary {
        total,
        ..Default::default()
    };
    reporter.send(BatchEvent::Started { total });
    tracing::info!("fixing {} files", total);

    for candidate in candidates {
        if token.is_cancelled() {
            summary.cancelled = true;
            reporter.log(format!("Cancelled after {} of {} files.", summary.processed, total));
            break;
        }

        let applied = process_candidate(ctx, candidate);
        for warning in &applied.warnings {
            reporter.log(format!("WARN: {} - {}", candidate.name, warning));
        }
        if let Some(line) = outcome_line(&candidate.name, &applied.outcome) {
            reporter.log(line);
        }
        summary.record(&applied.outcome);
        reporter.send(BatchEvent::Outcome {
            name: candidate.name.clone(),
            outcome: applied.outcome,
        });
        reporter.send(BatchEvent::Progress {
            processed: summary.processed,
            total,
        });
    }

    reporter.log(format!(
        "Job finished. Success: {}, Failed: {}",
        summary.success(),
        summary.failed
    ));
    tracing::info!(
        "fixed {}, already correct {}, skipped {}, failed {}",
        summary.fixed,
        summary.already_correct,
        summary.skipped,
        summary.failed
    );
    reporter.send(BatchEvent::Finished(summary.clone()));
    summary
}

/// Scan phase: collect candidates under the configured root.
pub fn scan_media(
    options: &FixOptions,
    token: &CancellationToken,
    reporter: &Reporter,
) -> anyhow::Result<Vec<MediaCandidate>> {
    let table = options.volume_table();
    let candidates = scan::collect_candidates(&table, &options.root_locator(), token)?;
    reporter.log(format!("Scan complete. Found {} candidates.", candidates.len()));
    Ok(candidates)
}

/// Fix phase with the filesystem-backed collaborators.
pub fn fix_media(
    options: &FixOptions,
    candidates: &[MediaCandidate],
    token: &CancellationToken,
    reporter: &Reporter,
) -> anyhow::Result<BatchSummary> {
    let table = options.volume_table();
    let catalog = options.catalog.as_ref().map(JsonCatalog::open).transpose()?;

    let direct = DirectPathMutator::new(table.root(PRIMARY_VOLUME).map(PathBuf::from));
    let fallback = ContentApiMutator::new(table.clone());
    let resolver = table.clone();
    let video = FfprobeReader::new(move |locator: &Locator| resolver.resolve(locator));

    let mut applier = TimestampApplier::new(&direct, &fallback);
    if let Some(catalog) = catalog.as_ref() {
        applier = applier.with_index(catalog as &dyn ContentIndex);
    }
    let ctx = FixContext {
        store: &table,
        video: &video,
        applier,
    };
    Ok(run_fix_phase(candidates, &ctx, token, reporter))
}

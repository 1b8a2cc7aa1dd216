use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use exiffixer_core::media::MediaCandidate;
use exiffixer_core::{ActivityLog, BatchEvent, BatchSummary, FixOptions, JobSlot, Reporter};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "exiffixer",
    version,
    about = "Set photo and video modification times from their embedded capture dates"
)]
struct Cli {
    /// Directory to scan
    #[arg(required_unless_present = "config")]
    root: Option<PathBuf>,

    /// JSON options file; flags given on the command line take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Volume name the root is registered under (only "primary" allows direct writes)
    #[arg(long)]
    volume: Option<String>,

    /// Extra volume as NAME=PATH, reachable through the fallback strategy
    #[arg(long = "mount", value_parser = parse_mount)]
    mounts: Vec<(String, PathBuf)>,

    /// JSON catalog that records corrected dates and rescan requests
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Character budget of the activity log
    #[arg(long)]
    log_budget: Option<usize>,

    /// List candidates without changing anything
    #[arg(long)]
    scan_only: bool,

    /// Print the activity log when finished
    #[arg(long)]
    show_log: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_mount(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got {:?}", s)),
    }
}

fn build_options(cli: &Cli) -> anyhow::Result<FixOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => FixOptions::new(cli.root.clone().context("missing root directory")?),
    };

    if let Some(root) = &cli.root {
        options.root = root.clone();
    }
    if let Some(volume) = &cli.volume {
        options.volume = volume.clone();
    }
    for (name, path) in &cli.mounts {
        options.mounts.insert(name.clone(), path.clone());
    }
    if cli.catalog.is_some() {
        options.catalog = cli.catalog.clone();
    }
    if let Some(budget) = cli.log_budget {
        options.log_budget = budget;
    }
    Ok(options)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {wide_msg}")?
            .progress_chars("##-"),
    );
    Ok(bar)
}

type WorkerResult = anyhow::Result<(Vec<MediaCandidate>, Option<BatchSummary>)>;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let options = build_options(&cli)?;
    let t_total = Instant::now();

    let slot = Arc::new(JobSlot::new());
    let scan_token = slot.begin();
    {
        let slot = slot.clone();
        ctrlc::set_handler(move || slot.cancel()).context("installing Ctrl-C handler")?;
    }

    let (tx, rx) = mpsc::channel();
    let worker = {
        let options = options.clone();
        let slot = slot.clone();
        let scan_only = cli.scan_only;
        std::thread::spawn(move || -> WorkerResult {
            let reporter = Reporter::new(tx);
            let candidates = exiffixer_core::scan_media(&options, &scan_token, &reporter)?;
            if scan_only || candidates.is_empty() {
                return Ok((candidates, None));
            }
            let token = slot.next_phase();
            let summary = exiffixer_core::fix_media(&options, &candidates, &token, &reporter)?;
            Ok((candidates, Some(summary)))
        })
    };

    let mut log = ActivityLog::new(options.log_budget);
    let mut bar: Option<ProgressBar> = None;
    for event in rx {
        match event {
            BatchEvent::Started { total } => bar = Some(progress_bar(total)?),
            BatchEvent::Log(line) => {
                match &bar {
                    Some(b) => b.set_message(line.clone()),
                    None => eprintln!("{}", line),
                }
                log.push(&line);
            }
            BatchEvent::Progress { processed, .. } => {
                if let Some(b) = &bar {
                    b.set_position(processed);
                }
            }
            BatchEvent::Outcome { .. } => {}
            BatchEvent::Finished(_) => {
                if let Some(b) = bar.take() {
                    b.finish_and_clear();
                }
            }
        }
    }

    let (candidates, summary) = worker
        .join()
        .map_err(|_| anyhow::anyhow!("worker thread panicked"))??;

    if cli.scan_only {
        for c in &candidates {
            println!("{:?}\t{}", c.kind, c.locator);
        }
        return Ok(());
    }

    if cli.show_log {
        eprintln!("{}", log.text());
    }

    if let Some(summary) = summary {
        eprintln!(
            "{}! {} fixed, {} already correct, {} skipped, {} failed of {} files ({:.2}s)",
            if summary.cancelled { "Cancelled" } else { "Done" },
            summary.fixed,
            summary.already_correct,
            summary.skipped,
            summary.failed,
            summary.total,
            t_total.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

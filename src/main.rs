//! EXP pace tracker CLI.
//!
//! Replays or watches a directory of captured frames, tracks level-aware
//! experience progress and manages saved session snapshots.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueHint};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use exp_pace::config::{self, TickInterval, TrackerConfig};
use exp_pace::logging::{self, set_session_log};
use exp_pace::ocr::{interpret, Preprocessor, TesseractRecognizer};
use exp_pace::paths;
use exp_pace::progress::ExpTable;
use exp_pace::session::{
    ControlCommand, ImageDirSource, Sampler, SamplerHandle, TickOutcome, Tracker, TrackerSettings,
};
use exp_pace::snapshot::{self, FileSnapshotStore, SnapshotStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Level-aware EXP pace tracker", long_about = None)]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every frame in a directory as one tick each
    Replay(ReplayArgs),
    /// Sample frames on a timer; control with toggle/reset/ping lines on stdin
    Watch(WatchArgs),
    /// Manage saved snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Interpret raw recognizer text for the level and exp fields
    Interpret {
        /// Text read from the level tile
        #[arg(long, default_value = "")]
        level: String,
        /// Text read from the experience field
        #[arg(long, default_value = "")]
        exp: String,
    },
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Directory of captured frames, processed in file-name order
    #[arg(long, value_hint = ValueHint::DirPath)]
    frames: PathBuf,

    /// Level → required EXP table (.csv or .json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    table: Option<PathBuf>,

    /// Seconds between frames: 1, 5 or 10
    #[arg(long, value_parser = parse_interval)]
    interval: Option<TickInterval>,

    /// Save the final state as a snapshot under this id
    #[arg(long)]
    save: Option<String>,

    /// Print the final view and series as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct WatchArgs {
    /// Directory of captured frames, consumed one per tick
    #[arg(long, value_hint = ValueHint::DirPath)]
    frames: PathBuf,

    /// Level → required EXP table (.csv or .json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    table: Option<PathBuf>,

    /// Seconds between ticks: 1, 5 or 10
    #[arg(long, value_parser = parse_interval)]
    interval: Option<TickInterval>,

    /// Restore this snapshot before starting
    #[arg(long)]
    restore: Option<String>,

    /// Snapshot id written on exit (defaults to a timestamp)
    #[arg(long)]
    save: Option<String>,
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    /// List stored snapshot ids
    List,
    /// Print a snapshot, upgraded to the current schema
    Show { id: String },
    /// Delete a snapshot
    Delete { id: String },
}

fn parse_interval(raw: &str) -> std::result::Result<TickInterval, String> {
    let secs: u64 = raw.parse().map_err(|_| format!("not a number: {}", raw))?;
    TickInterval::try_from(secs)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        log::error!("[PANIC]{} {}", location, panic_info);
    }));

    paths::ensure_directories()?;

    let explicit = cli.config.as_deref().map(config::load_config_from).transpose()?;
    config::init_config(explicit);
    let config = config::get_config();
    logging::init_logging(config.level_filter(), paths::get_log_file());

    match cli.command {
        Command::Replay(args) => run_replay(config, args),
        Command::Watch(args) => run_watch(config, args),
        Command::Snapshots { action } => run_snapshots(config, action),
        Command::Interpret { level, exp } => {
            let reading = interpret(&level, &exp);
            println!("{}", serde_json::to_string_pretty(&reading)?);
            Ok(())
        }
    }
}

fn load_table(config: &TrackerConfig, explicit: Option<&Path>) -> Result<ExpTable> {
    let path = explicit
        .or(config.exp_table_path.as_deref())
        .ok_or_else(|| anyhow!("No EXP table given: pass --table or set exp_table_path"))?;
    ExpTable::load(path)
}

fn build_handle(config: &TrackerConfig, frames: &Path, table: ExpTable) -> Result<SamplerHandle> {
    let recognizer = TesseractRecognizer::new(config.recognizer.clone())?;
    let source = ImageDirSource::open(frames)?;
    log::info!("{} frames queued from {}", source.remaining(), frames.display());
    let sampler = Sampler::new(
        Preprocessor::new(config.preprocess.digit.clone(), config.preprocess.bracket.clone()),
        Box::new(recognizer),
        Box::new(source),
        config.regions.clone(),
        config.sampling.restart_every_ticks,
    );
    Ok(SamplerHandle::new(sampler, Tracker::new(table, TrackerSettings::from(config))))
}

fn store(config: &TrackerConfig) -> FileSnapshotStore {
    FileSnapshotStore::new(config.snapshot_dir())
}

/// Replays frames with synthetic timestamps one interval apart.
fn run_replay(config: &TrackerConfig, args: ReplayArgs) -> Result<()> {
    let table = load_table(config, args.table.as_deref())?;
    let handle = build_handle(config, &args.frames, table)?;
    let interval = args.interval.unwrap_or(config.sampling.interval);
    let step = Duration::seconds(interval.as_secs() as i64);

    let started = Utc::now();
    let session_id = snapshot::new_snapshot_id(started);
    set_session_log(Some(paths::get_logs_dir().join(format!("replay_{}.log", session_id))));

    let mut now = started;
    handle.start(now);

    let (mut accepted, mut missing, mut outliers, mut failed) = (0usize, 0usize, 0usize, 0usize);
    loop {
        match handle.tick_at(now) {
            TickOutcome::NoFrame => break,
            TickOutcome::Ingested(ingest) => {
                let sample = ingest.sample();
                if sample.is_valid {
                    accepted += 1;
                } else if sample.is_outlier {
                    outliers += 1;
                } else {
                    missing += 1;
                }
            }
            TickOutcome::Failed(_) => failed += 1,
            TickOutcome::Busy | TickOutcome::Discarded => {}
        }
        now += step;
    }
    let end = now - step;
    handle.pause(end);

    log::info!(
        "Replay finished: {} accepted, {} missing, {} outliers, {} failed",
        accepted,
        missing,
        outliers,
        failed
    );
    print_summary(&handle, end, args.json)?;

    if let Some(id) = args.save {
        snapshot::save_snapshot(&store(config), &id, &handle.snapshot(end))?;
    }

    set_session_log(None);
    Ok(())
}

/// Samples on the timer until stdin closes, then saves a snapshot.
fn run_watch(config: &TrackerConfig, args: WatchArgs) -> Result<()> {
    let table = load_table(config, args.table.as_deref())?;
    let handle = build_handle(config, &args.frames, table)?;
    let store = store(config);

    if let Some(id) = &args.restore {
        let snap = snapshot::load_snapshot(&store, id)?
            .ok_or_else(|| anyhow!("Snapshot not found: {}", id))?;
        handle.restore(snap);
    }

    let session_id = args
        .save
        .clone()
        .unwrap_or_else(|| snapshot::new_snapshot_id(Utc::now()));
    set_session_log(Some(paths::get_logs_dir().join(format!("watch_{}.log", session_id))));

    let interval = args.interval.unwrap_or(config.sampling.interval);
    let loop_thread = handle.spawn(interval)?;
    log::info!("Watching {} (type toggle, reset or ping)", args.frames.display());

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let now = Utc::now();
        match ControlCommand::parse(&line) {
            Some(cmd) => {
                if let Some(reply) = handle.apply(cmd, now) {
                    println!("{}", reply);
                }
                print_summary(&handle, now, false)?;
            }
            None if line.trim().is_empty() => print_summary(&handle, now, false)?,
            None => log::warn!("Unknown command: {}", line.trim()),
        }
        if !handle.is_loop_running() {
            break;
        }
    }

    let now = Utc::now();
    handle.pause(now);
    handle.stop();
    if loop_thread.join().is_err() {
        log::error!("Sampling thread panicked");
    }

    snapshot::save_snapshot(&store, &session_id, &handle.snapshot(now))?;
    print_summary(&handle, now, false)?;
    set_session_log(None);
    Ok(())
}

fn run_snapshots(config: &TrackerConfig, action: SnapshotAction) -> Result<()> {
    let store = store(config);
    match action {
        SnapshotAction::List => {
            for id in store.list()? {
                println!("{}", id);
            }
        }
        SnapshotAction::Show { id } => {
            let snap = snapshot::load_snapshot(&store, &id)?
                .ok_or_else(|| anyhow!("Snapshot not found: {}", id))?;
            println!("{}", snapshot::encode(&snap)?);
        }
        SnapshotAction::Delete { id } => {
            store.delete(&id)?;
            log::info!("Snapshot deleted: {}", id);
        }
    }
    Ok(())
}

fn print_summary(handle: &SamplerHandle, now: DateTime<Utc>, json: bool) -> Result<()> {
    let view = handle.view(now);
    if json {
        let out = serde_json::json!({ "view": view, "series": handle.series() });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let series = handle.series();
    let pace = |points: &[exp_pace::progress::SeriesPoint]| {
        points.last().map(|p| format!("{:.0}", p.value)).unwrap_or_else(|| "-".to_string())
    };
    println!(
        "[{}] elapsed {}s | +{:.0} EXP ({:+.2}%) | overall {} | recent {}",
        view.state,
        view.elapsed_ms / 1000,
        view.cum_exp_value,
        view.cum_exp_percent,
        pace(&series.overall),
        pace(&series.recent),
    );
    Ok(())
}

#![forbid(unsafe_code)]
//! FrankenSnap CLI.
//!
//! Thin shell around `fsn-engine`: loads a JSON config, wires the btrfs
//! drivers, and maps the run outcome onto process exit codes.

mod btrfs;

use anyhow::{bail, Context, Result};
use btrfs::BtrfsPair;
use fsn_engine::{
    retention, BackupConfig, EvaluationContext, Orchestrator, SnapshotDriver, SystemClock,
    VolumeRole,
};
use fsn_engine::Clock;
use fsn_types::SnapshotName;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// On-disk configuration for one volume pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CliConfig {
    main_volume: PathBuf,
    mirror_volume: PathBuf,
    #[serde(default = "default_snapshot_dir")]
    snapshot_dir: String,
    #[serde(default)]
    backup: BackupConfig,
}

fn default_snapshot_dir() -> String {
    ".snapshots".to_owned()
}

fn load_config(path: &Path) -> Result<CliConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(0);
    };

    match command.as_str() {
        "run" => {
            let Some(path) = args.next() else {
                bail!("run requires a config path");
            };
            backup_cycle(Path::new(&path))
        }
        "plan" => {
            let Some(path) = args.next() else {
                bail!("plan requires a config path");
            };
            let json = args.any(|arg| arg == "--json");
            show_plan(Path::new(&path), json)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(0)
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("fsn\n");
    println!("USAGE:");
    println!("  fsn run <config.json>           run one backup cycle");
    println!("  fsn plan <config.json> [--json] show what a cleanup pass would keep/remove");
    println!();
    println!("EXIT CODES:");
    println!("  0 success, 1 driver/io failure, 2 try later,");
    println!("  3 clock anomaly, 4 inconsistent state (operator attention)");
}

fn backup_cycle(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let pair = BtrfsPair::new(
        config.main_volume.clone(),
        config.mirror_volume.clone(),
        config.snapshot_dir.clone(),
    );
    let clock = SystemClock;
    let orchestrator = Orchestrator::new(&pair, &pair, &pair, &clock);
    let outcome = orchestrator.run(&config.backup);
    info!(code = outcome.exit_code(), "run finished");
    Ok(outcome.exit_code())
}

#[derive(Debug, Serialize)]
struct PlanOutput {
    keep: Vec<String>,
    remove: Vec<String>,
}

/// Dry-run: report the retention decision without mutating anything.
fn show_plan(config_path: &Path, json: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let pair = BtrfsPair::new(
        config.main_volume.clone(),
        config.mirror_volume.clone(),
        config.snapshot_dir.clone(),
    );

    let raw = pair
        .list_snapshot_names(VolumeRole::Main)
        .context("failed to list snapshots on main")?;
    let mut snapshots: Vec<SnapshotName> = raw
        .iter()
        .filter_map(|entry| SnapshotName::parse(entry).ok())
        .collect();
    snapshots.sort_unstable();

    let ctx = EvaluationContext::new(SystemClock.now(), config.backup.retention)
        .context("evaluation context")?;
    let plan = retention::plan(&ctx, &snapshots).context("retention evaluation")?;

    let output = PlanOutput {
        keep: plan.keep.iter().map(ToString::to_string).collect(),
        remove: plan.remove.iter().map(ToString::to_string).collect(),
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize plan")?
        );
    } else {
        println!("keep ({}):", output.keep.len());
        for name in &output.keep {
            println!("  {name}");
        }
        println!("remove ({}):", output.remove.len());
        for name in &output.remove {
            println!("  {name}");
        }
    }
    Ok(0)
}

//! Production drivers shelling out to the btrfs tooling.
//!
//! Layout on each volume: snapshots live under `<volume>/<snapshot_dir>/`,
//! one read-only subvolume per snapshot name, and the chain-pointer marker
//! is a `latest` symlink in the same directory, replaced atomically via a
//! temporary link and `rename`.
//!
//! `btrfs scrub` output parsing is kept tolerant: only the `Status:`,
//! `Scrub started:`, `Duration:` and `Error summary:` lines are
//! interpreted, everything else is ignored, and anything unrecognized
//! degrades to `ScrubState::Unknown` (which the scheduler treats as
//! fatal) rather than guessing.

use chrono::NaiveDateTime;
use fsn_engine::{ScrubDriver, ScrubState, ScrubStatus, SnapshotDriver, TransferDriver, VolumeRole};
use fsn_error::{FsnError, Result};
use fsn_types::{EpochSeconds, SnapshotName};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Marker file name inside the snapshot directory.
const MARKER_NAME: &str = "latest";

/// A main/mirror volume pair driven through the `btrfs` binary.
#[derive(Debug, Clone)]
pub struct BtrfsPair {
    main: PathBuf,
    mirror: PathBuf,
    snapshot_dir: String,
}

impl BtrfsPair {
    #[must_use]
    pub fn new(main: PathBuf, mirror: PathBuf, snapshot_dir: String) -> Self {
        Self {
            main,
            mirror,
            snapshot_dir,
        }
    }

    fn volume_root(&self, volume: VolumeRole) -> &Path {
        match volume {
            VolumeRole::Main => &self.main,
            VolumeRole::Mirror => &self.mirror,
        }
    }

    fn snapshot_base(&self, volume: VolumeRole) -> PathBuf {
        self.volume_root(volume).join(&self.snapshot_dir)
    }

    fn snapshot_path(&self, volume: VolumeRole, name: &str) -> PathBuf {
        self.snapshot_base(volume).join(name)
    }

    fn marker_path(&self, volume: VolumeRole) -> PathBuf {
        self.snapshot_base(volume).join(MARKER_NAME)
    }
}

/// Run a btrfs subcommand to completion, mapping failure to a driver error.
fn btrfs(op: &'static str, volume: VolumeRole, args: &[&str]) -> Result<String> {
    debug!(%volume, ?args, "invoking btrfs");
    let output = Command::new("btrfs")
        .args(args)
        .output()
        .map_err(|err| FsnError::Driver {
            op,
            volume: volume.to_string(),
            detail: format!("could not invoke btrfs: {err}"),
        })?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(FsnError::Driver {
            op,
            volume: volume.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

impl SnapshotDriver for BtrfsPair {
    fn create_readonly_snapshot(&self, volume: VolumeRole, name: &SnapshotName) -> Result<()> {
        let base = self.snapshot_base(volume);
        fs::create_dir_all(&base)?;
        let source = self.volume_root(volume);
        let target = self.snapshot_path(volume, &name.to_string());
        btrfs(
            "snapshot create",
            volume,
            &[
                "subvolume",
                "snapshot",
                "-r",
                &source.to_string_lossy(),
                &target.to_string_lossy(),
            ],
        )
        .map(|_| ())
    }

    fn delete_snapshot(&self, volume: VolumeRole, name: &str) -> Result<()> {
        let target = self.snapshot_path(volume, name);
        btrfs(
            "snapshot delete",
            volume,
            &["subvolume", "delete", &target.to_string_lossy()],
        )
        .map(|_| ())
    }

    fn list_snapshot_names(&self, volume: VolumeRole) -> Result<Vec<String>> {
        let base = self.snapshot_base(volume);
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&base)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort_unstable();
        Ok(names)
    }

    fn read_marker(&self, volume: VolumeRole) -> Result<Option<String>> {
        match fs::read_link(self.marker_path(volume)) {
            Ok(target) => Ok(target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_marker(&self, volume: VolumeRole, name: &SnapshotName) -> Result<()> {
        let base = self.snapshot_base(volume);
        let staged = base.join(".latest.tmp");
        let _ = fs::remove_file(&staged);
        symlink(Path::new(&name.to_string()), &staged)?;
        fs::rename(&staged, self.marker_path(volume))?;
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other(
        "chain markers require a unix filesystem",
    ))
}

impl TransferDriver for BtrfsPair {
    fn transfer_full(&self, snapshot: &SnapshotName, destination: VolumeRole) -> Result<()> {
        let source = self.snapshot_path(VolumeRole::Main, &snapshot.to_string());
        send_receive(destination, &[&source.to_string_lossy()], &self.snapshot_base(destination))
    }

    fn transfer_incremental(
        &self,
        basis: &SnapshotName,
        snapshot: &SnapshotName,
        destination: VolumeRole,
    ) -> Result<()> {
        let basis_path = self.snapshot_path(VolumeRole::Main, &basis.to_string());
        let source = self.snapshot_path(VolumeRole::Main, &snapshot.to_string());
        send_receive(
            destination,
            &["-p", &basis_path.to_string_lossy(), &source.to_string_lossy()],
            &self.snapshot_base(destination),
        )
    }
}

/// `btrfs send ... | btrfs receive <dest>`.
fn send_receive(destination: VolumeRole, send_args: &[&str], dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)?;
    let driver_err = |detail: String| FsnError::Driver {
        op: "transfer",
        volume: destination.to_string(),
        detail,
    };

    let mut send = Command::new("btrfs")
        .arg("send")
        .args(send_args)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| driver_err(format!("could not invoke btrfs send: {err}")))?;
    let stream = send
        .stdout
        .take()
        .ok_or_else(|| driver_err("btrfs send produced no stdout".into()))?;

    let receive = Command::new("btrfs")
        .arg("receive")
        .arg(dest_dir)
        .stdin(Stdio::from(stream))
        .output()
        .map_err(|err| driver_err(format!("could not invoke btrfs receive: {err}")))?;
    let send_status = send
        .wait()
        .map_err(|err| driver_err(format!("btrfs send did not exit: {err}")))?;

    if !send_status.success() {
        return Err(driver_err(format!("btrfs send exited with {send_status}")));
    }
    if !receive.status.success() {
        return Err(driver_err(
            String::from_utf8_lossy(&receive.stderr).trim().to_owned(),
        ));
    }
    Ok(())
}

impl ScrubDriver for BtrfsPair {
    fn status(&self, volume: VolumeRole) -> Result<ScrubStatus> {
        let root = self.volume_root(volume).to_string_lossy().into_owned();
        let stdout = btrfs("scrub", volume, &["scrub", "status", &root])?;
        Ok(parse_scrub_status(&stdout))
    }

    fn start(&self, volume: VolumeRole) -> Result<()> {
        let root = self.volume_root(volume).to_string_lossy().into_owned();
        btrfs("scrub", volume, &["scrub", "start", &root]).map(|_| ())
    }

    fn resume(&self, volume: VolumeRole) -> Result<()> {
        let root = self.volume_root(volume).to_string_lossy().into_owned();
        btrfs("scrub", volume, &["scrub", "resume", &root]).map(|_| ())
    }

    fn cancel(&self, volume: VolumeRole) -> Result<()> {
        let root = self.volume_root(volume).to_string_lossy().into_owned();
        btrfs("scrub", volume, &["scrub", "cancel", &root]).map(|_| ())
    }
}

/// Interpret `btrfs scrub status` output.
fn parse_scrub_status(stdout: &str) -> ScrubStatus {
    let mut state = ScrubState::Unknown;
    let mut started: Option<EpochSeconds> = None;
    let mut duration_secs: Option<i64> = None;
    let mut errors_found = false;
    let mut saw_status_line = false;

    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Status" => {
                saw_status_line = true;
                state = match value {
                    "running" => ScrubState::Running,
                    "interrupted" => ScrubState::Interrupted,
                    "aborted" => ScrubState::Aborted,
                    "finished" => ScrubState::Finished,
                    _ => ScrubState::Unknown,
                };
            }
            "Scrub started" => started = parse_ctime(value),
            "Duration" => duration_secs = parse_duration(value),
            "Error summary" => errors_found = value != "no errors found",
            _ => {}
        }
    }

    // A volume that has never been scrubbed prints no Status line; that is
    // a valid "finished, no baseline" report, not an unknown state.
    if !saw_status_line {
        state = ScrubState::Finished;
        started = None;
    }

    let last_completed = match (state, started, duration_secs) {
        (ScrubState::Finished, Some(start), Some(duration)) => {
            Some(EpochSeconds(start.0 + duration))
        }
        _ => None,
    };

    ScrubStatus {
        state,
        last_completed,
        errors_found,
    }
}

/// Parse the ctime-style stamp btrfs prints, e.g. `Tue Jun 15 10:00:00 2021`.
fn parse_ctime(value: &str) -> Option<EpochSeconds> {
    NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|dt| EpochSeconds(dt.and_utc().timestamp()))
}

/// Parse `H:MM:SS` durations (hours may exceed two digits).
fn parse_duration(value: &str) -> Option<i64> {
    let mut parts = value.split(':');
    let hours: i64 = parts.next()?.trim().parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3_600 + minutes * 60 + seconds)
}

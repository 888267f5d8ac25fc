use std::{collections::HashMap, io::ErrorKind, path::Path, process::Output, time::Duration};

use chrono::{NaiveTime, Timelike};
use eyre::{Context, Result, bail};
use tokio::{
    fs::{remove_dir_all, remove_file},
    process::Command,
};
use tracing::debug;

/// Reads an `HH:MM:SS` string through a time-of-day parser and returns the
/// offset from midnight as an elapsed span.
///
/// Hours are capped at 23 by the parser, so `24:00:00` and above are rejected.
pub fn parse_hms(value: &str) -> Option<Duration> {
    let time = NaiveTime::parse_from_str(value, "%H:%M:%S").ok()?;
    // chrono keeps a `:60` leap second as nanoseconds past 1s
    if time.nanosecond() >= 1_000_000_000 {
        return None;
    }
    let secs = u64::from(time.hour()) * 3600 + u64::from(time.minute()) * 60 + u64::from(time.second());
    Some(Duration::from_secs(secs))
}

/// Formats a span as zero-padded `HH:MM:SS` using total hours.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Runs `program` to completion and returns its captured output, failing on a
/// non-zero exit status.
pub async fn simple_command(
    program: &str,
    args: &[String],
    dir: Option<&Path>,
    env: &HashMap<String, String>,
) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args).envs(env);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    debug!("Running command: {program} {}", args.join(" "));
    let output = cmd
        .output()
        .await
        .context(format!("Spawning {program}"))?;

    if !output.status.success() {
        bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Removes a file, treating an already missing file as success.
pub async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match remove_file(path).await {
        Err(err) if err.kind() != ErrorKind::NotFound => {
            Err(err).context(format!("Removing {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// Removes a directory tree, treating an already missing directory as success.
pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match remove_dir_all(path).await {
        Err(err) if err.kind() != ErrorKind::NotFound => {
            Err(err).context(format!("Removing {}", path.display()))
        }
        _ => Ok(()),
    }
}

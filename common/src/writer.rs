use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{NaiveDateTime, TimeDelta};
use eyre::{Context, Result};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::debug;

use crate::{
    record::{HEADER_SENTINEL, WorkerCount},
    util::format_hms,
};

/// Appends measurements to the scalability log in the order the aggregator
/// expects: a label line and header whenever the label changes, then one row
/// per execution.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: File,
    last_label: Option<String>,
}

impl LogWriter {
    /// Opens `path` for appending, creating it if needed. Existing content is
    /// kept.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .context(format!("Opening log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            last_label: None,
        })
    }

    pub fn header() -> String {
        format!("{HEADER_SENTINEL} Start-Date Start-Time Finish-Date Finish-Time Duration")
    }

    /// Appends one measurement for `label`.
    ///
    /// Spans of 24 hours or more are written with their total hours and will be
    /// skipped as malformed when the log is scanned.
    pub async fn record(
        &mut self,
        label: &str,
        workers: WorkerCount,
        started: NaiveDateTime,
        elapsed: Duration,
    ) -> Result<()> {
        let mut lines = String::new();
        if self.last_label.as_deref() != Some(label) {
            lines.push_str(&format!("\n{label}\n\n{}\n", Self::header()));
            self.last_label = Some(label.to_owned());
        }
        let finished = started + TimeDelta::from_std(elapsed)?;
        lines.push_str(&format!(
            "{workers} {} {} {}\n",
            started.format("%Y-%m-%d %H:%M:%S"),
            finished.format("%Y-%m-%d %H:%M:%S"),
            format_hms(elapsed)
        ));

        self.file
            .write_all(lines.as_bytes())
            .await
            .context(format!("Writing to {}", self.path.display()))?;
        self.file.flush().await?;
        debug!("Recorded {label} workers={workers} elapsed={elapsed:?}");
        Ok(())
    }
}

//! Rebuilds `label -> worker count -> duration` from the scalability log.
//!
//! Rows carry no reference to the specification they measured. They belong to
//! whichever label line most recently preceded them, so the scan is strictly
//! in file order and the "current label" lives inside a single [`Aggregator`].

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    time::Duration,
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::read;
use tracing::{debug, warn};

use crate::{
    grid::WorkerGrid,
    record::{Record, RecordError, WorkerCount, parse_line},
};

/// What to do with a six token row whose worker count or duration does not
/// parse.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Drop the row, log a warning and keep scanning
    #[default]
    Skip,
    /// Abort the scan with [`ScanError::Malformed`]
    Fail,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Line {line}: measurement appears before any workload label")]
    OrderingViolation { line: usize },
    #[error("Line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: RecordError,
    },
}

/// A row dropped under [`MalformedPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line: usize,
    pub reason: RecordError,
}

/// The finished aggregate handed to report sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    durations: HashMap<String, BTreeMap<WorkerCount, Duration>>,
    labels: Vec<String>,
    grid: Vec<WorkerCount>,
}

impl AggregateResult {
    /// Per label durations, keyed by worker count
    pub fn durations(&self) -> &HashMap<String, BTreeMap<WorkerCount, Duration>> {
        &self.durations
    }

    /// Labels in order of first appearance in the log
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Ascending, deduplicated worker counts across all labels
    pub fn grid(&self) -> &[WorkerCount] {
        &self.grid
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn duration(&self, label: &str, workers: WorkerCount) -> Option<Duration> {
        self.durations.get(label)?.get(&workers).copied()
    }

    /// One cell per grid value for `label`, `None` where nothing was measured.
    /// Returns `None` for an unknown label.
    pub fn series(&self, label: &str) -> Option<Vec<Option<Duration>>> {
        let cells = self.durations.get(label)?;
        Some(self.grid.iter().map(|w| cells.get(w).copied()).collect())
    }
}

/// Outcome of a full scan: the aggregate plus every row the skip policy dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub result: AggregateResult,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug)]
pub struct Aggregator<'a> {
    label_sentinel: &'a str,
    policy: MalformedPolicy,
    current_label: Option<String>,
    durations: HashMap<String, BTreeMap<WorkerCount, Duration>>,
    labels: Vec<String>,
    grid: WorkerGrid,
    skipped: Vec<SkippedLine>,
    line: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(label_sentinel: &'a str, policy: MalformedPolicy) -> Self {
        Self {
            label_sentinel,
            policy,
            current_label: None,
            durations: HashMap::new(),
            labels: Vec::new(),
            grid: WorkerGrid::new(),
            skipped: Vec::new(),
            line: 0,
        }
    }

    /// Feeds the next line of the log.
    pub fn push_line(&mut self, raw: &str) -> Result<(), ScanError> {
        self.line += 1;
        let record = match parse_line(raw, self.label_sentinel) {
            Ok(record) => record,
            Err(source) => return self.malformed(source),
        };

        match record {
            Record::Noise => {}
            Record::Label(label) => {
                if !self.durations.contains_key(label) {
                    self.durations.insert(label.to_owned(), BTreeMap::new());
                    self.labels.push(label.to_owned());
                } else {
                    debug!("Label {label} seen again at line {}", self.line);
                }
                self.current_label = Some(label.to_owned());
            }
            Record::Data { workers, duration } => {
                let label = self
                    .current_label
                    .as_ref()
                    .ok_or(ScanError::OrderingViolation { line: self.line })?;
                let cells = self.durations.entry(label.clone()).or_default();
                if let Some(previous) = cells.insert(workers, duration) {
                    debug!(
                        "Line {}: {label} with {workers} workers rerun, replacing {previous:?} with {duration:?}",
                        self.line
                    );
                }
                self.grid.insert(workers);
            }
        }
        Ok(())
    }

    fn malformed(&mut self, source: RecordError) -> Result<(), ScanError> {
        match self.policy {
            MalformedPolicy::Fail => Err(ScanError::Malformed {
                line: self.line,
                source,
            }),
            MalformedPolicy::Skip => {
                warn!("Skipping line {}: {source}", self.line);
                self.skipped.push(SkippedLine {
                    line: self.line,
                    reason: source,
                });
                Ok(())
            }
        }
    }

    /// Snapshot of the aggregate so far. Does not consume or alter the scan.
    pub fn export(&self) -> AggregateResult {
        AggregateResult {
            durations: self.durations.clone(),
            labels: self.labels.clone(),
            grid: self.grid.to_vec(),
        }
    }

    pub fn finish(self) -> Scan {
        Scan {
            result: AggregateResult {
                durations: self.durations,
                labels: self.labels,
                grid: self.grid.to_vec(),
            },
            skipped: self.skipped,
        }
    }
}

/// Scans a whole log held in memory.
pub fn aggregate(
    contents: &str,
    label_sentinel: &str,
    policy: MalformedPolicy,
) -> Result<Scan, ScanError> {
    let mut aggregator = Aggregator::new(label_sentinel, policy);
    for line in contents.lines() {
        aggregator.push_line(line)?;
    }
    Ok(aggregator.finish())
}

/// Reads and scans the log at `path`.
///
/// Workloads may write arbitrary bytes into the log, so lines are decoded
/// lossily and invalid UTF-8 ends up as noise instead of failing the read.
pub async fn aggregate_file(
    path: &Path,
    label_sentinel: &str,
    policy: MalformedPolicy,
) -> Result<Scan> {
    let contents = read(path)
        .await
        .context(format!("Reading {}", path.display()))?;
    let mut aggregator = Aggregator::new(label_sentinel, policy);
    for line in contents.split(|b| *b == b'\n') {
        aggregator
            .push_line(&String::from_utf8_lossy(line))
            .context(format!("Scanning {}", path.display()))?;
    }
    let scan = aggregator.finish();
    debug!(
        "Scanned {}: labels={:?} grid={:?} skipped={}",
        path.display(),
        scan.result.labels(),
        scan.result.grid(),
        scan.skipped.len()
    );
    Ok(scan)
}

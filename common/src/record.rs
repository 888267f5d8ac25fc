//! Line classification for the scalability log.
//!
//! The log interleaves three kinds of lines: a label naming the workload
//! specification that the following measurements belong to, a `Slaves` header,
//! and fixed-width measurement rows. Everything else is noise.

use std::time::Duration;

use thiserror::Error;

use crate::util::parse_hms;

pub type WorkerCount = u32;

/// First token of the column header the harness writes under every label.
pub const HEADER_SENTINEL: &str = "Slaves";
/// Substring marking a first token as a specification label.
pub const DEFAULT_LABEL_SENTINEL: &str = "kw_data";
/// Exact token count of a measurement row.
pub const DATA_FIELDS: usize = 6;

const WORKERS_FIELD: usize = 0;
const DURATION_FIELD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    /// Starts a new label scope
    Label(&'a str),
    /// A single measurement for the current label
    Data {
        workers: WorkerCount,
        duration: Duration,
    },
    Noise,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Invalid worker count '{0}'")]
    WorkerCount(String),
    #[error("Invalid duration '{0}', expected HH:MM:SS")]
    Duration(String),
}

/// Classifies a single raw log line.
///
/// A first token containing `label_sentinel` always wins over the row shape,
/// and the `Slaves` header is discarded even though it has six tokens. Only a
/// row with exactly [`DATA_FIELDS`] tokens can fail, and only on its worker
/// count or duration field.
pub fn parse_line<'a>(line: &'a str, label_sentinel: &str) -> Result<Record<'a>, RecordError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Ok(Record::Noise);
    };

    if *first == HEADER_SENTINEL {
        return Ok(Record::Noise);
    }
    if first.contains(label_sentinel) {
        return Ok(Record::Label(first));
    }
    if tokens.len() != DATA_FIELDS {
        return Ok(Record::Noise);
    }

    let workers = tokens[WORKERS_FIELD]
        .parse::<WorkerCount>()
        .map_err(|_| RecordError::WorkerCount(tokens[WORKERS_FIELD].to_owned()))?;
    let duration = parse_hms(tokens[DURATION_FIELD])
        .ok_or_else(|| RecordError::Duration(tokens[DURATION_FIELD].to_owned()))?;

    Ok(Record::Data { workers, duration })
}

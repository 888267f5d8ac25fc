use core::fmt::Debug;
use std::path::{Path, PathBuf};

use dyn_clone::{DynClone, clone_trait_object};
use eyre::{ContextCompat, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    config::{Params, Settings},
    record::{HEADER_SENTINEL, WorkerCount},
    sweep::SweepStep,
    writer::LogWriter,
};

/// One workload configuration, identified in the log by its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub label: String,
    pub path: PathBuf,
}

impl WorkloadSpec {
    /// Uses the file name of `path` as the label
    pub fn from_path(path: &Path) -> Result<Self> {
        let label = path
            .file_name()
            .and_then(|name| name.to_str())
            .context(format!("Invalid specification path {}", path.display()))?
            .to_owned();
        Ok(Self {
            label,
            path: path.to_path_buf(),
        })
    }

    /// The label must come back out of the log as a single label token.
    pub fn validate(&self, label_sentinel: &str) -> Result<()> {
        if self.label.split_whitespace().count() != 1 {
            bail!("Specification label '{}' must be a single token", self.label);
        }
        if self.label == HEADER_SENTINEL {
            bail!("Specification label cannot be '{HEADER_SENTINEL}'");
        }
        if !self.label.contains(label_sentinel) {
            bail!(
                "Specification label '{}' does not contain '{label_sentinel}'",
                self.label
            );
        }
        Ok(())
    }
}

/// Everything an executor may need besides the step itself.
#[derive(Debug, Clone, Copy)]
pub struct ExecContext<'a> {
    pub settings: &'a Settings,
    /// Workload parameters, with debug overrides already applied
    pub params: &'a Params,
}

#[typetag::serde(tag = "type")]
#[async_trait::async_trait]
pub trait Executor: Debug + DynClone + Send + Sync {
    /// Name of the executor, for identification
    fn name(&self) -> &'static str;
    /// Runs the workload once and makes sure exactly one measurement row for
    /// `step` ends up in the log
    ///
    /// Arguments:
    /// * `step` - The specification and worker count to run
    /// * `ctx` - Settings and workload parameters
    /// * `log` - Writer for the shared log, for executors that time the run themselves
    async fn execute(
        &self,
        step: &SweepStep<'_>,
        ctx: &ExecContext<'_>,
        log: &mut LogWriter,
    ) -> Result<()>;
}
clone_trait_object!(Executor);

pub fn worker_label(workers: WorkerCount) -> String {
    match workers {
        0 => "serial".to_owned(),
        n => format!("{n} workers"),
    }
}

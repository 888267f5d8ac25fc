use core::fmt::Debug;
use std::path::Path;

use dyn_clone::{DynClone, clone_trait_object};
use eyre::{Context, Result};
use tracing::debug;

use crate::{aggregate::AggregateResult, config::Config};

#[typetag::serde(tag = "type")]
#[async_trait::async_trait]
pub trait Report: Debug + DynClone + Send + Sync {
    /// Name of the report, for identification
    fn name(&self) -> &'static str;
    /// Renders the aggregate
    ///
    /// Arguments:
    /// * `result` - Durations per label and worker count, label order and the worker grid
    /// * `config` - The config the sweep ran with
    /// * `out_dir` - The results folder of this run
    async fn report(&self, result: &AggregateResult, config: &Config, out_dir: &Path)
    -> Result<()>;
}
clone_trait_object!(Report);

pub async fn report(
    reports: &[Box<dyn Report>],
    result: &AggregateResult,
    config: &Config,
    out_dir: &Path,
) -> Result<()> {
    if reports.is_empty() {
        debug!("No reports");
        return Ok(());
    }

    for report in reports {
        debug!("Running report {}", report.name());
        report
            .report(result, config, out_dir)
            .await
            .context(format!("Report {}", report.name()))?;
    }
    Ok(())
}

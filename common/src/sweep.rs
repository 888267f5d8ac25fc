//! Drives the executor over every (specification, worker count) pair.
//!
//! The aggregator attributes each row to the label line preceding it, so the
//! plan is specification-major: all worker counts of one specification run
//! back to back before the next specification starts.

use eyre::{Context, Result};
use itertools::iproduct;
use tokio::fs::create_dir_all;
use tracing::{debug, error, info};

use crate::{
    bench::{ExecContext, Executor, WorkloadSpec},
    config::Settings,
    record::WorkerCount,
    util::{remove_dir_if_exists, remove_file_if_exists},
    writer::LogWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStep<'a> {
    /// Index of `spec` in the full specification list
    pub spec_index: usize,
    pub spec: &'a WorkloadSpec,
    pub workers: WorkerCount,
}

/// Orders the executions: outer loop over specifications starting at
/// `start_at`, inner loop over `grid`.
pub fn sweep_plan<'a>(
    specs: &'a [WorkloadSpec],
    grid: &[WorkerCount],
    start_at: usize,
) -> Vec<SweepStep<'a>> {
    iproduct!(
        specs.iter().enumerate().skip(start_at),
        grid.iter().copied()
    )
    .map(|((spec_index, spec), workers)| SweepStep {
        spec_index,
        spec,
        workers,
    })
    .collect()
}

/// Removes the previous log and scratch artifacts so a new sweep never merges
/// with stale rows.
pub async fn cleanup(settings: &Settings) -> Result<()> {
    debug!("Removing {}", settings.log_file.display());
    remove_file_if_exists(&settings.log_file).await?;
    if let Some(scratch) = &settings.scratch_dir {
        debug!("Resetting scratch dir {}", scratch.display());
        remove_dir_if_exists(scratch).await?;
        create_dir_all(scratch)
            .await
            .context(format!("Creating {}", scratch.display()))?;
    }
    Ok(())
}

/// Runs `plan` one step at a time. The first failing step aborts the sweep;
/// rows already written stay in the log.
pub async fn run_sweep<F>(
    executor: &dyn Executor,
    ctx: &ExecContext<'_>,
    plan: &[SweepStep<'_>],
    log: &mut LogWriter,
    mut on_step: F,
) -> Result<()>
where
    F: FnMut(&SweepStep<'_>),
{
    for step in plan {
        debug!(
            "spec={} index={} workers={}",
            step.spec.label, step.spec_index, step.workers
        );
        if let Err(err) = executor.execute(step, ctx, log).await {
            error!(
                "Failed to run {} with {} workers: {err}",
                step.spec.label, step.workers
            );
            return Err(err).context(format!(
                "Executing {} (spec index {}) with {} workers",
                step.spec.label, step.spec_index, step.workers
            ));
        }
        on_step(step);
    }
    info!("Sweep complete, {} executions", plan.len());
    Ok(())
}

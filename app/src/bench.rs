use std::path::{Path, PathBuf};

use chrono::Local;
use common::{
    aggregate::aggregate_file,
    bench::{ExecContext, worker_label},
    config::Config,
    plot::report,
    sweep::{cleanup, run_sweep, sweep_plan},
    util::simple_command,
    writer::LogWriter,
};
use eyre::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::{copy, create_dir_all};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_file: PathBuf,
    pub results_root: PathBuf,
    pub debug: bool,
    pub compile: bool,
    pub finalize: bool,
    pub start_at: usize,
    pub skip_report: bool,
    pub no_progress: bool,
}

pub async fn run_benchmark(opts: RunOptions) -> Result<()> {
    let config = Config::load(&opts.config_file).await?;

    if opts.finalize {
        debug!("Finalizing from {}", config.settings.log_file.display());
        finalize(&config, &opts).await?;
        return Ok(());
    }

    let settings = &config.settings;
    let (grid, params) = config.sweep_parameters(opts.debug);
    let specs = config.specs.discover(&settings.label_sentinel)?;
    if specs.is_empty() {
        bail!(
            "No specifications matching '{}' in {}",
            config.specs.pattern,
            config.specs.dir.display()
        );
    }
    if opts.start_at >= specs.len() {
        bail!(
            "Cannot start at specification {}, only {} found",
            opts.start_at,
            specs.len()
        );
    }
    debug!(
        "Loaded specs: {:?} grid={grid:?} params={params:?}",
        specs.iter().map(|s| &s.label).collect::<Vec<_>>()
    );

    if opts.start_at == 0 {
        cleanup(settings).await?;
    } else {
        warn!(
            "Restarting at {} (index {}), appending to {}",
            specs[opts.start_at].label,
            opts.start_at,
            settings.log_file.display()
        );
    }

    if opts.compile {
        compile(&config).await?;
    }

    let plan = sweep_plan(&specs, &grid, opts.start_at);
    let bar = progress_bar(plan.len() as u64, opts.no_progress)?;
    let mut log = LogWriter::open(&settings.log_file).await?;
    let ctx = ExecContext {
        settings,
        params: &params,
    };
    let result = run_sweep(&*config.executor, &ctx, &plan, &mut log, |step| {
        bar.set_message(format!("{} {}", step.spec.label, worker_label(step.workers)));
        bar.inc(1);
    })
    .await;
    bar.finish_and_clear();
    result?;

    if opts.skip_report {
        debug!("Skipping reports");
        return Ok(());
    }
    finalize(&config, &opts).await?;
    Ok(())
}

async fn compile(config: &Config) -> Result<()> {
    let Some(step) = &config.compile else {
        bail!("--compile given but the config has no compile step");
    };
    let args = step.args.clone().unwrap_or_default();
    simple_command(&step.program, &args, step.dir.as_deref(), &config.env())
        .await
        .context("Compile step")?;
    debug!("Compiled with {} {}", step.program, args.join(" "));
    Ok(())
}

/// Aggregates the log and hands the result to the reports. Returns the
/// results folder.
async fn finalize(config: &Config, opts: &RunOptions) -> Result<PathBuf> {
    let settings = &config.settings;
    let scan = aggregate_file(
        &settings.log_file,
        &settings.label_sentinel,
        settings.malformed,
    )
    .await?;
    if !scan.skipped.is_empty() {
        warn!("{} malformed lines skipped", scan.skipped.len());
    }
    if scan.result.is_empty() {
        warn!("No workload labels in {}", settings.log_file.display());
    }

    let file_prefix = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let results_path = opts
        .results_root
        .join(format!("{}-{file_prefix}", config.name));
    println!("Results created in folder: {}", results_path.display());
    create_dir_all(&results_path).await?;
    copy(&opts.config_file, results_path.join("config.yaml")).await?;
    copy(&settings.log_file, results_path.join(log_name(&settings.log_file))).await?;

    report(&config.reports, &scan.result, config, &results_path).await?;
    Ok(results_path)
}

fn log_name(path: &Path) -> PathBuf {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("scalability.log"))
}

fn progress_bar(len: u64, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );
    Ok(bar)
}

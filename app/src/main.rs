use std::path::PathBuf;

use clap::Parser;
use eyre::Result;
use tokio::fs::create_dir_all;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod bench;

const MODULES: &[&str] = &["common", "cmd", "scalability_basic"];
const RESULTS_DIR: &str = "results";

#[derive(Parser)]
#[command(about = "Run a workload over a grid of worker counts and report the durations")]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config_file: PathBuf,
    /// Use the debug grid and parameters
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Run the configured build step before the sweep
    #[arg(long, default_value_t = false)]
    compile: bool,
    /// Skip execution, aggregate the existing log and run the reports
    #[arg(long, default_value_t = false)]
    finalize: bool,
    /// Restart at this specification index, appending to the existing log
    #[arg(long, default_value_t = 0)]
    start_at: usize,
    /// Do not run the reports after the sweep
    #[arg(long, default_value_t = false)]
    skip_report: bool,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    #[arg(short, long)]
    log: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("scalability_benchmark={log_level}"));

    if !args.log.is_empty() {
        for log in &args.log {
            env_filter = env_filter.add_directive(log.parse()?);
        }
    }

    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    cmd::init_executors();
    scalability_basic::init_plots();

    create_dir_all(RESULTS_DIR).await?;
    let opts = bench::RunOptions {
        config_file: args.config_file,
        results_root: PathBuf::from(RESULTS_DIR),
        debug: args.debug,
        compile: args.compile,
        finalize: args.finalize,
        start_at: args.start_at,
        skip_report: args.skip_report,
        no_progress: args.no_progress,
    };
    if let Err(err) = bench::run_benchmark(opts).await {
        error!("{err:#?}");
        return Err(err);
    }

    Ok(())
}

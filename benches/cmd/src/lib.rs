use std::{path::PathBuf, time::Instant};

use chrono::Local;
use common::{
    bench::{ExecContext, Executor},
    config::Params,
    record::WorkerCount,
    sweep::SweepStep,
    util::simple_command,
    writer::LogWriter,
};
use eyre::{Context, Result};
use handlebars::{Handlebars, no_escape};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runs an arbitrary program once per sweep step.
///
/// Arguments are handlebars templates rendered with `label`, `spec_path`,
/// `workers`, `log_file` and `params`. The same values are exported to the
/// program as `SCALABILITY_*` environment variables.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cmd {
    pub program: String,
    pub args: Option<Vec<String>>,
    pub dir: Option<PathBuf>,
    /// The program appends its own rows to the log instead of being timed here
    #[serde(default)]
    pub self_logging: bool,
}

#[derive(Debug, Serialize)]
struct ArgContext<'a> {
    label: &'a str,
    spec_path: String,
    workers: WorkerCount,
    log_file: String,
    params: &'a Params,
}

pub fn init_executors() {
    _ = serde_json::to_string(&Cmd::default());
}

impl Cmd {
    fn arg_context<'a>(&self, step: &SweepStep<'a>, ctx: &ExecContext<'a>) -> ArgContext<'a> {
        ArgContext {
            label: &step.spec.label,
            spec_path: step.spec.path.to_string_lossy().to_string(),
            workers: step.workers,
            log_file: ctx.settings.log_file.to_string_lossy().to_string(),
            params: ctx.params,
        }
    }

    fn render_args(&self, context: &ArgContext<'_>) -> Result<Vec<String>> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(no_escape);

        self.args
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|arg| {
                handlebars
                    .render_template(arg, context)
                    .context(format!("Rendering argument '{arg}'"))
            })
            .collect()
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Executor for Cmd {
    fn name(&self) -> &'static str {
        "cmd"
    }

    async fn execute(
        &self,
        step: &SweepStep<'_>,
        ctx: &ExecContext<'_>,
        log: &mut LogWriter,
    ) -> Result<()> {
        let context = self.arg_context(step, ctx);
        let args = self.render_args(&context)?;

        let mut env = ctx.settings.env.clone().unwrap_or_default();
        env.insert("SCALABILITY_LABEL".to_owned(), context.label.to_owned());
        env.insert("SCALABILITY_SPEC".to_owned(), context.spec_path.clone());
        env.insert("SCALABILITY_WORKERS".to_owned(), step.workers.to_string());
        env.insert("SCALABILITY_LOG".to_owned(), context.log_file.clone());

        let started = Local::now().naive_local();
        let timer = Instant::now();
        let output = simple_command(&self.program, &args, self.dir.as_deref(), &env)
            .await
            .context(format!("Running {} for {}", self.program, step.spec.label))?;
        let elapsed = timer.elapsed();
        debug!(
            "{} workers={} finished in {elapsed:?}: {}",
            step.spec.label,
            step.workers,
            String::from_utf8_lossy(&output.stdout).trim()
        );

        if self.self_logging {
            return Ok(());
        }
        log.record(&step.spec.label, step.workers, started, elapsed)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use common::{
        aggregate::{MalformedPolicy, aggregate},
        bench::WorkloadSpec,
        config::Settings,
        record::DEFAULT_LABEL_SENTINEL,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::fs::read_to_string;

    use super::*;

    fn settings(log_file: &Path) -> Settings {
        Settings {
            log_file: log_file.to_path_buf(),
            scratch_dir: None,
            label_sentinel: DEFAULT_LABEL_SENTINEL.to_owned(),
            malformed: MalformedPolicy::Fail,
            env: None,
        }
    }

    fn spec() -> WorkloadSpec {
        WorkloadSpec {
            label: "kw_data_one.ini".to_owned(),
            path: PathBuf::from("specs/kw_data_one.ini"),
        }
    }

    fn shell(script: &str) -> Cmd {
        Cmd {
            program: "sh".to_owned(),
            args: Some(vec!["-c".to_owned(), script.to_owned()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_args() -> Result<()> {
        let settings = settings(Path::new("scalability.info"));
        let params = Params::from([
            ("maxfun".to_owned(), json!(1000)),
            ("optimizer".to_owned(), json!("FORT-NEWUOA")),
        ]);
        let ctx = ExecContext {
            settings: &settings,
            params: &params,
        };
        let spec = spec();
        let step = SweepStep {
            spec_index: 0,
            spec: &spec,
            workers: 5,
        };
        let cmd = Cmd {
            program: "respy-estimate".to_owned(),
            args: Some(vec![
                "{{spec_path}}".to_owned(),
                "--workers={{workers}}".to_owned(),
                "--maxfun".to_owned(),
                "{{params.maxfun}}".to_owned(),
                "--optimizer={{params.optimizer}}".to_owned(),
                "--log={{log_file}}".to_owned(),
                "<{{label}}>".to_owned(),
            ]),
            ..Default::default()
        };

        let args = cmd.render_args(&cmd.arg_context(&step, &ctx))?;
        assert_eq!(
            args,
            vec![
                "specs/kw_data_one.ini",
                "--workers=5",
                "--maxfun",
                "1000",
                "--optimizer=FORT-NEWUOA",
                "--log=scalability.info",
                "<kw_data_one.ini>",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_config_rejects_unknown_fields() -> Result<()> {
        let cmd: Box<dyn Executor> =
            serde_json::from_value(json!({"type": "Cmd", "program": "true", "args": ["x"]}))?;
        assert_eq!(cmd.name(), "cmd");

        let typo = serde_json::from_value::<Box<dyn Executor>>(
            json!({"type": "Cmd", "program": "true", "selfLogging": true}),
        );
        assert!(typo.is_err());
        Ok(())
    }

    #[test]
    fn test_render_unknown_param_fails() {
        let settings = settings(Path::new("scalability.info"));
        let params = Params::new();
        let ctx = ExecContext {
            settings: &settings,
            params: &params,
        };
        let spec = spec();
        let step = SweepStep {
            spec_index: 0,
            spec: &spec,
            workers: 0,
        };
        let cmd = Cmd {
            program: "true".to_owned(),
            args: Some(vec!["{{params.missing}}".to_owned()]),
            ..Default::default()
        };
        assert!(cmd.render_args(&cmd.arg_context(&step, &ctx)).is_err());
    }

    #[tokio::test]
    async fn test_execute_records_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings(&dir.path().join("scalability.info"));
        let params = Params::new();
        let ctx = ExecContext {
            settings: &settings,
            params: &params,
        };
        let spec = spec();
        let mut log = LogWriter::open(&settings.log_file).await?;
        let cmd = shell("test \"$SCALABILITY_WORKERS\" = 2");

        let step = SweepStep {
            spec_index: 0,
            spec: &spec,
            workers: 2,
        };
        cmd.execute(&step, &ctx, &mut log).await?;

        let scan = aggregate(
            &read_to_string(&settings.log_file).await?,
            DEFAULT_LABEL_SENTINEL,
            MalformedPolicy::Fail,
        )?;
        assert_eq!(scan.result.labels(), ["kw_data_one.ini"]);
        assert_eq!(scan.result.grid(), [2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_self_logging_program() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings(&dir.path().join("scalability.info"));
        let params = Params::new();
        let ctx = ExecContext {
            settings: &settings,
            params: &params,
        };
        let spec = spec();
        let mut log = LogWriter::open(&settings.log_file).await?;
        let mut cmd = shell(
            "printf '%s\\n%s 1 2 3 4 00:00:07\\n' \"$SCALABILITY_LABEL\" \"$SCALABILITY_WORKERS\" >> \"$SCALABILITY_LOG\"",
        );
        cmd.self_logging = true;

        let step = SweepStep {
            spec_index: 0,
            spec: &spec,
            workers: 3,
        };
        cmd.execute(&step, &ctx, &mut log).await?;

        let scan = aggregate(
            &read_to_string(&settings.log_file).await?,
            DEFAULT_LABEL_SENTINEL,
            MalformedPolicy::Fail,
        )?;
        assert_eq!(
            scan.result.duration("kw_data_one.ini", 3),
            Some(Duration::from_secs(7))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_program_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings(&dir.path().join("scalability.info"));
        let params = Params::new();
        let ctx = ExecContext {
            settings: &settings,
            params: &params,
        };
        let spec = spec();
        let mut log = LogWriter::open(&settings.log_file).await?;

        let step = SweepStep {
            spec_index: 0,
            spec: &spec,
            workers: 0,
        };
        assert!(shell("exit 2").execute(&step, &ctx, &mut log).await.is_err());
        assert_eq!(read_to_string(&settings.log_file).await?, "");
        Ok(())
    }
}

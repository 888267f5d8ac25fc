use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use eyre::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;
use walkdir::WalkDir;

use crate::{
    aggregate::MalformedPolicy,
    bench::{Executor, WorkloadSpec},
    plot::Report,
    record::{DEFAULT_LABEL_SENTINEL, WorkerCount},
};

/// Workload parameters handed to the executor
pub type Params = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub settings: Settings,
    pub specs: SpecSource,
    pub grid: Vec<WorkerCount>,
    #[serde(default)]
    pub params: Params,
    pub debug: Option<DebugOverrides>,
    pub compile: Option<CompileStep>,
    pub executor: Box<dyn Executor>,
    #[serde(default)]
    pub reports: Vec<Box<dyn Report>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log_file: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    #[serde(default = "default_label_sentinel")]
    pub label_sentinel: String,
    #[serde(default)]
    pub malformed: MalformedPolicy,
    pub env: Option<HashMap<String, String>>,
}

fn default_label_sentinel() -> String {
    DEFAULT_LABEL_SENTINEL.to_owned()
}

/// Where workload specifications live: every file directly inside `dir` whose
/// name matches `pattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSource {
    pub dir: PathBuf,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugOverrides {
    pub grid: Option<Vec<WorkerCount>>,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileStep {
    pub program: String,
    pub args: Option<Vec<String>>,
    pub dir: Option<PathBuf>,
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = read_to_string(path)
            .await
            .context(format!("Reading {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = serde_yml::from_str(contents).context("Parsing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sentinel = &self.settings.label_sentinel;
        if sentinel.is_empty() || sentinel.split_whitespace().count() != 1 {
            bail!("label_sentinel must be a single non-empty token, got '{sentinel}'");
        }
        if self.grid.is_empty() {
            bail!("grid must contain at least one worker count");
        }
        if let Some(grid) = self.debug.as_ref().and_then(|d| d.grid.as_ref())
            && grid.is_empty()
        {
            bail!("debug grid must contain at least one worker count");
        }
        Regex::new(&self.specs.pattern).context("Invalid specs pattern")?;
        Ok(())
    }

    /// The worker counts and parameters for a sweep. In debug mode the debug
    /// grid replaces the main one and debug params are merged over the base.
    pub fn sweep_parameters(&self, debug: bool) -> (Vec<WorkerCount>, Params) {
        let mut grid = self.grid.clone();
        let mut params = self.params.clone();
        if debug && let Some(overrides) = &self.debug {
            if let Some(debug_grid) = &overrides.grid {
                grid = debug_grid.clone();
            }
            params.extend(overrides.params.clone());
        }
        (grid, params)
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.settings.env.clone().unwrap_or_default()
    }
}

impl SpecSource {
    /// Finds the specification files, sorted by file name.
    pub fn discover(&self, label_sentinel: &str) -> Result<Vec<WorkloadSpec>> {
        let pattern = Regex::new(&self.pattern)?;
        let mut specs = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.context(format!("Listing {}", self.dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.is_match(name));
            if !matches {
                continue;
            }
            let spec = WorkloadSpec::from_path(entry.path())?;
            spec.validate(label_sentinel)?;
            specs.push(spec);
        }
        Ok(specs)
    }
}

use std::{collections::BTreeMap, path::Path};

use common::{
    aggregate::AggregateResult, config::Config, plot::Report, record::WorkerCount,
    util::format_hms,
};
use console::style;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};
use tokio::fs::write;
use tracing::debug;

const MISSING: &str = "-";

/// Writes the aggregate as JSON, durations in whole seconds.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalabilityJson {
    pub filename: Option<String>,
}

/// Writes one row per worker count and one column per label. Cells without a
/// measurement are left empty.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalabilityCsv {
    pub filename: Option<String>,
    #[serde(default)]
    pub speedup: bool,
}

/// Prints the duration grid to stdout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalabilityTable {
    #[serde(default)]
    pub speedup: bool,
}

pub fn init_plots() {
    _ = serde_json::to_string(&ScalabilityJson::default());
    _ = serde_json::to_string(&ScalabilityCsv::default());
    _ = serde_json::to_string(&ScalabilityTable::default());
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalabilitySummary {
    pub name: String,
    pub labels: Vec<String>,
    pub grid: Vec<WorkerCount>,
    pub durations: BTreeMap<String, BTreeMap<WorkerCount, u64>>,
}

impl ScalabilitySummary {
    pub fn new(name: &str, result: &AggregateResult) -> Self {
        let durations = result
            .durations()
            .iter()
            .map(|(label, cells)| {
                let secs = cells.iter().map(|(w, d)| (*w, d.as_secs())).collect();
                (label.clone(), secs)
            })
            .collect();
        Self {
            name: name.to_owned(),
            labels: result.labels().to_vec(),
            grid: result.grid().to_vec(),
            durations,
        }
    }
}

/// Speedup of every grid cell relative to the smallest worker count measured
/// for `label`.
pub fn speedup_series(result: &AggregateResult, label: &str) -> Option<Vec<Option<f64>>> {
    let series = result.series(label)?;
    let baseline = series.iter().flatten().next().copied();
    Some(
        series
            .iter()
            .map(|cell| {
                let (base, cell) = (baseline?, (*cell)?);
                if cell.is_zero() {
                    return None;
                }
                Some(base.as_secs_f64() / cell.as_secs_f64())
            })
            .collect(),
    )
}

pub fn csv_bytes(result: &AggregateResult, speedup: bool) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);

    let mut header = vec!["workers".to_owned()];
    header.extend(result.labels().iter().cloned());
    if speedup {
        header.extend(result.labels().iter().map(|l| format!("{l} speedup")));
    }
    writer.write_record(&header)?;

    let series = result
        .labels()
        .iter()
        .map(|label| result.series(label).unwrap_or_default())
        .collect::<Vec<_>>();
    let speedups = result
        .labels()
        .iter()
        .map(|label| speedup_series(result, label).unwrap_or_default())
        .collect::<Vec<_>>();

    for (idx, workers) in result.grid().iter().enumerate() {
        let mut row = vec![workers.to_string()];
        row.extend(series.iter().map(|cells| match cells.get(idx).copied().flatten() {
            Some(d) => d.as_secs().to_string(),
            None => String::new(),
        }));
        if speedup {
            row.extend(speedups.iter().map(|cells| match cells.get(idx).copied().flatten() {
                Some(s) => format!("{s:.2}"),
                None => String::new(),
            }));
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|err| eyre!("Flushing csv: {}", err.error()))
}

pub fn render_table(result: &AggregateResult, speedup: bool) -> String {
    let mut builder = Builder::default();
    let mut header = vec!["Workers".to_owned()];
    header.extend(result.labels().iter().cloned());
    builder.push_record(header);

    let columns = result
        .labels()
        .iter()
        .map(|label| {
            let series = result.series(label).unwrap_or_default();
            let speedups = speedup_series(result, label).unwrap_or_default();
            series
                .iter()
                .enumerate()
                .map(|(idx, cell)| match (cell, speedups.get(idx).copied().flatten()) {
                    (None, _) => MISSING.to_owned(),
                    (Some(d), Some(s)) if speedup => format!("{} ({s:.2}x)", format_hms(*d)),
                    (Some(d), _) => format_hms(*d),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    for (idx, workers) in result.grid().iter().enumerate() {
        let mut row = vec![workers.to_string()];
        row.extend(
            columns
                .iter()
                .map(|cells| cells.get(idx).cloned().unwrap_or_else(|| MISSING.to_owned())),
        );
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::modern());
    table.to_string()
}

#[async_trait::async_trait]
#[typetag::serde]
impl Report for ScalabilityJson {
    fn name(&self) -> &'static str {
        "scalability-json"
    }

    async fn report(&self, result: &AggregateResult, config: &Config, out_dir: &Path) -> Result<()> {
        let path = out_dir.join(self.filename.as_deref().unwrap_or("scalability.json"));
        let summary = ScalabilitySummary::new(&config.name, result);
        write(&path, serde_json::to_string_pretty(&summary)?).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Report for ScalabilityCsv {
    fn name(&self) -> &'static str {
        "scalability-csv"
    }

    async fn report(&self, result: &AggregateResult, _config: &Config, out_dir: &Path) -> Result<()> {
        let path = out_dir.join(self.filename.as_deref().unwrap_or("scalability.csv"));
        write(&path, csv_bytes(result, self.speedup)?).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Report for ScalabilityTable {
    fn name(&self) -> &'static str {
        "scalability-table"
    }

    async fn report(&self, result: &AggregateResult, config: &Config, _out_dir: &Path) -> Result<()> {
        println!("{}", style(&config.name).bold());
        if result.is_empty() {
            println!("No measurements");
            return Ok(());
        }
        println!("{}", render_table(result, self.speedup));
        Ok(())
    }
}

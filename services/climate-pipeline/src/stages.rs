//! Pipeline stages.
//!
//! Each stage reads what the previous one wrote, so stages can run
//! separately or back to back through [`Pipeline::run`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chunked_array::{ChunkedArray, Dataset, Value};
use climate_indices::names::{self, YEARLY_STATS_GROUP};
use climate_indices::{
    kelvin_to_celsius, relative_humidity, AnnualIndex, ClimatologyBuilder, IndexEngine,
    TrendEngine,
};
use serde::Serialize;
use tracing::{info, warn};
use zarr_store::{WriteMode, WriteReport, ZarrDatasetReader, ZarrDatasetWriter};

use crate::config::PipelineConfig;

/// Outcome of the trend stage for one variable.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub variable: String,
    /// Group the variable was read from (`None` for the store root).
    pub group: Option<String>,
    pub path: PathBuf,
    pub cells: usize,
    pub significant_cells: usize,
}

/// Variables and groups of a store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreListing {
    pub root: PathBuf,
    pub variables: Vec<String>,
    pub groups: Vec<GroupListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupListing {
    pub name: String,
    pub variables: Vec<String>,
}

/// Runs the index and trend stages with one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    writer: ZarrDatasetWriter,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let writer = ZarrDatasetWriter::new(config.storage.clone());
        Self { config, writer }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load `t2m` and `d2m` from the input stores.
    ///
    /// Each variable is taken from the first input that has it. A
    /// `valid_time` axis is renamed to `time`.
    pub fn load_inputs(&self) -> Result<Dataset> {
        if self.config.inputs.is_empty() {
            bail!("No input stores configured");
        }

        let mut dataset = Dataset::new();
        for input in &self.config.inputs {
            let reader = ZarrDatasetReader::open(input)
                .with_context(|| format!("Failed to open input store: {}", input.display()))?;
            for name in [names::T2M, names::D2M] {
                if dataset.contains(name) || !reader.has_variable(None, name) {
                    continue;
                }
                let mut field = reader.read_variable(None, name)?;
                if field.has_axis(names::VALID_TIME) {
                    field = field.rename_axis(names::VALID_TIME, names::TIME)?;
                }
                info!(
                    input = %input.display(),
                    variable = name,
                    shape = ?field.shape(),
                    "Loaded input variable"
                );
                dataset
                    .insert(field)
                    .with_context(|| format!("Inputs disagree on the grid of '{}'", name))?;
            }
        }

        for name in [names::T2M, names::D2M] {
            if !dataset.contains(name) {
                bail!("Variable '{}' not found in any input store", name);
            }
        }
        Ok(dataset)
    }

    /// Daily `t2m` and `rh` plus `RH90p`, written to the store root.
    pub fn compute_indices(&self) -> Result<WriteReport> {
        let start = Instant::now();
        let inputs = self.load_inputs()?;
        let indices = &self.config.indices;

        let t2m = kelvin_to_celsius(inputs.variable(names::T2M)?)?;
        let d2m = kelvin_to_celsius(inputs.variable(names::D2M)?)?;
        let rh = relative_humidity(&t2m, &d2m)?;

        let climatology = ClimatologyBuilder::from_config(indices).build(&rh)?;
        let rh90p = IndexEngine::from_config(indices).rh90p(&rh, &climatology)?;

        let dataset = Dataset::merge([t2m, rh, rh90p.into_inner()])?;
        let report = self
            .writer
            .write(&self.config.store, None, &dataset, WriteMode::Overwrite)
            .with_context(|| format!("Failed to write {}", self.config.store.display()))?;

        info!(
            store = %self.config.store.display(),
            variables = ?report.variables,
            bytes = report.bytes_written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compute-indices complete"
        );
        Ok(report)
    }

    /// `WHD` and the annual humidity statistics, appended to `yearly_stats`.
    pub fn add_indices(&self) -> Result<WriteReport> {
        let start = Instant::now();
        let store = &self.config.store;
        let reader = ZarrDatasetReader::open(store)
            .with_context(|| format!("Failed to open {}", store.display()))?;
        let t2m = reader.read_variable(None, names::T2M)?;
        let rh = reader.read_variable(None, names::RH)?;

        let engine = IndexEngine::from_config(&self.config.indices);
        let mut annual = vec![engine.warm_humid_days(&t2m, &rh)?];
        annual.extend(engine.humidity_statistics(&rh)?);

        let dataset = Dataset::merge(annual.into_iter().map(AnnualIndex::into_inner))?;
        let report = self
            .writer
            .write(store, Some(YEARLY_STATS_GROUP), &dataset, WriteMode::Append)
            .with_context(|| format!("Failed to append to {}", store.display()))?;

        info!(
            store = %store.display(),
            group = YEARLY_STATS_GROUP,
            variables = ?report.variables,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "add-indices complete"
        );
        Ok(report)
    }

    /// Slope and p-value stores for every configured variable found in the
    /// store root or in `yearly_stats`.
    pub fn trend_analysis(&self) -> Result<Vec<TrendSummary>> {
        let start = Instant::now();
        let store = &self.config.store;
        let reader = ZarrDatasetReader::open(store)
            .with_context(|| format!("Failed to open {}", store.display()))?;
        let engine = TrendEngine::from_config(&self.config.indices);
        let alpha = engine.alpha();

        let mut summaries = Vec::new();
        for variable in &self.config.indices.trend_variables {
            let Some((group, field)) = locate(&reader, variable)? else {
                warn!(variable = %variable, store = %store.display(), "Variable not found, skipping");
                continue;
            };

            let trend = engine.compute(&field)?;
            let cells = trend.pvalue.len();
            let significant_cells = trend.significant_cells(alpha)?;

            let path = trend_store_path(&self.config.trends_dir, variable);
            let dataset = trend.into_dataset()?;
            self.writer
                .write(&path, None, &dataset, WriteMode::Overwrite)
                .with_context(|| format!("Failed to write {}", path.display()))?;

            info!(
                variable = %variable,
                path = %path.display(),
                cells,
                significant_cells,
                alpha,
                "Saved trend fields"
            );
            summaries.push(TrendSummary {
                variable: variable.clone(),
                group: group.map(str::to_string),
                path,
                cells,
                significant_cells,
            });
        }

        if summaries.is_empty() {
            bail!(
                "None of the trend variables {:?} were found in {}",
                self.config.indices.trend_variables,
                store.display()
            );
        }

        info!(
            variables = summaries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "trend-analysis complete"
        );
        Ok(summaries)
    }

    /// All three stages in order.
    pub fn run(&self) -> Result<Vec<TrendSummary>> {
        self.compute_indices()?;
        self.add_indices()?;
        self.trend_analysis()
    }

    /// Variables of the store root and of each group.
    pub fn list_store(path: &Path) -> Result<StoreListing> {
        let reader = ZarrDatasetReader::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let variables = reader.list_variables(None)?;
        let groups = reader
            .list_groups()?
            .into_iter()
            .map(|name| -> Result<GroupListing> {
                let variables = reader.list_variables(Some(&name))?;
                Ok(GroupListing { name, variables })
            })
            .collect::<Result<_>>()?;
        Ok(StoreListing {
            root: path.to_path_buf(),
            variables,
            groups,
        })
    }
}

/// Path of the trend store for `variable`.
pub fn trend_store_path(trends_dir: &Path, variable: &str) -> PathBuf {
    trends_dir.join(format!("{}.zarr", variable))
}

/// Find a variable in the store root, then in `yearly_stats`.
fn locate(
    reader: &ZarrDatasetReader,
    variable: &str,
) -> Result<Option<(Option<&'static str>, ChunkedArray<Value>)>> {
    for group in [None, Some(YEARLY_STATS_GROUP)] {
        if reader.has_variable(group, variable) {
            let field = reader.read_variable(group, variable)?;
            return Ok(Some((group, field)));
        }
    }
    Ok(None)
}

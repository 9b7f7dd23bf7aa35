//! Writes every artifact of a run into one output directory.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use profiler_data::{PerBlockStat, RunSummary, TokenRecord};

use crate::per_block::write_per_block_csv;
use crate::spamoor::{scenario_specs, scenario_yaml, scenarios_yaml, ScenarioDefaults};
use crate::summary::summary_json;
use crate::tokens::tokens_json;

pub const SUMMARY_FILE: &str = "summary.json";
pub const PER_BLOCK_FILE: &str = "per_block.csv";
pub const TOKENS_FILE: &str = "tokens.json";
pub const SCENARIOS_FILE: &str = "spamoor_scenarios.yaml";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub summary: PathBuf,
    pub per_block: PathBuf,
    pub tokens: PathBuf,
    pub scenarios: PathBuf,
    /// One file per emitted scenario kind.
    pub scenario_files: Vec<PathBuf>,
}

/// Writes `summary.json`, `per_block.csv`, `tokens.json` and the spamoor
/// scenario files under `dir`, creating it if needed.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn write_artifacts(
    dir: &Path,
    summary: &RunSummary,
    rows: &[PerBlockStat],
    tokens: &[TokenRecord],
    defaults: &ScenarioDefaults,
) -> Result<ArtifactPaths> {
    fs::create_dir_all(dir)
        .wrap_err_with(|| format!("failed to create output directory {}", dir.display()))?;

    let summary_path = dir.join(SUMMARY_FILE);
    let json = summary_json(summary).wrap_err("failed to serialize summary")?;
    write_file(&summary_path, &json)?;

    let per_block_path = dir.join(PER_BLOCK_FILE);
    let file = File::create(&per_block_path)
        .wrap_err_with(|| format!("failed to create {}", per_block_path.display()))?;
    write_per_block_csv(BufWriter::new(file), rows)
        .wrap_err_with(|| format!("failed to write {}", per_block_path.display()))?;

    let tokens_path = dir.join(TOKENS_FILE);
    let json = tokens_json(tokens).wrap_err("failed to serialize tokens")?;
    write_file(&tokens_path, &json)?;

    let specs = scenario_specs(summary, rows, defaults);
    let scenarios_path = dir.join(SCENARIOS_FILE);
    let yaml = scenarios_yaml(&specs).wrap_err("failed to serialize scenarios")?;
    write_file(&scenarios_path, &yaml)?;

    let mut scenario_files = Vec::with_capacity(specs.len());
    for spec in &specs {
        let path = dir.join(spec.kind.file_name());
        let yaml = scenario_yaml(spec)
            .wrap_err_with(|| format!("failed to serialize {} scenario", spec.kind))?;
        write_file(&path, &yaml)?;
        scenario_files.push(path);
    }

    tracing::info!(
        rows = rows.len(),
        tokens = tokens.len(),
        scenarios = specs.len(),
        "artifacts written"
    );

    Ok(ArtifactPaths {
        summary: summary_path,
        per_block: per_block_path,
        tokens: tokens_path,
        scenarios: scenarios_path,
        scenario_files,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).wrap_err_with(|| format!("failed to write {}", path.display()))
}

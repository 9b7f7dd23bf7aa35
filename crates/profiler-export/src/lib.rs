//! profiler-export crate
//!
//! Deterministic renderings of a finished run (summary JSON, per-block CSV,
//! token registry JSON, Spamoor scenario YAML) and the offline loaders that
//! read the first two back.

pub mod artifacts;
pub mod offline;
pub mod per_block;
pub mod spamoor;
pub mod summary;
pub mod tokens;

pub use artifacts::{write_artifacts, ArtifactPaths};
pub use offline::{load_per_block_csv, load_summary_json, summarize_rows};
pub use per_block::{per_block_csv, write_per_block_csv, PER_BLOCK_HEADER};
pub use spamoor::{
    scenario_specs, scenario_yaml, scenarios_yaml, ScenarioDefaults, ScenarioKind, ScenarioSpec,
};
pub use summary::{summary_document, summary_json, SummaryDocument};
pub use tokens::{tokens_document, tokens_json, TokenDocument};

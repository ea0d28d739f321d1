use std::path::Path;

use anyhow::{Context, Result};
use hiscore_core::Config;

pub mod config;
pub mod diag;
pub mod scores;
pub mod tables;

pub use config::ConfigCmd;
pub use diag::DiagArgs;
pub use scores::{SubmitArgs, TopArgs};
pub use tables::TablesCmd;

/// Effective configuration: file (if any) plus `HISCORE_*` overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    hiscore_core::load_effective_config(path).context("load configuration")
}

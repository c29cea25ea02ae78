use anyhow::Context;
use flashpoint_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the directory project configs live in.
///
/// Priority:
/// 1. `--config-dir` flag / `FLASHPOINT_HOME` env var (passed in as `explicit`)
/// 2. `~/.flashpoint`
pub fn resolve_config_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(paths::expand_home(p));
    }
    paths::default_config_dir().context("cannot locate the config directory")
}

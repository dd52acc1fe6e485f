// Copyright 2024-2026 Prediktor Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI commands for the `prediktor` binary.
//!
//! The only place that reads the process environment: `PREDIKTOR_CONFIG`
//! picks the config file and `PREDIKTOR_*` variables override its values.
//!
//! ## Usage
//!
//! ```bash
//! prediktor predict "I gave the book to |"   # rank completions for the gap
//! prediktor interactive --k 3                # one request per stdin line
//! prediktor analyze knihu                    # dictionary analyses
//! prediktor config show                      # effective configuration
//! ```

pub mod config_cmd;
pub mod predict_cmd;

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, PredictorConfig};

/// Config file used when neither `--config` nor `PREDIKTOR_CONFIG` is set.
pub const DEFAULT_CONFIG_FILE: &str = "prediktor.toml";

/// Marks the gap in CLI input text.
pub const GAP_MARKER: char = '|';

/// Config file to read: explicit path, then `PREDIKTOR_CONFIG`, then
/// `prediktor.toml` in the working directory if present.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("PREDIKTOR_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}

/// Load the config file (or defaults) and apply environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<PredictorConfig, ConfigError> {
    let mut config = match config_path(explicit) {
        Some(path) => PredictorConfig::from_file(&path)?,
        None => PredictorConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Split CLI text at the first gap marker. Without a marker the gap is at
/// the end.
pub fn split_gap(text: &str) -> (&str, &str) {
    match text.split_once(GAP_MARKER) {
        Some((left, right)) => (left, right),
        None => (text, ""),
    }
}

/// Pull `--config PATH` out of the argument list.
pub fn take_config_flag(args: &mut Vec<String>) -> Result<Option<PathBuf>, String> {
    let Some(pos) = args.iter().position(|a| a == "--config") else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err("Missing value for --config".to_string());
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(PathBuf::from(value)))
}

// Copyright 2024-2026 Prediktor Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These work without loading the model or the dictionary.

use std::path::Path;

use crate::config::{ModelBackend, PredictorConfig};

/// Print the effective config (file plus environment overrides) as TOML.
pub fn run_show(config_file: Option<&Path>) -> i32 {
    match super::load_config(config_file) {
        Ok(config) => print_config(&config),
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

/// Print the built-in defaults as TOML.
pub fn run_defaults() -> i32 {
    print_config(&PredictorConfig::default())
}

/// Validate the effective config.
///
/// Returns 0 if valid, 1 if valid with warnings, 2 if invalid.
pub fn run_validate(config_file: Option<&Path>) -> i32 {
    let config = match super::load_config(config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return 2;
    }

    let mut warnings = config.warnings();
    if config.backend == ModelBackend::Candle && !cfg!(feature = "candle") {
        warnings.push("backend \"candle\" is not compiled into this binary".to_string());
    }
    for (label, path) in [
        ("model_path", config.model_path.clone()),
        ("vocab_path", config.resolved_vocab_path()),
        ("dictionary_path", config.dictionary_path.clone()),
    ] {
        if !path.exists() {
            warnings.push(format!("{} {} does not exist", label, path.display()));
        }
    }

    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn print_config(config: &PredictorConfig) -> i32 {
    match config.to_toml_string() {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

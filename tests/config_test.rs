//! Tests for loading configuration files and building a predictor from them.

mod common;

use std::collections::HashMap;
use std::path::PathBuf;

use prediktor_core::config::OVERRIDE_KEYS;
use prediktor_core::engine::SearchStrategy;
use prediktor_core::telemetry::LogFormat;
use prediktor_core::{ConfigError, LoadError, ModelBackend, Predictor, PredictorConfig};

fn demo_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/prediktor.toml")
}

#[test]
fn test_demo_config_loads_and_validates() {
    let config = PredictorConfig::from_file(&demo_config_path()).unwrap();
    config.validate().unwrap();
    assert!(config.warnings().is_empty());
    assert_eq!(config.limits.max_concurrent, 4);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.model_path.is_absolute());
    assert!(config.model_path.exists());
    assert!(config.resolved_vocab_path().exists());
    assert!(config.dictionary_path.exists());
}

#[tokio::test]
async fn test_predictor_loads_from_demo_config() {
    let config = PredictorConfig::from_file(&demo_config_path()).unwrap();
    let predictor = Predictor::load(config).unwrap();
    assert_eq!(predictor.model_id(), "en-fixture-3gram");

    let predictions = predictor.predict("I gave the book to", "", None, None, None).await.unwrap();
    assert_eq!(predictions[0].text, " him.");
}

#[test]
fn test_relative_paths_resolve_against_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prediktor.toml");
    std::fs::write(&path, "model_path = \"lm/model.json\"\n[logging]\noutput_path = \"log/p.log\"\n")
        .unwrap();

    let config = PredictorConfig::from_file(&path).unwrap();
    assert_eq!(config.model_path, dir.path().join("lm/model.json"));
    assert_eq!(config.resolved_vocab_path(), dir.path().join("lm/vocab.txt"));
    assert_eq!(config.dictionary_path, dir.path().join("dictionary.tsv"));
    assert_eq!(config.logging.output_path, Some(dir.path().join("log/p.log")));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PredictorConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_unknown_enum_value_is_parse_error() {
    let err = PredictorConfig::from_toml_str("[generation]\nstrategy = \"greedy\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_overrides_win_over_file() {
    let mut config = PredictorConfig::from_file(&demo_config_path()).unwrap();
    let env: HashMap<&str, &str> = [
        ("PREDIKTOR_STRATEGY", "sample"),
        ("PREDIKTOR_SEED", "7"),
        ("PREDIKTOR_MAX_CONCURRENT", "0"),
        ("PREDIKTOR_LOG_FORMAT", "json"),
    ]
    .into_iter()
    .collect();
    config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.generation.strategy, SearchStrategy::Sample);
    assert_eq!(config.generation.seed, 7);
    assert_eq!(config.limits.max_concurrent, 1);
    assert_eq!(config.logging.format, LogFormat::Json);
    config.validate().unwrap();
}

#[test]
fn test_override_keys_are_prefixed() {
    assert!(OVERRIDE_KEYS.iter().all(|k| k.starts_with("PREDIKTOR_")));
}

#[test]
fn test_load_rejects_invalid_weights() {
    let mut config = common::fixture_config();
    config.weight_morph = -1.0;
    assert!(Predictor::load(config).is_err());
}

#[test]
fn test_load_reports_missing_model() {
    let mut config = common::fixture_config();
    config.model_path = common::fixture("absent.json");
    assert!(Predictor::load(config).is_err());
}

#[cfg(not(feature = "candle"))]
#[test]
fn test_candle_backend_needs_feature() {
    let mut config = common::fixture_config();
    config.backend = ModelBackend::Candle;
    let err = Predictor::load(config).err().unwrap();
    assert!(matches!(err, LoadError::BackendUnavailable("candle")));
}

#[cfg(feature = "candle")]
#[test]
fn test_candle_backend_reports_unreadable_tokenizer() {
    let mut config = common::fixture_config();
    config.backend = ModelBackend::Candle;
    let err = Predictor::load(config).err().unwrap();
    assert!(matches!(err, LoadError::Tokenizer(_)));
}

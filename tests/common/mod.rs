//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use prediktor_core::engine::{LanguageModel, ModelError, NgramModel, Tokenizer};
use prediktor_core::morph::MorphOracle;
use prediktor_core::{Predictor, PredictorConfig};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Config pointing at the English fixture model and dictionary.
pub fn fixture_config() -> PredictorConfig {
    PredictorConfig {
        model_path: fixture("model.json"),
        vocab_path: Some(fixture("vocab.txt")),
        dictionary_path: fixture("en_dict.tsv"),
        ..Default::default()
    }
}

pub fn tokenizer() -> Tokenizer {
    Tokenizer::from_file(&fixture("vocab.txt")).unwrap()
}

pub fn oracle() -> MorphOracle {
    MorphOracle::from_file(&fixture("en_dict.tsv")).unwrap()
}

pub fn ngram_model(tokenizer: &Tokenizer) -> NgramModel {
    NgramModel::from_file(&fixture("model.json"), tokenizer).unwrap()
}

pub fn load_predictor() -> Predictor {
    Predictor::load(fixture_config()).unwrap()
}

/// Fixture model that sleeps before every distribution.
pub struct SlowModel {
    inner: NgramModel,
    delay: Duration,
}

impl LanguageModel for SlowModel {
    fn model_id(&self) -> &str {
        "slow"
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn next_log_probs(&self, context: &[u32]) -> Result<Vec<f32>, ModelError> {
        std::thread::sleep(self.delay);
        self.inner.next_log_probs(context)
    }
}

/// Predictor over [`SlowModel`] with the given config tweaks.
pub fn slow_predictor(delay: Duration, config: PredictorConfig) -> Predictor {
    let tokenizer = tokenizer();
    let model = SlowModel { inner: ngram_model(&tokenizer), delay };
    Predictor::from_parts(config, tokenizer, Arc::new(model), oracle()).unwrap()
}

/// Model that only ever predicts the end-of-segment marker.
pub struct EosOnlyModel {
    pub vocab_size: usize,
    pub eos: u32,
}

impl LanguageModel for EosOnlyModel {
    fn model_id(&self) -> &str {
        "eos-only"
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, _context: &[u32]) -> Result<Vec<f32>, ModelError> {
        let mut log_probs = vec![f32::NEG_INFINITY; self.vocab_size];
        log_probs[self.eos as usize] = 0.0;
        Ok(log_probs)
    }
}

/// Model whose backend always fails.
pub struct FailingModel {
    pub vocab_size: usize,
}

pub const BACKEND_FAULT: &str = "device lost: out of memory at 0x7f3a";

impl LanguageModel for FailingModel {
    fn model_id(&self) -> &str {
        "failing"
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, _context: &[u32]) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::Backend(BACKEND_FAULT.to_string()))
    }
}

/// Predictor over an arbitrary model and the fixture tokenizer and dictionary.
pub fn predictor_with<F>(model: F) -> Predictor
where
    F: FnOnce(&Tokenizer) -> Arc<dyn LanguageModel>,
{
    let tokenizer = tokenizer();
    let model = model(&tokenizer);
    Predictor::from_parts(fixture_config(), tokenizer, model, oracle()).unwrap()
}

pub fn texts(predictions: &[prediktor_core::Prediction]) -> Vec<&str> {
    predictions.iter().map(|p| p.text.as_str()).collect()
}

//! Fuzz target for vocabulary and n-gram model parsing.
//!
//! Malformed vocabularies and model files must be rejected with an error,
//! never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use prediktor_core::engine::{LanguageModel, NgramModel, Tokenizer};

fuzz_target!(|data: (&str, &str)| {
    let (vocab, model) = data;
    let Ok(tokenizer) = Tokenizer::from_vocab_str(vocab) else { return };
    let Ok(model) = NgramModel::from_json(model, &tokenizer) else { return };

    let context = [tokenizer.bos_token()];
    if let Ok(log_probs) = model.next_log_probs(&context) {
        assert_eq!(log_probs.len(), tokenizer.vocab_size());
    }
});

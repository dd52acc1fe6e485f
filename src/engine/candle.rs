//! Neural causal language model backend on candle.
//!
//! Loads a quantized GGUF checkpoint (Llama family) and its Hugging Face
//! `tokenizer.json`. The vocabulary is re-expressed as decoded surface pieces
//! so prefix matching and decoding work exactly as with the n-gram backend.

use std::fs::File;
use std::path::Path;

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::models::quantized_llama::ModelWeights;
use tracing::debug;

use super::error::ModelError;
use super::model::{log_softmax, LanguageModel};
use super::tokenizer::{Tokenizer, TokenizerError};
use crate::config::MarkerSettings;

/// Piece marker for a leading space in SentencePiece vocabularies.
const SPACE_MARKER: char = '\u{2581}';

/// Quantized causal LM. Each call runs the full context through a fresh
/// copy of the weights, so no cache state is shared between requests.
pub struct CandleModel {
    id: String,
    weights: ModelWeights,
    device: Device,
    vocab_size: usize,
    max_seq_len: usize,
    bos: u32,
}

impl CandleModel {
    /// Load GGUF weights for a vocabulary of `tokenizer.vocab_size()` entries.
    pub fn from_gguf(path: &Path, tokenizer: &Tokenizer) -> Result<Self, ModelError> {
        let device = Device::Cpu;
        let mut file = File::open(path)?;
        let content = gguf_file::Content::read(&mut file).map_err(backend)?;

        let arch = content
            .metadata
            .get("general.architecture")
            .and_then(|v| v.to_string().ok())
            .cloned()
            .unwrap_or_else(|| "llama".to_string());
        let max_seq_len = content
            .metadata
            .get(&format!("{}.context_length", arch))
            .and_then(|v| v.to_u32().ok())
            .map_or(2048, |n| n as usize);
        let id = content
            .metadata
            .get("general.name")
            .and_then(|v| v.to_string().ok())
            .cloned()
            .unwrap_or_else(|| arch.clone());

        let weights = ModelWeights::from_gguf(content, &mut file, &device).map_err(|e| {
            ModelError::InvalidFormat(format!("{}: {}", path.display(), e))
        })?;
        debug!(model = %id, %arch, max_seq_len, "gguf weights loaded");

        Ok(Self {
            id,
            weights,
            device,
            vocab_size: tokenizer.vocab_size(),
            max_seq_len: max_seq_len.max(2),
            bos: tokenizer.bos_token(),
        })
    }

    fn logits(&self, context: &[u32]) -> candle_core::Result<Vec<f32>> {
        let mut weights = self.weights.clone();
        let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
        let logits = weights.forward(&input, 0)?;
        logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()
    }
}

impl LanguageModel for CandleModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, context: &[u32]) -> Result<Vec<f32>, ModelError> {
        if let Some(&bad) = context.iter().find(|&&id| id as usize >= self.vocab_size) {
            return Err(ModelError::InvalidToken(bad));
        }
        // Keep the marker and the most recent tokens when the window overflows.
        let window: Vec<u32> = if context.len() > self.max_seq_len {
            std::iter::once(self.bos)
                .chain(context[context.len() - self.max_seq_len + 1..].iter().copied())
                .collect()
        } else if context.is_empty() {
            vec![self.bos]
        } else {
            context.to_vec()
        };

        let mut scores = self.logits(&window).map_err(backend)?;
        // Embedding tables are often padded past the tokenizer's vocabulary.
        scores.resize(self.vocab_size, f32::NEG_INFINITY);
        log_softmax(&mut scores);
        Ok(scores)
    }
}

fn backend(e: candle_core::Error) -> ModelError {
    ModelError::Backend(e.to_string())
}

/// Build a [`Tokenizer`] from a Hugging Face `tokenizer.json`.
///
/// Every id becomes its decoded surface text. Added special tokens and pieces
/// that decode to nothing or to a partial UTF-8 sequence are reserved.
pub fn load_tokenizer(path: &Path, markers: &MarkerSettings) -> Result<Tokenizer, TokenizerError> {
    let hf = tokenizers::Tokenizer::from_file(path)
        .map_err(|e| TokenizerError::Vocabulary(format!("{}: {}", path.display(), e)))?;
    let size = hf.get_vocab_size(true);

    let mut pieces = Vec::with_capacity(size);
    for id in 0..size as u32 {
        let raw = hf.id_to_token(id).unwrap_or_default();
        let mut surface = hf
            .decode(&[id], false)
            .map_err(|e| TokenizerError::Vocabulary(format!("id {}: {}", id, e)))?;
        if raw.starts_with(SPACE_MARKER) && !surface.starts_with(' ') {
            surface.insert(0, ' ');
        }
        if surface.contains(char::REPLACEMENT_CHARACTER) {
            surface.clear();
        }
        pieces.push(surface);
    }

    let marker = |name: &str| {
        hf.token_to_id(name)
            .ok_or_else(|| TokenizerError::Vocabulary(format!("missing marker {:?}", name)))
    };
    let bos = marker(&markers.bos)?;
    let eos = marker(&markers.eos)?;
    let unk = markers.unk.as_deref().and_then(|name| hf.token_to_id(name));
    let added: Vec<u32> = hf
        .get_added_tokens_decoder()
        .iter()
        .filter(|(_, token)| token.special)
        .map(|(&id, _)| id)
        .collect();

    debug!(vocab_size = size, reserved = added.len(), "pretrained tokenizer loaded");
    Tokenizer::from_decoded_pieces(pieces, bos, eos, unk, added)
}

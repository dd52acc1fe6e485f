//! Language-model side of the infilling pipeline.
//!
//! Handles tokenization, the model seam with its backends, and candidate
//! generation by beam search or seeded sampling. The n-gram backend is always
//! built; the neural backend needs the `candle` feature.

#[cfg(feature = "candle")]
pub mod candle;
pub mod config;
pub mod error;
pub mod model;
pub mod ngram;
pub mod sampling;
pub mod search;
pub mod tokenizer;

pub use config::{GenerationConfig, SamplingParams, SearchStrategy};
pub use error::{GenerationError, ModelError};
pub use model::{log_softmax, LanguageModel};
pub use ngram::NgramModel;

#[cfg(feature = "candle")]
pub use self::candle::{load_tokenizer, CandleModel};
pub use search::{CandidateGenerator, InfillContext};
pub use tokenizer::{align_words, Token, Tokenizer, TokenizerError};
pub use tokenizer::{WordAlignment, WordSegmenter, WordSpan};
pub use tokenizer::{BOS_PIECE, DEFAULT_WORD_PATTERN, EOS_PIECE, UNK_PIECE};

//! Fuzz target for tokenization.
//!
//! Arbitrary text must either encode or fail with an error, and anything
//! that encodes must decode back to the same text with aligned byte ranges.

#![no_main]

use libfuzzer_sys::fuzz_target;
use prediktor_core::engine::{align_words, Tokenizer, WordSegmenter};

fuzz_target!(|data: &str| {
    let tokenizer = Tokenizer::from_pieces([
        "<unk>", "<s>", "</s>", "a", "b", "c", "ab", "abc", " ", " a", ".", "é", "\u{301}",
    ])
    .unwrap();

    let Ok(tokens) = tokenizer.encode(data) else { return };
    let ids: Vec<u32> = tokens.iter().map(|t| t.model_id).collect();
    assert_eq!(tokenizer.decode(&ids).unwrap(), data, "round trip changed text");

    let mut offset = 0;
    for token in &tokens {
        assert_eq!(token.byte_range.start, offset);
        assert_eq!(&data[token.byte_range.clone()], token.surface_text);
        offset = token.byte_range.end;
    }
    assert_eq!(offset, data.len());

    let words = WordSegmenter::new().unwrap().segment(data);
    for alignment in align_words(&words, &tokens) {
        assert!(alignment.tokens.end <= tokens.len());
    }
});

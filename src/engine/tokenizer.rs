//! Vocabulary tokenizer and subword/surface-word alignment.
//!
//! Text is segmented into vocabulary pieces with a minimum-token dynamic
//! programme over char boundaries. Pieces are literal substrings, so decoding
//! an encoding reproduces the input byte for byte. Text that no combination
//! of pieces can spell is rejected, never truncated.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

use regex::Regex;
use thiserror::Error;

/// Unknown-piece marker. Optional in a vocabulary, never produced by `encode`.
pub const UNK_PIECE: &str = "<unk>";
/// Beginning-of-segment marker.
pub const BOS_PIECE: &str = "<s>";
/// End-of-segment marker.
pub const EOS_PIECE: &str = "</s>";

/// Default word pattern for [`WordSegmenter`].
pub const DEFAULT_WORD_PATTERN: &str = r"\w+";

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Unrepresentable character {ch:?} at byte offset {offset}")]
    Unrepresentable { offset: usize, ch: char },

    #[error("Invalid token ID: {0}")]
    InvalidToken(u32),

    #[error("Invalid vocabulary: {0}")]
    Vocabulary(String),

    #[error("Invalid word pattern: {0}")]
    WordPattern(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One vocabulary piece positioned in the text it was encoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub surface_text: String,
    /// Byte range into the encoded (or decoded) text.
    pub byte_range: Range<usize>,
    /// Id in the language model's vocabulary.
    pub model_id: u32,
}

/// A surface word found by the [`WordSegmenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    pub text: String,
    pub byte_range: Range<usize>,
}

/// A word together with the tokens that cover it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordAlignment {
    pub word: WordSpan,
    /// Index range into the token sequence. Empty when no token overlaps.
    pub tokens: Range<usize>,
}

/// Splits text into surface words for morphological lookup.
#[derive(Debug, Clone)]
pub struct WordSegmenter {
    pattern: Regex,
}

impl WordSegmenter {
    /// Segmenter using [`DEFAULT_WORD_PATTERN`].
    pub fn new() -> Result<Self, TokenizerError> {
        Self::with_pattern(DEFAULT_WORD_PATTERN)
    }

    /// Segmenter using a custom regex, e.g. one that keeps apostrophes.
    pub fn with_pattern(pattern: &str) -> Result<Self, TokenizerError> {
        let pattern =
            Regex::new(pattern).map_err(|e| TokenizerError::WordPattern(e.to_string()))?;
        Ok(Self { pattern })
    }

    /// All words in `text`, in order.
    pub fn segment(&self, text: &str) -> Vec<WordSpan> {
        self.pattern
            .find_iter(text)
            .filter(|m| !m.as_str().is_empty())
            .map(|m| WordSpan {
                text: m.as_str().to_string(),
                byte_range: m.range(),
            })
            .collect()
    }
}

/// Map each word to the token index range covering it.
///
/// Tokens must be in text order with non-overlapping byte ranges, as produced
/// by [`Tokenizer::encode`] or [`Tokenizer::tokens_for_ids`].
pub fn align_words(words: &[WordSpan], tokens: &[Token]) -> Vec<WordAlignment> {
    words
        .iter()
        .map(|word| {
            let start = tokens.partition_point(|t| t.byte_range.end <= word.byte_range.start);
            let end = tokens.partition_point(|t| t.byte_range.start < word.byte_range.end);
            WordAlignment {
                word: word.clone(),
                tokens: start..end.max(start),
            }
        })
        .collect()
}

/// Vocabulary-backed tokenizer shared read-only by every request.
pub struct Tokenizer {
    pieces: Vec<String>,
    lookup: HashMap<String, u32>,
    max_piece_chars: usize,
    bos: u32,
    eos: u32,
    unk: Option<u32>,
    /// Ids that are never spelled: the markers plus any the vocabulary flags.
    reserved: HashSet<u32>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.pieces.len())
            .field("max_piece_chars", &self.max_piece_chars)
            .finish()
    }
}

impl Tokenizer {
    /// Load a vocabulary file. See [`Tokenizer::from_vocab_str`] for the format.
    pub fn from_file(path: &Path) -> Result<Self, TokenizerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_vocab_str(&content)
    }

    /// Parse a vocabulary: one piece per line, ids assigned to non-empty
    /// lines in order. Escapes: `\s` space, `\n` newline, `\t` tab, `\\`.
    pub fn from_vocab_str(vocab: &str) -> Result<Self, TokenizerError> {
        let mut pieces = Vec::new();
        for (line_no, line) in vocab.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let piece = unescape_piece(line).map_err(|reason| {
                TokenizerError::Vocabulary(format!("line {}: {}", line_no + 1, reason))
            })?;
            pieces.push(piece);
        }
        Self::from_pieces(pieces)
    }

    /// Build from pieces; the id of a piece is its position.
    pub fn from_pieces<I, S>(pieces: I) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pieces: Vec<String> = pieces.into_iter().map(Into::into).collect();
        let mut lookup = HashMap::with_capacity(pieces.len());
        let mut max_piece_chars = 0;

        for (id, piece) in pieces.iter().enumerate() {
            if piece.is_empty() {
                return Err(TokenizerError::Vocabulary(format!("empty piece at id {}", id)));
            }
            let id = u32::try_from(id)
                .map_err(|_| TokenizerError::Vocabulary("vocabulary too large".into()))?;
            if lookup.insert(piece.clone(), id).is_some() {
                return Err(TokenizerError::Vocabulary(format!("duplicate piece {:?}", piece)));
            }
            max_piece_chars = max_piece_chars.max(piece.chars().count());
        }

        let special = |name: &str| lookup.get(name).copied();
        let bos = special(BOS_PIECE)
            .ok_or_else(|| TokenizerError::Vocabulary(format!("missing {}", BOS_PIECE)))?;
        let eos = special(EOS_PIECE)
            .ok_or_else(|| TokenizerError::Vocabulary(format!("missing {}", EOS_PIECE)))?;
        let unk = special(UNK_PIECE);
        let reserved = [Some(bos), Some(eos), unk].into_iter().flatten().collect();

        Ok(Self { pieces, lookup, max_piece_chars, bos, eos, unk, reserved })
    }

    /// Build from the decoded pieces of a pretrained vocabulary.
    ///
    /// Unlike [`Tokenizer::from_pieces`], repeated surfaces are allowed: the
    /// lowest id wins for encoding and the rest still decode. Markers and
    /// `reserved` ids are excluded from encoding and from candidate output.
    pub fn from_decoded_pieces<R>(
        pieces: Vec<String>,
        bos: u32,
        eos: u32,
        unk: Option<u32>,
        reserved: R,
    ) -> Result<Self, TokenizerError>
    where
        R: IntoIterator<Item = u32>,
    {
        let size = pieces.len();
        for id in [Some(bos), Some(eos), unk].into_iter().flatten() {
            if id as usize >= size {
                return Err(TokenizerError::Vocabulary(format!("marker id {} out of range", id)));
            }
        }
        let mut reserved: HashSet<u32> = reserved.into_iter().collect();
        reserved.extend([Some(bos), Some(eos), unk].into_iter().flatten());

        let mut lookup = HashMap::with_capacity(size);
        let mut max_piece_chars = 0;
        for (id, piece) in pieces.iter().enumerate() {
            let id = u32::try_from(id)
                .map_err(|_| TokenizerError::Vocabulary("vocabulary too large".into()))?;
            if reserved.contains(&id) || piece.is_empty() {
                continue;
            }
            lookup.entry(piece.clone()).or_insert(id);
            max_piece_chars = max_piece_chars.max(piece.chars().count());
        }
        for (id, piece) in pieces.iter().enumerate() {
            if piece.is_empty() {
                reserved.insert(id as u32);
            }
        }

        Ok(Self { pieces, lookup, max_piece_chars, bos, eos, unk, reserved })
    }

    /// Encode text into positioned tokens.
    pub fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        let ids = self.encode_ids(text)?;
        self.tokens_for_ids(&ids)
    }

    /// Encode text into vocabulary ids.
    pub fn encode_ids(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = bounds.len() - 1;

        // best[i] = (pieces needed to cover chars i.., id of the first piece, its char length)
        let mut best: Vec<Option<(usize, u32, usize)>> = vec![None; n + 1];
        best[n] = Some((0, 0, 0));

        for i in (0..n).rev() {
            let longest = self.max_piece_chars.min(n - i);
            for len in (1..=longest).rev() {
                let Some((rest, _, _)) = best[i + len] else { continue };
                let Some(id) = self.piece_id(&text[bounds[i]..bounds[i + len]]) else {
                    continue;
                };
                let count = rest + 1;
                if best[i].map_or(true, |(current, _, _)| count < current) {
                    best[i] = Some((count, id, len));
                }
            }
        }

        if best[0].is_none() {
            return Err(self.unrepresentable(text, &bounds));
        }

        let mut ids = Vec::with_capacity(best[0].map_or(0, |(count, _, _)| count));
        let mut i = 0;
        while i < n {
            match best[i] {
                Some((_, id, len)) => {
                    ids.push(id);
                    i += len;
                }
                None => return Err(self.unrepresentable(text, &bounds)),
            }
        }
        Ok(ids)
    }

    /// Decode ids into text. Special markers decode to nothing.
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        let mut text = String::new();
        for &id in ids {
            let piece = self.piece(id).ok_or(TokenizerError::InvalidToken(id))?;
            if !self.is_special(id) {
                text.push_str(piece);
            }
        }
        Ok(text)
    }

    /// Positioned tokens for an id sequence, with byte ranges into its decoding.
    pub fn tokens_for_ids(&self, ids: &[u32]) -> Result<Vec<Token>, TokenizerError> {
        let mut offset = 0;
        let mut tokens = Vec::with_capacity(ids.len());
        for &id in ids {
            let piece = self.piece(id).ok_or(TokenizerError::InvalidToken(id))?;
            let surface = if self.is_special(id) { "" } else { piece };
            tokens.push(Token {
                surface_text: surface.to_string(),
                byte_range: offset..offset + surface.len(),
                model_id: id,
            });
            offset += surface.len();
        }
        Ok(tokens)
    }

    /// Text of a vocabulary piece.
    pub fn piece(&self, id: u32) -> Option<&str> {
        self.pieces.get(id as usize).map(String::as_str)
    }

    /// Id of an ordinary (non-special) piece.
    pub fn piece_id(&self, piece: &str) -> Option<u32> {
        self.lookup.get(piece).copied().filter(|&id| !self.is_special(id))
    }

    /// Id of any piece, special markers included.
    pub fn lookup(&self, piece: &str) -> Option<u32> {
        self.lookup.get(piece).copied()
    }

    /// Check if an id is reserved: a marker, or a piece with no surface.
    pub fn is_special(&self, id: u32) -> bool {
        self.reserved.contains(&id)
    }

    pub fn bos_token(&self) -> u32 {
        self.bos
    }

    pub fn eos_token(&self) -> u32 {
        self.eos
    }

    pub fn unk_token(&self) -> Option<u32> {
        self.unk
    }

    pub fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    /// Locate the first char the vocabulary cannot reach.
    fn unrepresentable(&self, text: &str, bounds: &[usize]) -> TokenizerError {
        let n = bounds.len() - 1;
        let mut reachable = vec![false; n + 1];
        reachable[0] = true;
        let mut furthest = 0;
        for i in 0..n {
            if !reachable[i] {
                continue;
            }
            furthest = furthest.max(i);
            let longest = self.max_piece_chars.min(n - i);
            for len in 1..=longest {
                if self.piece_id(&text[bounds[i]..bounds[i + len]]).is_some() {
                    reachable[i + len] = true;
                }
            }
        }
        let offset = bounds[furthest];
        let ch = text[offset..].chars().next().unwrap_or('\u{FFFD}');
        TokenizerError::Unrepresentable { offset, ch }
    }
}

fn unescape_piece(line: &str) -> Result<String, String> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(format!("unknown escape \\{}", other)),
            None => return Err("dangling backslash".into()),
        }
    }
    Ok(out)
}

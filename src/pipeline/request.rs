//! Infilling requests and responses.

use std::ops::Range;

use serde::Serialize;
use uuid::Uuid;

use super::candidate::ScoredCandidate;
use super::error::{PredictError, Stage};
use crate::engine::WordSegmenter;

/// Byte span over a request document. `start == end` is a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn cursor(offset: usize) -> Self {
        Self { start: offset, end: offset }
    }

    pub fn is_cursor(&self) -> bool {
        self.start == self.end
    }

    /// Check bounds and char boundaries against `document`.
    pub fn validate(&self, document: &str) -> Result<(), String> {
        if self.start > self.end {
            return Err(format!("span start {} is after end {}", self.start, self.end));
        }
        if self.end > document.len() {
            return Err(format!(
                "span end {} is past the document ({} bytes)",
                self.end,
                document.len()
            ));
        }
        for offset in [self.start, self.end] {
            if !document.is_char_boundary(offset) {
                return Err(format!("offset {offset} is not on a character boundary"));
            }
        }
        Ok(())
    }
}

/// A document with a gap to fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfillRequest {
    pub document: String,
    pub span: Span,
    /// For a cursor inside a word, treat the typed part of the word as a
    /// prefix and replace the whole word.
    pub complete_word: bool,
    pub max_candidates: Option<usize>,
    pub beam_width: Option<usize>,
    pub max_candidate_tokens: Option<usize>,
}

impl InfillRequest {
    /// Fill the gap between `left` and `right`.
    pub fn gap(left: &str, right: &str) -> Self {
        let mut document = String::with_capacity(left.len() + right.len());
        document.push_str(left);
        document.push_str(right);
        Self::with_span(document, Span::cursor(left.len()), false)
    }

    /// Complete at a cursor, finishing the word under it if any.
    pub fn cursor(document: impl Into<String>, offset: usize) -> Self {
        Self::with_span(document.into(), Span::cursor(offset), true)
    }

    /// Replace `start..end` of the document.
    pub fn replace(document: impl Into<String>, start: usize, end: usize) -> Self {
        Self::with_span(document.into(), Span::new(start, end), false)
    }

    fn with_span(document: String, span: Span, complete_word: bool) -> Self {
        Self {
            document,
            span,
            complete_word,
            max_candidates: None,
            beam_width: None,
            max_candidate_tokens: None,
        }
    }

    pub fn with_max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = Some(n);
        self
    }

    pub fn with_beam_width(mut self, n: usize) -> Self {
        self.beam_width = Some(n);
        self
    }

    pub fn with_max_candidate_tokens(mut self, n: usize) -> Self {
        self.max_candidate_tokens = Some(n);
        self
    }

    /// Split the document around the gap.
    ///
    /// Horizontal whitespace directly before the gap moves from the left
    /// context into the prefix, so fills spell their own leading space. With
    /// `complete_word`, a cursor inside a word (or at its end) extends the
    /// prefix over the typed part and the replaced range over the whole word.
    pub fn resolve(&self, segmenter: &WordSegmenter) -> Result<ResolvedGap<'_>, PredictError> {
        let doc = self.document.as_str();
        self.span
            .validate(doc)
            .map_err(|reason| PredictError::invalid(Stage::Validate, reason))?;

        let mut gap_start = self.span.start;
        let mut prefix_end = self.span.start;
        let mut gap_end = self.span.end;

        if self.complete_word && self.span.is_cursor() {
            let cursor = self.span.start;
            if let Some(word) = segmenter
                .segment(doc)
                .into_iter()
                .find(|w| w.byte_range.start < cursor && cursor <= w.byte_range.end)
            {
                gap_start = word.byte_range.start;
                prefix_end = cursor;
                gap_end = word.byte_range.end;
            }
        }

        let left_end = doc[..gap_start].trim_end_matches([' ', '\t']).len();
        Ok(ResolvedGap {
            left: &doc[..left_end],
            prefix: &doc[left_end..prefix_end],
            right: &doc[gap_end..],
            replace: left_end..gap_end,
        })
    }
}

/// A request split into generator inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGap<'a> {
    pub left: &'a str,
    /// Text every fill must begin with.
    pub prefix: &'a str,
    pub right: &'a str,
    /// Document bytes a chosen fill replaces.
    pub replace: Range<usize>,
}

/// One ranked completion as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub text: String,
    /// Combined ranking score.
    pub score: f32,
    pub model_log_prob: f32,
    pub morph_score: f32,
    pub unconstrained: bool,
}

impl From<ScoredCandidate> for Prediction {
    fn from(scored: ScoredCandidate) -> Self {
        Self {
            text: scored.surface_text().to_string(),
            score: scored.combined_score(),
            model_log_prob: scored.model_log_prob(),
            morph_score: scored.morph_score(),
            unconstrained: scored.is_unconstrained(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfillResponse {
    pub request_id: Uuid,
    pub replace_range: Range<usize>,
    /// Best first. May hold fewer entries than requested.
    pub predictions: Vec<Prediction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PredictErrorKind;

    fn segmenter() -> WordSegmenter {
        WordSegmenter::new().unwrap()
    }

    #[test]
    fn gap_moves_trailing_space_into_prefix() {
        let request = InfillRequest::gap("I gave the book to ", " yesterday.");
        let gap = request.resolve(&segmenter()).unwrap();
        assert_eq!(gap.left, "I gave the book to");
        assert_eq!(gap.prefix, " ");
        assert_eq!(gap.right, " yesterday.");
        assert_eq!(gap.replace, 18..19);
    }

    #[test]
    fn gap_without_space_has_empty_prefix() {
        let request = InfillRequest::gap("I gave the book to", "");
        let gap = request.resolve(&segmenter()).unwrap();
        assert_eq!(gap.left, "I gave the book to");
        assert_eq!(gap.prefix, "");
        assert_eq!(gap.right, "");
    }

    #[test]
    fn cursor_inside_word_completes_it() {
        let request = InfillRequest::cursor("gave it to hi now", 13);
        let gap = request.resolve(&segmenter()).unwrap();
        assert_eq!(gap.left, "gave it to");
        assert_eq!(gap.prefix, " hi");
        assert_eq!(gap.right, " now");
        assert_eq!(gap.replace, 10..13);

        let request = InfillRequest::cursor("gave it to hix now", 13);
        let gap = request.resolve(&segmenter()).unwrap();
        assert_eq!(gap.prefix, " hi");
        assert_eq!(gap.right, " now");
        assert_eq!(gap.replace, 10..14);
    }

    #[test]
    fn cursor_at_word_start_is_a_plain_gap() {
        let request = InfillRequest::cursor("to him", 3);
        let gap = request.resolve(&segmenter()).unwrap();
        assert_eq!(gap.left, "to");
        assert_eq!(gap.prefix, " ");
        assert_eq!(gap.right, "him");
    }

    #[test]
    fn replace_span_drops_the_old_text() {
        let request = InfillRequest::replace("to her now", 3, 6);
        let gap = request.resolve(&segmenter()).unwrap();
        assert_eq!(gap.left, "to");
        assert_eq!(gap.prefix, " ");
        assert_eq!(gap.right, " now");
        assert_eq!(gap.replace, 2..6);
    }

    #[test]
    fn invalid_spans_are_rejected() {
        let seg = segmenter();
        for request in [
            InfillRequest::replace("abc", 2, 1),
            InfillRequest::replace("abc", 0, 4),
            InfillRequest::cursor("kůň", 2),
        ] {
            let err = request.resolve(&seg).unwrap_err();
            assert_eq!(err.stage, Stage::Validate);
            assert!(matches!(err.kind, PredictErrorKind::InvalidRequest(_)));
        }
    }

    #[test]
    fn builders_set_limits() {
        let request = InfillRequest::gap("a", "b")
            .with_max_candidates(3)
            .with_beam_width(6)
            .with_max_candidate_tokens(2);
        assert_eq!(request.max_candidates, Some(3));
        assert_eq!(request.beam_width, Some(6));
        assert_eq!(request.max_candidate_tokens, Some(2));
        assert!(!request.complete_word);
    }
}

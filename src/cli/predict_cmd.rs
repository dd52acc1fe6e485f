// Copyright 2024-2026 Prediktor Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prediction and dictionary CLI subcommands.
//!
//! `predict` and `interactive` load the full predictor; `analyze` and
//! `inflect` only load the dictionary.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::morph::{MorphOracle, Tag};
use crate::telemetry::{init_logging, init_metrics};
use crate::{InfillRequest, Prediction, Predictor, PredictorConfig};

/// Options shared by `predict` and `interactive`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictOptions {
    pub text: Option<String>,
    pub k: Option<usize>,
    pub beam_width: Option<usize>,
    pub max_tokens: Option<usize>,
    /// Complete the word under the gap marker instead of inserting.
    pub complete_word: bool,
    pub json: bool,
}

impl PredictOptions {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Self::default();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            match arg {
                "--k" | "-k" | "--max-candidates" => {
                    options.k = Some(parse_count(arg, args.get(i + 1))?);
                    i += 2;
                }
                "--beam" | "--beam-width" => {
                    options.beam_width = Some(parse_count(arg, args.get(i + 1))?);
                    i += 2;
                }
                "--max-tokens" => {
                    options.max_tokens = Some(parse_count(arg, args.get(i + 1))?);
                    i += 2;
                }
                "--complete" => {
                    options.complete_word = true;
                    i += 1;
                }
                "--json" => {
                    options.json = true;
                    i += 1;
                }
                _ if arg.starts_with("--") => return Err(format!("Unknown argument: {}", arg)),
                _ => {
                    if options.text.is_some() {
                        return Err(format!("Unexpected argument: {}", arg));
                    }
                    options.text = Some(arg.to_string());
                    i += 1;
                }
            }
        }
        Ok(options)
    }

    /// Build a request from CLI text with `|` marking the gap.
    pub fn request(&self, text: &str) -> InfillRequest {
        let (left, right) = super::split_gap(text);
        let mut request = if self.complete_word {
            InfillRequest::cursor(format!("{left}{right}"), left.len())
        } else {
            InfillRequest::gap(left, right)
        };
        request.max_candidates = self.k;
        request.beam_width = self.beam_width;
        request.max_candidate_tokens = self.max_tokens;
        request
    }
}

fn parse_count(flag: &str, value: Option<&String>) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("Missing value for {}", flag))?;
    value
        .parse::<usize>()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn load_predictor(config: PredictorConfig) -> Result<Predictor, i32> {
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Warning: logging not initialised: {}", e);
    }
    init_metrics();
    Predictor::load(config).map_err(|e| {
        eprintln!("Error: {}", e);
        2
    })
}

/// Rank completions for one gap and print them.
pub async fn run_predict(args: &[String], config_file: Option<&Path>) -> i32 {
    let options = match PredictOptions::parse(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    let Some(text) = options.text.clone() else {
        eprintln!("Usage: prediktor predict \"<text with | at the gap>\" [--k N] [--beam N] [--max-tokens N] [--complete] [--json]");
        return 1;
    };
    let config = match super::load_config(config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let shutdown_timeout = config.limits.shutdown_timeout();
    let predictor = match load_predictor(config) {
        Ok(predictor) => predictor,
        Err(code) => return code,
    };

    let request = options.request(&text);
    let code = match predictor.predict_request(request, Default::default()).await {
        Ok(response) if options.json => match serde_json::to_string_pretty(&response) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Ok(response) => {
            for (rank, prediction) in response.predictions.iter().enumerate() {
                println!("{}", format_prediction(rank + 1, prediction));
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    predictor.shutdown(shutdown_timeout).await;
    code
}

/// Read lines from stdin until an empty line or EOF; print the top
/// completions of each line space-separated.
pub async fn run_interactive(args: &[String], config_file: Option<&Path>) -> i32 {
    let mut options = match PredictOptions::parse(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    options.k = options.k.or(Some(3));
    let config = match super::load_config(config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let predictor = match load_predictor(config) {
        Ok(predictor) => predictor,
        Err(code) => return code,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let next = tokio::select! {
            next = lines.next_line() => next,
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = match next {
            Ok(Some(line)) if !line.is_empty() => line,
            Ok(_) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        match predictor.predict_request(options.request(&line), Default::default()).await {
            Ok(response) => println!("{}", join_words(&response.predictions)),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    predictor.shutdown(Duration::from_secs(1)).await;
    0
}

/// Print every dictionary analysis of each word.
pub fn run_analyze(args: &[String], config_file: Option<&Path>) -> i32 {
    if args.is_empty() {
        eprintln!("Usage: prediktor analyze <WORD>...");
        return 1;
    }
    let oracle = match load_oracle(config_file) {
        Ok(oracle) => oracle,
        Err(code) => return code,
    };
    for word in args {
        let analyses = oracle.analyze(word);
        if analyses.is_empty() {
            println!("{}\t(unknown)", word);
        }
        for analysis in analyses {
            println!("{}\t{}\t{}", word, analysis.lemma, analysis.tag);
        }
    }
    0
}

/// Print every form of a lemma that carries the requested features.
pub fn run_inflect(args: &[String], config_file: Option<&Path>) -> i32 {
    let [lemma, features] = args else {
        eprintln!("Usage: prediktor inflect <LEMMA> <FEAT;FEAT;...>");
        return 1;
    };
    let tag: Tag = match features.parse() {
        Ok(tag) => tag,
        Err(e) => {
            eprintln!("Invalid tag {:?}: {}", features, e);
            return 1;
        }
    };
    let oracle = match load_oracle(config_file) {
        Ok(oracle) => oracle,
        Err(code) => return code,
    };
    let forms = oracle.generate(lemma, &tag);
    if forms.is_empty() {
        eprintln!("No forms of {:?} carry {}", lemma, tag);
        return 1;
    }
    for form in forms {
        println!("{}", form);
    }
    0
}

fn load_oracle(config_file: Option<&Path>) -> Result<MorphOracle, i32> {
    let config = super::load_config(config_file).map_err(|e| {
        eprintln!("Error: {}", e);
        2
    })?;
    MorphOracle::from_file(&config.dictionary_path).map_err(|e| {
        eprintln!("Error: {}: {}", config.dictionary_path.display(), e);
        2
    })
}

fn format_prediction(rank: usize, prediction: &Prediction) -> String {
    let fit = if prediction.unconstrained { "  (unconstrained)" } else { "" };
    format!(
        "{:>2}. {:<24} score={:.3} logp={:.3} morph={:.2}{}",
        rank,
        format!("{:?}", prediction.text),
        prediction.score,
        prediction.model_log_prob,
        prediction.morph_score,
        fit
    )
}

fn join_words(predictions: &[Prediction]) -> String {
    predictions
        .iter()
        .map(|p| p.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn prediction(text: &str) -> Prediction {
        Prediction {
            text: text.to_string(),
            score: 1.0,
            model_log_prob: -1.0,
            morph_score: 0.5,
            unconstrained: true,
        }
    }

    #[test]
    fn test_parse_options() {
        let options =
            PredictOptions::parse(&args(&["I gave it to |", "--k", "5", "--json"])).unwrap();
        assert_eq!(options.text.as_deref(), Some("I gave it to |"));
        assert_eq!(options.k, Some(5));
        assert!(options.json);

        assert!(PredictOptions::parse(&args(&["--k"])).is_err());
        assert!(PredictOptions::parse(&args(&["--k", "many"])).is_err());
        assert!(PredictOptions::parse(&args(&["--verbose"])).is_err());
        assert!(PredictOptions::parse(&args(&["a", "b"])).is_err());
    }

    #[test]
    fn test_request_from_marked_text() {
        let options = PredictOptions { k: Some(2), ..Default::default() };
        let request = options.request("to | now");
        assert_eq!(request.document, "to  now");
        assert_eq!(request.span.start, 3);
        assert!(!request.complete_word);
        assert_eq!(request.max_candidates, Some(2));

        let options = PredictOptions { complete_word: true, ..Default::default() };
        let request = options.request("to hi|");
        assert_eq!(request.document, "to hi");
        assert_eq!(request.span.start, 5);
        assert!(request.complete_word);
    }

    #[test]
    fn test_join_words_trims_leading_space() {
        let line = join_words(&[prediction(" him"), prediction(" her"), prediction(" ")]);
        assert_eq!(line, "him her");
    }

    #[test]
    fn test_inflect_usage() {
        assert_eq!(run_inflect(&args(&["only-lemma"]), None), 1);
        assert_eq!(run_inflect(&args(&["kniha", ""]), None), 1);
    }
}

// Copyright 2024-2026 Prediktor Contributors
// SPDX-License-Identifier: Apache-2.0

//! `prediktor` command-line entry point.
//!
//! ## Subcommands
//!
//! - `prediktor predict "<text>"` - rank completions for the `|` gap
//! - `prediktor interactive` - one request per stdin line
//! - `prediktor analyze <WORD>...` - dictionary analyses
//! - `prediktor inflect <LEMMA> <TAG>` - forms of a lemma
//! - `prediktor config show|defaults|validate`

use std::process::ExitCode;

use prediktor_core::cli::{self, config_cmd, predict_cmd};

#[tokio::main]
async fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_file = match cli::take_config_flag(&mut args) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let config_file = config_file.as_deref();
    let command = args.first().map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(1..).unwrap_or(&[]);

    let code = match command {
        "predict" => predict_cmd::run_predict(rest, config_file).await,
        "interactive" | "repl" => predict_cmd::run_interactive(rest, config_file).await,
        "analyze" => predict_cmd::run_analyze(rest, config_file),
        "inflect" => predict_cmd::run_inflect(rest, config_file),
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => config_cmd::run_show(config_file),
                "defaults" => config_cmd::run_defaults(),
                "validate" => config_cmd::run_validate(config_file),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    1
                }
            }
        }
        "help" | "--help" | "-h" => {
            match rest.first() {
                Some(subcommand) => print_command_help(subcommand),
                None => print_usage(),
            }
            0
        }
        "version" | "--version" | "-V" => {
            println!("prediktor {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            1
        }
    };
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "prediktor - morphology-aware text infilling v{}

USAGE:
    prediktor [--config FILE] <COMMAND> [OPTIONS]

COMMANDS:
    predict      Rank completions for the gap marked with |
    interactive  Read one line per request from stdin
    analyze      Show dictionary analyses of words
    inflect      Show the forms of a lemma carrying a tag
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    --config FILE  Configuration file (default: prediktor.toml if present)
    -h, --help     Show help for command
    -V, --version  Show version information

EXAMPLES:
    prediktor predict \"I gave the book to |\"
    prediktor predict \"I gave the book to | yesterday.\" --k 3 --json
    prediktor interactive --k 3
    prediktor analyze knihu
    prediktor inflect kniha \"N;ACC;SG\"

ENVIRONMENT:
    PREDIKTOR_CONFIG              Configuration file path
    PREDIKTOR_MODEL_PATH          Override model_path
    PREDIKTOR_VOCAB_PATH          Override vocab_path
    PREDIKTOR_DICTIONARY_PATH     Override dictionary_path
    PREDIKTOR_STRATEGY            beam or sample
    PREDIKTOR_SEED                Sampling seed
    PREDIKTOR_MAX_CONCURRENT      Generation workers
    PREDIKTOR_MAX_PENDING         Requests allowed to wait for a worker
    PREDIKTOR_REQUEST_TIMEOUT_MS  Per-request deadline
    PREDIKTOR_LOG_LEVEL           Log filter (e.g. info, prediktor_core=debug)
    PREDIKTOR_LOG_FORMAT          json or pretty

EXIT CODES:
    0  Success
    1  Request or usage error
    2  Configuration or load error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "predict" => {
            eprintln!(
                "prediktor predict - Rank completions for a gap

USAGE:
    prediktor predict \"<TEXT>\" [OPTIONS]

OPTIONS:
    --k N             Completions to return (default from config)
    --beam N          Beam width
    --max-tokens N    Maximum tokens per completion
    --complete        Complete the word the | marker is inside
    --json            Print the full response as JSON

DESCRIPTION:
    The | character marks the gap. Without a marker the gap is at the end
    of the text, so the continuation is predicted.

EXAMPLES:
    prediktor predict \"I gave the book to |\"
    prediktor predict \"Dal jsem mu velkou | na stůl.\" --k 5
    prediktor predict \"I gave the book to h|\" --complete
"
            );
        }
        "interactive" | "repl" => {
            eprintln!(
                "prediktor interactive - Line-by-line prediction

USAGE:
    prediktor interactive [--k N] [--beam N] [--max-tokens N] [--complete]

DESCRIPTION:
    Reads one line per request from stdin and prints the top completions
    separated by spaces. An empty line or end of input stops the session.
    The default k is 3.
"
            );
        }
        "analyze" => {
            eprintln!(
                "prediktor analyze - Dictionary analyses

USAGE:
    prediktor analyze <WORD>...

DESCRIPTION:
    Prints word, lemma and tag for every analysis of each word, or
    (unknown) when the dictionary has none.
"
            );
        }
        "inflect" => {
            eprintln!(
                "prediktor inflect - Forms of a lemma

USAGE:
    prediktor inflect <LEMMA> <FEAT;FEAT;...>

EXAMPLES:
    prediktor inflect kniha \"N;ACC;SG\"
"
            );
        }
        "config" => {
            eprintln!(
                "prediktor config - Manage configuration

USAGE:
    prediktor [--config FILE] config <SUBCOMMAND>

SUBCOMMANDS:
    show           Show the effective configuration as TOML
    validate       Validate configuration and check file paths
    defaults       Show the default configuration

EXIT CODES (validate):
    0  Valid
    1  Valid with warnings
    2  Invalid
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'prediktor help' for general usage.",
                command
            );
        }
    }
}

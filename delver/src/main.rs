//! Recursive document-search agent CLI.
//!
//! Loads one immutable text corpus and answers questions about it by looping
//! a language-model oracle against a restricted snippet sandbox.

use std::io::Read;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use delver::core::sandbox;
use delver::core::types::{SessionOutcome, SessionStop};
use delver::exit_codes;
use delver::io::config::{Config, load_config};
use delver::io::document::DocumentStore;
use delver::io::oracle::HttpOracle;
use delver::io::session_log::write_session;
use delver::logging;
use delver::session::{AppContext, CancelToken, run_session};

#[derive(Parser)]
#[command(
    name = "delver",
    version,
    about = "Answer questions about a document via sandboxed recursive search"
)]
struct Cli {
    /// Path to the config file (missing file means defaults).
    #[arg(long, global = true, default_value = "delver.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a question-answering session against the document.
    Ask {
        /// The question to answer.
        query: String,
        /// Path to the text corpus.
        #[arg(long)]
        document: PathBuf,
        /// Write session artifacts (summary, attempts, transcript) here.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Execute one snippet in the sandbox and print its classification.
    Exec {
        /// Snippet text; reads stdin when omitted and --file is absent.
        snippet: Option<String>,
        /// Read the snippet from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Path to the text corpus.
        #[arg(long)]
        document: PathBuf,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Ask {
            query,
            document,
            log_dir,
        } => cmd_ask(config, &query, &document, log_dir.as_deref()),
        Command::Exec {
            snippet,
            file,
            document,
        } => cmd_exec(config, snippet, file.as_deref(), &document),
        Command::Config => {
            let mut rendered = toml::to_string_pretty(&config).context("serialize config")?;
            rendered.push('\n');
            print!("{rendered}");
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_ask(
    config: Config,
    query: &str,
    document: &std::path::Path,
    log_dir: Option<&std::path::Path>,
) -> Result<i32> {
    let store = DocumentStore::load(document)?;
    let oracle = HttpOracle::from_config(&config.oracle)?;
    let ctx = AppContext::new(store, config);
    let cancel = CancelToken::new();

    let outcome = run_session(&ctx, &oracle, query, &cancel)?;
    if let Some(dir) = log_dir {
        let label = session_label()?;
        let paths = write_session(dir, &label, &outcome)?;
        eprintln!("session artifacts: {}", paths.dir.display());
    }
    print_outcome(&outcome);

    let code = match outcome.stop {
        SessionStop::ConfidenceReached => exit_codes::OK,
        _ => exit_codes::UNRESOLVED,
    };
    Ok(code)
}

fn print_outcome(outcome: &SessionOutcome) {
    match &outcome.answer {
        Some(answer) => println!("{answer}"),
        None => println!("(no answer produced)"),
    }
    println!();
    println!(
        "confidence: {:.2}  depth: {}  stop: {:?}",
        outcome.state.confidence, outcome.state.depth, outcome.stop
    );
    for attempt in &outcome.state.attempts {
        println!(
            "  {} {:?} output_len={} confidence={:.2}  {}",
            attempt.depth, attempt.outcome, attempt.output_len, attempt.confidence,
            attempt.snippet_excerpt
        );
    }
}

fn cmd_exec(
    config: Config,
    snippet: Option<String>,
    file: Option<&std::path::Path>,
    document: &std::path::Path,
) -> Result<i32> {
    let store = DocumentStore::load(document)?;
    let code = match (snippet, file) {
        (Some(code), None) => code,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("read snippet {}", path.display()))?,
        (None, None) => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("read snippet from stdin")?;
            buffer
        }
        (Some(_), Some(_)) => {
            anyhow::bail!("pass the snippet either inline or via --file, not both")
        }
    };

    let outcome =
        sandbox::execute_with_cap(store.text(), &code, config.sandbox.output_cap_chars);
    match &outcome {
        sandbox::SnippetOutcome::Success(text) => {
            println!("success ({} chars)", outcome.output_len());
            println!("{text}");
        }
        sandbox::SnippetOutcome::Empty => println!("empty"),
        sandbox::SnippetOutcome::Unassigned => println!("unassigned"),
        sandbox::SnippetOutcome::Error(message) => println!("error: {message}"),
    }
    Ok(exit_codes::OK)
}

fn session_label() -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?;
    Ok(format!("session-{}", now.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ask() {
        let cli = Cli::parse_from([
            "delver",
            "ask",
            "what is the fee?",
            "--document",
            "corpus.md",
        ]);
        let Command::Ask { query, document, log_dir } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(query, "what is the fee?");
        assert_eq!(document, PathBuf::from("corpus.md"));
        assert!(log_dir.is_none());
    }

    #[test]
    fn parse_exec_with_file() {
        let cli = Cli::parse_from([
            "delver",
            "exec",
            "--file",
            "snippet.py",
            "--document",
            "corpus.md",
        ]);
        let Command::Exec { snippet, file, .. } = cli.command else {
            panic!("expected exec");
        };
        assert!(snippet.is_none());
        assert_eq!(file, Some(PathBuf::from("snippet.py")));
    }

    #[test]
    fn parse_global_config_flag() {
        let cli = Cli::parse_from(["delver", "--config", "alt.toml", "config"]);
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Command::Config));
    }
}

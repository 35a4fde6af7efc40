//! # codeport CLI
//!
//! Command-line front end for the Python -> C++ translator.
//!
//! Usage:
//!   codeport translate <file.py> [--model gpt|claude] [--run] [--verify]
//!   codeport run
//!   codeport python <file.py>
//!   codeport verify <file.py>
//!
//! Examples:
//!   codeport translate --sample pi --model claude --run
//!   codeport verify --sample subarray
//!   CODEPORT_COMPILER="clang++ -O3" codeport run

use clap::{Args, Parser, Subcommand};
use codeport_agent::Translator;
use codeport_engine::{
    samples, ErrorStatus, LlmProvider, ModelChoice, Platform, Provider, ProviderConfig, Result, RunOutcome,
    Settings,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeport")]
#[command(author, version, about = "codeport - rewrite Python as fast C++ with a frontier model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./codeport.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the generated source, binary and scratch files
    #[arg(short, long, global = true)]
    workdir: Option<PathBuf>,

    /// Show progress logs and token usage
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only print program output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a Python program to C++ and write the output file
    Translate {
        #[command(flatten)]
        input: Input,

        /// Model to use: gpt or claude
        #[arg(short, long)]
        model: Option<ModelChoice>,

        /// Compile and run the result afterwards
        #[arg(long)]
        run: bool,

        /// Run both versions afterwards and compare them
        #[arg(long, conflicts_with = "run")]
        verify: bool,
    },
    /// Compile and run the current output file
    Run,
    /// Run the Python program with the configured interpreter
    Python {
        #[command(flatten)]
        input: Input,
    },
    /// Run the Python program and the current C++ output and compare them
    Verify {
        #[command(flatten)]
        input: Input,

        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the detected platform and compiler
    Toolchain,
    /// List the available models
    Models,
    /// List the built-in sample programs
    Samples,
}

#[derive(Args)]
struct Input {
    /// Python source file
    #[arg(conflicts_with = "sample", required_unless_present = "sample")]
    file: Option<PathBuf>,

    /// Use a built-in sample instead of a file (see `codeport samples`)
    #[arg(short, long)]
    sample: Option<String>,
}

impl Input {
    fn load(&self) -> Result<String> {
        if let Some(name) = &self.sample {
            return samples::find(name).map(|s| s.source.to_string()).ok_or_else(|| {
                codeport_engine::Error::invalid_argument(format!(
                    "unknown sample '{}', see `codeport samples`",
                    name
                ))
            });
        }
        let path = self.file.as_deref().unwrap_or_else(|| Path::new(""));
        std::fs::read_to_string(path).map_err(|e| {
            codeport_engine::Error::from(e)
                .with_operation("cli::load_input")
                .with_context("path", path.display().to_string())
        })
    }
}

/// Prints streamed C++ as it grows.
///
/// Expects the append-only text from `StreamSanitizer::current`.
#[derive(Default)]
struct StreamPrinter {
    printed: usize,
}

impl StreamPrinter {
    fn delta<'a>(&mut self, so_far: &'a str) -> Option<&'a str> {
        if so_far.len() <= self.printed || !so_far.is_char_boundary(self.printed) {
            return None;
        }
        let delta = &so_far[self.printed..];
        self.printed = so_far.len();
        Some(delta)
    }

    fn update(&mut self, so_far: &str) {
        if let Some(delta) = self.delta(so_far) {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_outcome(outcome: &RunOutcome, quiet: bool) {
    if !quiet {
        match outcome.elapsed() {
            Some(elapsed) => println!("--- OUTPUT ({:.6}s) ---", elapsed.as_secs_f64()),
            None => println!("--- FAILED ---"),
        }
    }
    print!("{}", outcome.render());
    if !outcome.render().ends_with('\n') {
        println!();
    }
}

async fn translate(
    translator: &Translator,
    input: &Input,
    model: Option<ModelChoice>,
    run: bool,
    verify: bool,
    verbose: bool,
    quiet: bool,
) -> Result<bool> {
    let python = input.load()?;
    let choice = model.unwrap_or(translator.settings().model);

    if !quiet {
        println!(
            "Translating with {} ({}) for {}\n",
            choice,
            translator.settings().model_name(choice),
            translator.prompt().target()
        );
    }

    let mut printer = StreamPrinter::default();
    let translation = translator
        .translate(&python, choice, |so_far| {
            if !quiet {
                printer.update(so_far);
            }
        })
        .await?;

    if !quiet {
        if !translation.cpp.ends_with('\n') {
            println!();
        }
        println!("\n--- wrote {} ---", translation.path.display());
        if translation.truncated() {
            println!("warning: the reply did not finish cleanly and is probably incomplete");
        }
    }
    if verbose {
        if let Some(usage) = translation.usage {
            println!(
                "tokens: {} prompt + {} completion = {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
    }

    if verify {
        let comparison = translator.verify(&python).await?;
        println!("\n{}", comparison.summary());
        return Ok(comparison.outputs_match());
    }
    if run {
        let outcome = translator.compile_and_run().await?;
        print_outcome(&outcome, quiet);
        return Ok(outcome.is_success());
    }
    Ok(true)
}

async fn show_toolchain(translator: &Translator) -> Result<bool> {
    println!("Platform: {} ({})", Platform::current(), Platform::current().description());
    match translator.toolchain().await {
        Ok(toolchain) => {
            println!("Compiler: {}", toolchain.compiler.name);
            let source = translator.artifacts().source_path();
            let binary = translator.artifacts().binary_path();
            println!("Command:  {}", toolchain.compile_command(&source, &binary).join(" "));
            Ok(true)
        }
        Err(e) => {
            println!("Compiler: not available");
            tracing::debug!(error = %e, "toolchain detection failed");
            Ok(false)
        }
    }
}

fn list_models(settings: &Settings) {
    for choice in ModelChoice::ALL {
        let key_state = match settings.provider_config(choice) {
            Ok(_) => "key set",
            Err(_) => "no key",
        };
        println!("{:<7} {} [{}]", choice.label(), settings.model_name(choice), key_state);

        // Known models come from the provider itself; building one needs no network.
        let config = match choice {
            ModelChoice::Gpt => ProviderConfig::openai(""),
            ModelChoice::Claude => ProviderConfig::anthropic(""),
        };
        if let Ok(provider) = Provider::from_config(config) {
            println!("        also: {}", provider.models().join(", "));
        }
    }
}

fn list_samples() {
    for sample in samples::SAMPLES {
        println!("{:<10} {}", sample.name, sample.description);
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(workdir) = cli.workdir {
        settings.workdir = workdir;
    }
    let translator = Translator::new(settings);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Translate {
            input,
            model,
            run,
            verify,
        } => translate(&translator, &input, model, run, verify, cli.verbose, quiet).await,
        Commands::Run => {
            let outcome = translator.compile_and_run().await?;
            print_outcome(&outcome, quiet);
            Ok(outcome.is_success())
        }
        Commands::Python { input } => {
            let outcome = translator.run_python(&input.load()?).await?;
            print_outcome(&outcome, quiet);
            Ok(outcome.is_success())
        }
        Commands::Verify { input, json } => {
            let comparison = translator.verify(&input.load()?).await?;
            if json {
                let text = serde_json::to_string_pretty(&comparison).map_err(|e| {
                    codeport_engine::Error::new(codeport_engine::ErrorKind::SerializationFailed, e.to_string())
                })?;
                println!("{}", text);
            } else {
                if !quiet {
                    println!("--- Python ---");
                    print!("{}", comparison.python.render());
                    println!("--- C++ ---");
                    print!("{}", comparison.cpp.render());
                    println!();
                }
                println!("{}", comparison.summary());
            }
            Ok(comparison.outputs_match())
        }
        Commands::Toolchain => show_toolchain(&translator).await,
        Commands::Models => {
            list_models(translator.settings());
            Ok(true)
        }
        Commands::Samples => {
            list_samples();
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}{}", codeport_engine::ERROR_MARKER, e.message());
            if e.status() == ErrorStatus::Temporary {
                eprintln!("This looks temporary; try again in a moment.");
            }
            tracing::debug!("{:?}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use codeport_engine::StreamSanitizer;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_translate() {
        let cli = Cli::try_parse_from(["codeport", "translate", "--sample", "pi", "-m", "claude", "--run"]).unwrap();
        match cli.command {
            Commands::Translate { input, model, run, verify } => {
                assert_eq!(input.sample.as_deref(), Some("pi"));
                assert_eq!(model, Some(ModelChoice::Claude));
                assert!(run);
                assert!(!verify);
            }
            _ => panic!("expected translate"),
        }
    }

    #[test]
    fn test_input_required() {
        assert!(Cli::try_parse_from(["codeport", "python"]).is_err());
        assert!(Cli::try_parse_from(["codeport", "python", "a.py", "--sample", "pi"]).is_err());
        assert!(Cli::try_parse_from(["codeport", "translate", "a.py", "--run", "--verify"]).is_err());
    }

    #[test]
    fn test_bad_model_rejected() {
        assert!(Cli::try_parse_from(["codeport", "translate", "a.py", "-m", "llama"]).is_err());
    }

    #[test]
    fn test_input_load() {
        let input = Input { file: None, sample: Some("PI".into()) };
        assert!(input.load().unwrap().contains("calculate(100_000_000, 4, 1)"));

        let input = Input { file: None, sample: Some("nope".into()) };
        assert!(input.load().is_err());

        let input = Input { file: Some(PathBuf::from("/definitely/not/here.py")), sample: None };
        assert_eq!(input.load().unwrap_err().kind(), codeport_engine::ErrorKind::FileNotFound);
    }

    #[test]
    fn test_stream_printer_follows_sanitizer() {
        let mut sanitizer = StreamSanitizer::new();
        let mut printer = StreamPrinter::default();
        let mut printed = String::new();
        for delta in ["```", "c", "++\n", "#include <cmath>\n", "int main() {}\n", "``", "`"] {
            if let Some(text) = printer.delta(&sanitizer.push(delta)) {
                printed.push_str(text);
            }
        }
        assert_eq!(printed, "#include <cmath>\nint main() {}\n");
        assert_eq!(printed, sanitizer.finish());
    }
}

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, convert, render, text, CheckArgs, ConvertArgs, RenderArgs, TextArgs};

/// Quire CLI - inspect and convert rich-text documents
#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log engine events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a document to view markup
    Render(RenderArgs),

    /// Print the plain text of a document
    Text(TextArgs),

    /// Rewrite a document in another wire version
    Convert(ConvertArgs),

    /// Validate one document or every .json document under a directory
    Check(CheckArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{} cannot read current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Render(args) => render(args, &cwd),
        Command::Text(args) => text(args, &cwd),
        Command::Convert(args) => convert(args, &cwd),
        Command::Check(args) => check(args, &cwd),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

use super::{emit, load_editor};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use quire_editor::quire_model::WireVersion;
use quire_editor::EditorConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Wire document (.json)
    pub input: PathBuf,

    /// Target version (0.2.0, 0.3.0, 0.3.1, 0.3.2); defaults to the configured one
    #[arg(short, long)]
    pub to: Option<WireVersion>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn convert(args: ConvertArgs, cwd: &Path) -> Result<()> {
    let config = EditorConfig::load(cwd)?;
    let version = args.to.unwrap_or(config.wire_version);
    let editor = load_editor(&args.input, config)?;

    let output = editor.to_json(Some(version))?;
    emit(&output, args.out.as_deref())?;

    if let Some(out) = &args.out {
        println!(
            "  {} {} → {} ({})",
            "✓".green(),
            args.input.display(),
            out.display(),
            version
        );
    }
    Ok(())
}

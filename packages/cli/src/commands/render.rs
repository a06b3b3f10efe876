use super::{emit, load_editor};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use quire_editor::EditorConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Wire document (.json)
    pub input: PathBuf,

    /// Write the markup here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn render(args: RenderArgs, cwd: &Path) -> Result<()> {
    let config = EditorConfig::load(cwd)?;
    let mut editor = load_editor(&args.input, config)?;
    let stats = editor.render()?;

    emit(&editor.to_markup(), args.out.as_deref())?;
    if let Some(out) = &args.out {
        println!(
            "  {} {} → {} ({} nodes)",
            "✓".green(),
            args.input.display(),
            out.display(),
            stats.created
        );
    }
    Ok(())
}

use super::load_editor;
use anyhow::Result;
use clap::Args;
use quire_editor::EditorConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct TextArgs {
    /// Wire document (.json)
    pub input: PathBuf,
}

pub fn text(args: TextArgs, cwd: &Path) -> Result<()> {
    let editor = load_editor(&args.input, EditorConfig::load(cwd)?)?;
    println!("{}", editor.post().text());
    Ok(())
}

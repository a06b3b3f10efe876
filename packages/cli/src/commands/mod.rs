pub mod check;
pub mod convert;
pub mod render;
pub mod text;

pub use check::{check, CheckArgs};
pub use convert::{convert, ConvertArgs};
pub use render::{render, RenderArgs};
pub use text::{text, TextArgs};

use anyhow::{Context, Result};
use quire_editor::{Editor, EditorConfig};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read a wire document from disk into an unrendered editor
pub(crate) fn load_editor(path: &Path, config: EditorConfig) -> Result<Editor> {
    debug!(path = %path.display(), "loading document");
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Editor::from_json(&source, config).with_context(|| format!("parsing {}", path.display()))
}

/// Write `output` to `out`, or to stdout when no path is given
pub(crate) fn emit(output: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, output).with_context(|| format!("writing {}", path.display()))?;
        }
        None => println!("{}", output),
    }
    Ok(())
}

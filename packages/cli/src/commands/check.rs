use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use quire_editor::quire_model::{wire, Builder};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Wire document or directory of documents
    #[arg(default_value = ".")]
    pub input: PathBuf,
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let input = cwd.join(&args.input);
    let files = if input.is_file() {
        vec![input.clone()]
    } else if input.is_dir() {
        find_documents(&input)
    } else {
        return Err(anyhow!("Input path does not exist: {}", input.display()));
    };

    if files.is_empty() {
        println!("{}", "No .json documents found".yellow());
        return Ok(());
    }

    let mut failed = 0;
    for file in &files {
        let shown = file.strip_prefix(&input).unwrap_or(file);
        let shown = if shown.as_os_str().is_empty() { file.as_path() } else { shown };
        match check_file(file) {
            Ok(summary) => println!("  {} {} {}", "✓".green(), shown.display(), summary.dimmed()),
            Err(err) => {
                failed += 1;
                eprintln!("  {} {} - {}", "✗".red(), shown.display(), err.to_string().red());
            }
        }
    }

    println!();
    if failed == 0 {
        println!("{} {} documents valid", "✅".green(), files.len());
        Ok(())
    } else {
        Err(anyhow!("{} of {} documents invalid", failed, files.len()))
    }
}

/// Parse one document; returns a short summary of what it holds
fn check_file(path: &Path) -> Result<String> {
    let source = fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&source)?;
    let version = wire::sniff_version(&doc)?;
    let post = wire::parse(&doc, &mut Builder::new())?;

    // a document that cannot be written back in its own version is broken
    wire::render(&post, version)?;
    Ok(format!("({}, {} sections)", version, post.section_count()))
}

fn find_documents(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .filter(|p| p.file_name().and_then(|s| s.to_str()) != Some(quire_editor::DEFAULT_CONFIG_NAME))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "version": "0.3.2",
        "atoms": [],
        "cards": [],
        "markups": [["b"]],
        "sections": [[1, "p", [[0, [0], 1, "bold"], [0, [], 0, " plain"]]]]
    }"#;

    #[test]
    fn test_check_file_summarises_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, DOC).unwrap();

        let summary = check_file(&path).unwrap();
        assert_eq!(summary, "(0.3.2, 1 sections)");
    }

    #[test]
    fn test_check_directory_reports_invalid_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.json"), DOC).unwrap();
        fs::write(dir.path().join("bad.json"), r#"{"version": "9.9.9"}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(find_documents(dir.path()).len(), 2);
        let result = check(
            CheckArgs {
                input: dir.path().to_path_buf(),
            },
            Path::new("/"),
        );
        assert!(result.is_err());
    }
}

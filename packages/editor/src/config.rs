use crate::errors::EditorResult;
use quire_model::WireVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "quire.config.json";

/// Zero-width non-joiner: invisible text that gives the platform caret
/// something to sit in beside cards and atoms
pub const DEFAULT_CURSOR_PLACEHOLDER: &str = "\u{200C}";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Queue renders until the next tick instead of rendering on commit
    #[serde(default = "default_true")]
    pub defer_render: bool,

    /// Undo levels kept (0 = unlimited)
    #[serde(default = "default_undo_depth")]
    pub undo_depth: usize,

    /// Version written by `Editor::serialize` when none is given
    #[serde(default)]
    pub wire_version: WireVersion,

    /// Shown by the platform while the post is blank
    #[serde(default)]
    pub placeholder: String,

    #[serde(default = "default_cursor_placeholder")]
    pub cursor_placeholder: String,

    /// Inline tags recognised as markups when reading the view back
    #[serde(default = "default_markup_tags")]
    pub markup_tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_undo_depth() -> usize {
    100
}

fn default_cursor_placeholder() -> String {
    DEFAULT_CURSOR_PLACEHOLDER.to_string()
}

fn default_markup_tags() -> Vec<String> {
    ["b", "i", "strong", "em", "u", "s", "sub", "sup", "code", "a"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

impl EditorConfig {
    /// Load config from a directory, falling back to defaults when absent
    pub fn load(dir: impl AsRef<Path>) -> EditorResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Config that renders on every commit, handy for tests and batch tools
    pub fn immediate() -> Self {
        Self {
            defer_render: false,
            ..Self::default()
        }
    }

    pub fn is_markup_tag(&self, tag: &str) -> bool {
        self.markup_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            defer_render: default_true(),
            undo_depth: default_undo_depth(),
            wire_version: WireVersion::default(),
            placeholder: String::new(),
            cursor_placeholder: default_cursor_placeholder(),
            markup_tags: default_markup_tags(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "deferRender": false,
            "undoDepth": 5,
            "wireVersion": "0.3.0",
            "placeholder": "Write something"
        }"#;

        let config: EditorConfig = serde_json::from_str(json).unwrap();
        assert!(!config.defer_render);
        assert_eq!(config.undo_depth, 5);
        assert_eq!(config.wire_version, WireVersion::V0_3_0);
        assert_eq!(config.placeholder, "Write something");
        assert_eq!(config.cursor_placeholder, "\u{200C}");
        assert!(config.is_markup_tag("STRONG"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EditorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert!(config.defer_render);
        assert_eq!(config.wire_version, WireVersion::V0_3_2);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join("quire-config-missing");
        let config = EditorConfig::load(&dir).unwrap();
        assert_eq!(config, EditorConfig::default());
    }
}

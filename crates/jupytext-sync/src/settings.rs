//! User settings for jupytext-sync.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/jupytext-sync/settings.json
//! - Linux: ~/.config/jupytext-sync/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\jupytext-sync\settings.json

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

/// Settings consumed by the dispatcher and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Python interpreter to run Jupytext with. Discovered when unset.
    #[serde(default)]
    pub python_executable: Option<String>,

    /// Default pairing per extension, e.g. `"py": "ipynb,py:percent"`.
    #[serde(default)]
    pub default_formats: HashMap<String, String>,

    /// Extra arguments for `jupytext --sync`
    #[serde(default, deserialize_with = "deserialize_arg_list")]
    pub sync_args: Vec<String>,

    /// Extra arguments for `jupytext --set-formats`
    #[serde(default, deserialize_with = "deserialize_arg_list")]
    pub set_formats_args: Vec<String>,

    /// Create the paired notebook when a paired text file is opened.
    #[serde(default = "default_true")]
    pub auto_create_notebook: bool,

    /// Delete notebooks created by us once they are closed.
    #[serde(default = "default_true")]
    pub delete_auto_created_on_close: bool,
}

fn default_true() -> bool {
    true
}

/// Extra command-line arguments as written in the settings file.
///
/// A string is a command-line fragment and splits on whitespace, so
/// `"--quiet --update"` is two arguments. An array is taken one argument per
/// element, which keeps values with spaces or commas intact.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArgList {
    Line(String),
    Args(Vec<String>),
}

fn deserialize_arg_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let args = match ArgList::deserialize(deserializer)? {
        ArgList::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        ArgList::Args(args) => args
            .into_iter()
            .filter(|a| !a.trim().is_empty())
            .collect(),
    };
    Ok(args)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            python_executable: None,
            default_formats: HashMap::new(),
            sync_args: vec![],
            set_formats_args: vec![],
            auto_create_notebook: true,
            delete_auto_created_on_close: true,
        }
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jupytext-sync")
        .join("settings.json")
}

/// Load settings from `path`, returning defaults if it is missing or invalid.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    match std::fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            warn!("[settings] Ignoring invalid {:?}: {}", path, e);
            Settings::default()
        }),
        Err(e) => {
            warn!("[settings] Cannot read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Load settings from the default location.
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.python_executable.is_none());
        assert!(settings.default_formats.is_empty());
        assert!(settings.sync_args.is_empty());
        assert!(settings.auto_create_notebook);
        assert!(settings.delete_auto_created_on_close);
    }

    #[test]
    fn test_deserialize_arg_line() {
        let json = r#"{"sync_args": "--quiet  --update", "set_formats_args": " "}"#;
        let parsed: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.sync_args, vec!["--quiet", "--update"]);
        assert!(parsed.set_formats_args.is_empty());
    }

    #[test]
    fn test_deserialize_arg_array_keeps_elements_whole() {
        let json = r#"{"sync_args": ["--opt", "cell_metadata_filter=a,b", " "]}"#;
        let parsed: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.sync_args, vec!["--opt", "cell_metadata_filter=a,b"]);
    }

    #[test]
    fn test_deserialize_arg_list_rejects_numbers() {
        let json = r#"{"sync_args": 3}"#;
        assert!(serde_json::from_str::<Settings>(json).is_err());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"python_executable": "/opt/py/bin/python"}"#;
        let parsed: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.python_executable.as_deref(), Some("/opt/py/bin/python"));
        assert!(parsed.auto_create_notebook);
        assert!(parsed.delete_auto_created_on_close);
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"default_formats": {"py": "ipynb,py:light"}, "delete_auto_created_on_close": false}"#,
        )
        .unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.default_formats["py"], "ipynb,py:light");
        assert!(!settings.delete_auto_created_on_close);
        assert!(settings.auto_create_notebook);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            load_settings_from(&temp.path().join("absent.json")),
            Settings::default()
        );
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_settings_from(&path), Settings::default());
    }

    #[test]
    fn test_settings_path_is_valid() {
        assert!(settings_path().ends_with("jupytext-sync/settings.json"));
    }
}

//! Jupytext pairing formats.
//!
//! A pairing is written as a comma-joined list such as
//! `notebooks//ipynb,scripts//py:percent`. Each entry names an extension, an
//! optional format (`percent`, `light`, `myst`, ...) and an optional
//! subdirectory, marked by a trailing `//`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Extension of Jupyter notebooks, without the dot.
pub const NOTEBOOK_EXTENSION: &str = "ipynb";

/// Marks the end of a subdirectory in a format entry.
pub const SUBDIRECTORY_MARKER: &str = "//";

/// Extensions Jupytext can pair when the tool cannot be asked directly.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".ipynb", ".md", ".markdown", ".Rmd", ".py", ".coco", ".R", ".r", ".jl", ".cpp", ".ss",
    ".clj", ".scm", ".sh", ".ps1", ".q", ".m", ".wolfram", ".pro", ".js", ".ts", ".scala",
    ".rs", ".robot", ".resource", ".cs", ".fsx", ".fs", ".sos", ".java", ".groovy", ".sage",
    ".ml", ".hs", ".tcl", ".mac", ".gp", ".do", ".sas", ".xsh", ".lgt", ".logtalk", ".lua",
    ".go", ".qmd", ".myst", ".mystnb", ".mnb",
];

/// Text formats that pair as plain markdown rather than `:percent` scripts.
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "Rmd", "qmd", "myst", "mystnb", "mnb"];

/// Script form a notebook is paired with when nothing is configured.
const DEFAULT_NOTEBOOK_PAIRING: &str = "ipynb,py:percent";

/// One member of a pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatEntry {
    /// Extension without the leading dot, e.g. `py` or `ipynb`.
    pub extension: String,
    /// Jupytext format name, e.g. `percent`.
    pub format_name: Option<String>,
    /// Subdirectory relative to the pairing root.
    pub subdirectory: Option<String>,
}

impl FormatEntry {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            format_name: None,
            subdirectory: None,
        }
    }

    pub fn with_format(mut self, name: &str) -> Self {
        self.format_name = Some(name.to_string());
        self
    }

    pub fn is_notebook(&self) -> bool {
        self.extension.ends_with(NOTEBOOK_EXTENSION)
    }

    /// Whether `path` has this entry's extension.
    pub fn matches_path(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                name.to_string_lossy()
                    .ends_with(&format!(".{}", self.extension))
            })
            .unwrap_or(false)
    }
}

impl FromStr for FormatEntry {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (subdirectory, rest) = match raw.rfind(SUBDIRECTORY_MARKER) {
            Some(idx) => (
                Some(raw[..idx].trim_end_matches('/').to_string()),
                &raw[idx + SUBDIRECTORY_MARKER.len()..],
            ),
            None => (None, raw),
        };
        let (extension, format_name) = match rest.split_once(':') {
            Some((ext, name)) => (ext, Some(name.to_string())),
            None => (rest, None),
        };
        let extension = extension.trim_start_matches('.');

        if extension.is_empty() || format_name.as_deref() == Some("") {
            return Err(SyncError::InvalidFormat(s.to_string()));
        }

        Ok(FormatEntry {
            extension: extension.to_string(),
            format_name,
            subdirectory: subdirectory.filter(|d| !d.is_empty()),
        })
    }
}

impl fmt::Display for FormatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.subdirectory {
            write!(f, "{}{}", dir, SUBDIRECTORY_MARKER)?;
        }
        f.write_str(&self.extension)?;
        if let Some(name) = &self.format_name {
            write!(f, ":{}", name)?;
        }
        Ok(())
    }
}

/// Ordered list of paired formats.
///
/// Serializes as Jupytext's comma-joined string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FormatSpec {
    pub entries: Vec<FormatEntry>,
}

impl FormatSpec {
    pub fn new(entries: Vec<FormatEntry>) -> Self {
        Self { entries }
    }

    /// Build from individual format strings, as Jupytext reports them.
    pub fn from_list<S: AsRef<str>>(items: &[S]) -> Result<Self, SyncError> {
        let entries = items
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(str::parse::<FormatEntry>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// More than one member means the document is paired.
    pub fn is_paired(&self) -> bool {
        self.entries.len() > 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry locating the paired notebook.
    pub fn notebook_entry(&self) -> Option<&FormatEntry> {
        self.entries.iter().find(|e| e.is_notebook())
    }

    pub fn contains_notebook(&self) -> bool {
        self.notebook_entry().is_some()
    }

    /// The entry describing the file at `path`, if any.
    pub fn entry_for(&self, path: &Path) -> Option<&FormatEntry> {
        // Longest extension first so `nb.py` beats `py`
        self.entries
            .iter()
            .filter(|e| e.matches_path(path))
            .max_by_key(|e| e.extension.len())
    }
}

impl FromStr for FormatSpec {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let items: Vec<&str> = s.split(',').collect();
        Self::from_list(&items)
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

impl From<FormatSpec> for String {
    fn from(spec: FormatSpec) -> String {
        spec.to_string()
    }
}

impl TryFrom<String> for FormatSpec {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Extension of `path` without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().into_owned())
}

/// Whether Jupytext can handle a file with this path's extension.
pub fn is_supported_path(path: &Path, supported: &[String]) -> bool {
    match extension_of(path) {
        Some(ext) => {
            let dotted = format!(".{}", ext);
            supported.iter().any(|s| *s == dotted)
        }
        None => false,
    }
}

/// Built-in extension list as owned strings.
pub fn default_supported_extensions() -> Vec<String> {
    SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

/// Pairing to propose for an unpaired document.
///
/// `defaults` maps an extension (with or without the dot) to a format string
/// and takes precedence. Without one, notebooks pair with a percent script,
/// markdown-like files pair as themselves and every other file pairs as
/// `<ext>:percent`.
pub fn suggest_formats(path: &Path, defaults: &HashMap<String, String>) -> FormatSpec {
    let ext = extension_of(path).unwrap_or_default();

    let configured = defaults
        .iter()
        .find(|(k, _)| k.trim_start_matches('.') == ext)
        .map(|(_, v)| v);
    if let Some(formats) = configured {
        match formats.parse::<FormatSpec>() {
            Ok(spec) if !spec.is_empty() => return spec,
            Ok(_) => warn!("[formats] Empty default formats for .{}", ext),
            Err(e) => warn!("[formats] Ignoring default formats for .{}: {}", ext, e),
        }
    }

    if ext == NOTEBOOK_EXTENSION {
        return DEFAULT_NOTEBOOK_PAIRING
            .parse()
            .unwrap_or_else(|_| FormatSpec::new(vec![FormatEntry::new(NOTEBOOK_EXTENSION)]));
    }

    let notebook = FormatEntry::new(NOTEBOOK_EXTENSION);
    if ext.is_empty() {
        return FormatSpec::new(vec![notebook]);
    }
    let text = if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        FormatEntry::new(&ext)
    } else {
        FormatEntry::new(&ext).with_format("percent")
    };
    FormatSpec::new(vec![notebook, text])
}

//! Where the paired notebook lives on disk.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};
use crate::formats::{FormatSpec, NOTEBOOK_EXTENSION};

/// Directory the pairing's subdirectories are relative to.
///
/// When the source file sits in its own entry's subdirectory
/// (`scripts//py` for `/proj/scripts/nb.py`), the root is the directory
/// above it.
fn pairing_root(source: &Path, formats: &FormatSpec) -> PathBuf {
    let source_dir = source.parent().unwrap_or_else(|| Path::new(""));
    let subdir = formats
        .entry_for(source)
        .and_then(|e| e.subdirectory.as_deref());
    match subdir {
        Some(subdir) if source_dir.ends_with(subdir) => {
            let depth = Path::new(subdir).components().count();
            let mut root = source_dir.to_path_buf();
            for _ in 0..depth {
                root.pop();
            }
            root
        }
        _ => source_dir.to_path_buf(),
    }
}

/// File name of `source` without its entry's extension, so `x.nb.py` with
/// an `nb.py` entry is `x`.
fn base_name(source: &Path, formats: &FormatSpec) -> Option<OsString> {
    let entry_suffix = formats
        .entry_for(source)
        .map(|e| format!(".{}", e.extension));
    if let (Some(suffix), Some(name)) = (entry_suffix, source.file_name()) {
        if let Some(base) = name.to_str().and_then(|n| n.strip_suffix(&suffix)) {
            if !base.is_empty() {
                return Some(OsString::from(base));
            }
        }
    }
    source.file_stem().map(OsStr::to_os_string)
}

/// Path of the notebook paired with `source`.
///
/// Callers must have checked that `formats` contains a notebook entry;
/// without one this returns [`SyncError::NoNotebookEntry`].
pub fn derive_notebook_path(source: &Path, formats: &FormatSpec) -> SyncResult<PathBuf> {
    let notebook = formats
        .notebook_entry()
        .ok_or_else(|| SyncError::NoNotebookEntry(formats.to_string()))?;
    let base = base_name(source, formats)
        .ok_or_else(|| SyncError::InvalidPath(source.to_path_buf()))?;

    let mut path = pairing_root(source, formats);
    if let Some(subdir) = &notebook.subdirectory {
        path.push(subdir);
    }
    let mut file_name = base;
    file_name.push(".");
    file_name.push(NOTEBOOK_EXTENSION);
    path.push(file_name);
    Ok(path)
}

//! Jupytext configuration detection with "closest wins" semantics.
//!
//! Walks up from a directory, checking for Jupytext config files at each
//! level. The first (closest) match wins, with tiebreaker priority when
//! multiple files exist at the same level.

use std::path::{Path, PathBuf};

use log::debug;

/// The type of config file detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFileKind {
    JupytextToml,
    HiddenJupytextToml,
    /// `.jupytext`, in any of the formats Jupytext accepts
    Jupytext,
    /// `pyproject.toml` with a `[tool.jupytext]` table
    Pyproject,
}

/// A detected config file with its path and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedConfigFile {
    pub path: PathBuf,
    pub kind: ConfigFileKind,
}

/// Mapping from filename to config kind, in tiebreaker priority order.
const ALL_CANDIDATES: &[(&str, ConfigFileKind)] = &[
    ("jupytext.toml", ConfigFileKind::JupytextToml),
    (".jupytext.toml", ConfigFileKind::HiddenJupytextToml),
    (".jupytext", ConfigFileKind::Jupytext),
    ("pyproject.toml", ConfigFileKind::Pyproject),
];

/// Whether a pyproject.toml carries Jupytext settings.
fn pyproject_has_jupytext(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };
    match contents.parse::<toml::Table>() {
        Ok(table) => table
            .get("tool")
            .and_then(|tool| tool.get("jupytext"))
            .is_some(),
        Err(e) => {
            debug!("[project] Cannot parse {:?}: {}", path, e);
            false
        }
    }
}

/// Walk up from `start_path` looking for a Jupytext config file.
///
/// Stops at the home directory or a `.git` boundary.
pub fn find_jupytext_config(start_path: &Path) -> Option<DetectedConfigFile> {
    let start_dir = if start_path.is_file() {
        start_path.parent()?
    } else {
        start_path
    };

    let home_dir = dirs::home_dir();

    let mut current = start_dir.to_path_buf();
    loop {
        for (filename, kind) in ALL_CANDIDATES {
            let candidate = current.join(filename);
            if !candidate.is_file() {
                continue;
            }
            if *kind == ConfigFileKind::Pyproject && !pyproject_has_jupytext(&candidate) {
                continue;
            }
            return Some(DetectedConfigFile {
                path: candidate,
                kind: *kind,
            });
        }

        // Stop at home directory or git repo root
        if let Some(ref home) = home_dir {
            if current == *home {
                return None;
            }
        }
        if current.join(".git").exists() {
            return None;
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent.to_path_buf();
            }
            _ => return None, // Reached filesystem root
        }
    }
}

/// Whether the project around `path` appears to use Jupytext at all.
pub fn is_jupytext_possibly_used(path: &Path) -> bool {
    find_jupytext_config(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_closest_config_wins() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let notebooks = project.join("notebooks");
        std::fs::create_dir_all(&notebooks).unwrap();
        std::fs::create_dir(project.join(".git")).unwrap();

        write_file(&project, "jupytext.toml", "formats = \"ipynb,py:percent\"");
        write_file(&notebooks, ".jupytext", "formats: ipynb,md");

        let found = find_jupytext_config(&notebooks).unwrap();
        assert_eq!(found.kind, ConfigFileKind::Jupytext);
        assert_eq!(found.path, notebooks.join(".jupytext"));
    }

    #[test]
    fn test_tiebreaker_at_same_level() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        write_file(temp.path(), ".jupytext.toml", "");
        write_file(temp.path(), "jupytext.toml", "");

        let found = find_jupytext_config(temp.path()).unwrap();
        assert_eq!(found.kind, ConfigFileKind::JupytextToml);
    }

    #[test]
    fn test_pyproject_requires_jupytext_table() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        write_file(temp.path(), "pyproject.toml", "[project]\nname = \"x\"\n");
        assert!(find_jupytext_config(temp.path()).is_none());

        write_file(
            temp.path(),
            "pyproject.toml",
            "[project]\nname = \"x\"\n\n[tool.jupytext]\nformats = \"ipynb,py:percent\"\n",
        );
        let found = find_jupytext_config(temp.path()).unwrap();
        assert_eq!(found.kind, ConfigFileKind::Pyproject);
    }

    #[test]
    fn test_stops_at_git_boundary() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        write_file(temp.path(), "jupytext.toml", "");

        assert!(!is_jupytext_possibly_used(&repo));
    }

    #[test]
    fn test_start_from_file_path() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        write_file(temp.path(), "jupytext.toml", "");
        write_file(temp.path(), "nb.py", "");

        assert!(is_jupytext_possibly_used(&temp.path().join("nb.py")));
    }
}

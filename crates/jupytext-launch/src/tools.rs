//! Locating a Python interpreter that can run Jupytext.
//!
//! Candidates come from the active environment, a couple of generic
//! interpreter names and the user's configured path. Each candidate is asked
//! for its canonical `sys.executable`, then for the Jupytext version it can
//! import. The newest working Jupytext wins.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;

use crate::process::run_command;
use crate::version::{compare_versions, is_supported, MIN_SUPPORTED_VERSION};

/// Prints the canonical interpreter path.
const PRINT_EXECUTABLE_SCRIPT: &str = "import sys; print(sys.executable)";

/// Interpreter names tried when nothing better is known.
const FALLBACK_INTERPRETERS: &[&str] = &["python", "python3"];

/// A validated interpreter that can run Jupytext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolBinding {
    /// The candidate as it was given (may be a bare name like `python3`).
    pub interpreter: String,
    /// `sys.executable` reported by the interpreter.
    pub executable: PathBuf,
    /// Output of `jupytext --version`.
    pub version: String,
}

impl ToolBinding {
    /// Whether this Jupytext predates [`MIN_SUPPORTED_VERSION`].
    pub fn is_legacy(&self) -> bool {
        !is_supported(&self.version)
    }

    /// Program name to hand to the process runner.
    pub fn program(&self) -> String {
        self.executable.to_string_lossy().into_owned()
    }
}

/// Outcome of probing a single candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub interpreter: String,
    /// `None` when the interpreter could not be run.
    pub executable: Option<PathBuf>,
    /// `None` when Jupytext could not be imported through the interpreter.
    pub version: Option<String>,
}

impl Resolution {
    /// A binding, if both the executable and the version are known.
    pub fn binding(&self) -> Option<ToolBinding> {
        match (&self.executable, &self.version) {
            (Some(executable), Some(version)) => Some(ToolBinding {
                interpreter: self.interpreter.clone(),
                executable: executable.clone(),
                version: version.clone(),
            }),
            _ => None,
        }
    }
}

/// Ask `interpreter` for its canonical executable path.
pub async fn resolve_executable(interpreter: &str) -> Option<PathBuf> {
    match run_command(interpreter, &["-c", PRINT_EXECUTABLE_SCRIPT], None).await {
        Ok(output) if !output.is_empty() => {
            info!("[tools] Python '{}' resolved to: {}", interpreter, output);
            Some(PathBuf::from(output))
        }
        Ok(_) => {
            debug!("[tools] Python '{}' printed no executable", interpreter);
            None
        }
        Err(e) => {
            debug!("[tools] Failed to check python '{}': {}", interpreter, e);
            None
        }
    }
}

/// Ask the interpreter at `executable` for its Jupytext version.
pub async fn query_jupytext_version(executable: &Path) -> Option<String> {
    let program = executable.to_string_lossy();
    match run_command(&program, &["-m", "jupytext", "--version"], None).await {
        Ok(output) => {
            let version = output.lines().last().unwrap_or_default().trim().to_string();
            if version.is_empty() {
                None
            } else {
                Some(version)
            }
        }
        Err(e) => {
            debug!("[tools] Jupytext not available via {:?}: {}", executable, e);
            None
        }
    }
}

/// Query a single interpreter candidate.
pub async fn resolve(interpreter: &str) -> Resolution {
    let executable = resolve_executable(interpreter).await;
    let version = match &executable {
        Some(exe) => query_jupytext_version(exe).await,
        None => None,
    };
    Resolution {
        interpreter: interpreter.to_string(),
        executable,
        version,
    }
}

/// Query all candidates concurrently, preserving candidate order.
pub async fn resolve_all(candidates: &[String]) -> Vec<Resolution> {
    join_all(candidates.iter().map(|c| resolve(c))).await
}

/// Pick the binding with the highest Jupytext version.
///
/// On equal versions the earliest candidate wins.
pub fn select_newest(resolutions: &[Resolution]) -> Option<ToolBinding> {
    let mut best: Option<ToolBinding> = None;
    for binding in resolutions.iter().filter_map(Resolution::binding) {
        let replace = match &best {
            Some(current) => compare_versions(&binding.version, &current.version).is_gt(),
            None => true,
        };
        if replace {
            best = Some(binding);
        }
    }
    best
}

/// Resolve all candidates and select the newest working Jupytext.
pub async fn discover(candidates: &[String]) -> Option<ToolBinding> {
    let resolutions = resolve_all(candidates).await;
    for r in &resolutions {
        if r.binding().is_none() {
            debug!("[tools] Excluding candidate '{}'", r.interpreter);
        }
    }
    let selected = select_newest(&resolutions);
    match &selected {
        Some(b) => info!(
            "[tools] Selected jupytext {} via {:?}",
            b.version, b.executable
        ),
        None => warn!(
            "[tools] None of {} python candidates can run jupytext",
            candidates.len()
        ),
    }
    selected
}

/// Interpreter inside a virtualenv or conda prefix.
fn interpreter_in_prefix(prefix: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let scripts = prefix.join("Scripts").join("python.exe");
        if scripts.exists() {
            return scripts;
        }
        prefix.join("python.exe")
    }
    #[cfg(not(target_os = "windows"))]
    {
        prefix.join("bin").join("python")
    }
}

/// Interpreters of the currently active virtualenv / conda environment.
pub fn environment_interpreters() -> Vec<String> {
    ["VIRTUAL_ENV", "CONDA_PREFIX"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .filter(|v| !v.is_empty())
        .map(|prefix| interpreter_in_prefix(Path::new(&prefix)))
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

/// Build the ordered, de-duplicated candidate list.
///
/// Order: `discovered` environments, then generic interpreter names, then the
/// configured path.
pub fn gather_candidates(discovered: Vec<String>, configured: Option<&str>) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let all = discovered
        .into_iter()
        .chain(FALLBACK_INTERPRETERS.iter().map(|s| s.to_string()))
        .chain(configured.map(str::to_string));
    for c in all {
        let c = c.trim().to_string();
        if !c.is_empty() && !candidates.contains(&c) {
            candidates.push(c);
        }
    }
    candidates
}

/// Process-wide current binding.
///
/// Readers get a snapshot; a binding may change between reading and using it.
#[derive(Debug, Default)]
pub struct ToolState {
    binding: RwLock<Option<ToolBinding>>,
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<ToolBinding> {
        self.binding.read().unwrap().clone()
    }

    pub fn set(&self, binding: ToolBinding) {
        info!(
            "[tools] Using jupytext {} from {:?}",
            binding.version, binding.executable
        );
        *self.binding.write().unwrap() = Some(binding);
    }

    pub fn clear(&self) {
        *self.binding.write().unwrap() = None;
    }
}

/// Error when no interpreter can run Jupytext.
#[derive(Debug, thiserror::Error)]
#[error("No python with jupytext found (tried {tried:?}); set `python_executable` in settings")]
pub struct NoJupytextFound {
    pub tried: Vec<String>,
}

/// Re-validate the tool binding after a configuration change.
///
/// The configured interpreter is tried first. If it is missing or cannot run
/// Jupytext, all gathered candidates are queried and the newest wins.
pub async fn validate(
    state: &ToolState,
    configured: Option<&str>,
) -> Result<ToolBinding, NoJupytextFound> {
    state.clear();

    if let Some(path) = configured.filter(|p| !p.trim().is_empty()) {
        if let Some(binding) = resolve(path).await.binding() {
            warn_if_legacy(&binding);
            state.set(binding.clone());
            return Ok(binding);
        }
        warn!(
            "[tools] Configured python '{}' cannot run jupytext, searching automatically",
            path
        );
    }

    let candidates = gather_candidates(environment_interpreters(), configured);
    match discover(&candidates).await {
        Some(binding) => {
            warn_if_legacy(&binding);
            state.set(binding.clone());
            Ok(binding)
        }
        None => Err(NoJupytextFound { tried: candidates }),
    }
}

fn warn_if_legacy(binding: &ToolBinding) {
    if binding.is_legacy() {
        warn!(
            "[tools] jupytext {} is older than {}; unpaired files are checked before every sync",
            binding.version, MIN_SUPPORTED_VERSION
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolution(name: &str, exe: Option<&str>, version: Option<&str>) -> Resolution {
        Resolution {
            interpreter: name.to_string(),
            executable: exe.map(PathBuf::from),
            version: version.map(str::to_string),
        }
    }

    #[test]
    fn test_partial_resolution_has_no_binding() {
        assert!(resolution("python", Some("/usr/bin/python"), None)
            .binding()
            .is_none());
        assert!(resolution("python", None, None).binding().is_none());
        assert!(resolution("python", Some("/usr/bin/python"), Some("1.17.3"))
            .binding()
            .is_some());
    }

    #[test]
    fn test_select_newest_picks_highest_version() {
        let rs = vec![
            resolution("a", Some("/a"), Some("1.16.0")),
            resolution("b", Some("/b"), Some("1.17.3")),
            resolution("c", Some("/c"), Some("1.17.3rc2")),
            resolution("d", None, None),
        ];
        assert_eq!(select_newest(&rs).unwrap().interpreter, "b");
    }

    #[test]
    fn test_select_newest_ties_keep_first() {
        let rs = vec![
            resolution("first", Some("/1"), Some("1.17.3")),
            resolution("second", Some("/2"), Some("1.17.3")),
        ];
        assert_eq!(select_newest(&rs).unwrap().interpreter, "first");
    }

    #[test]
    fn test_select_newest_empty() {
        let rs = vec![resolution("x", Some("/x"), None)];
        assert!(select_newest(&rs).is_none());
    }

    #[test]
    fn test_gather_candidates_order_and_dedup() {
        let candidates = gather_candidates(
            vec!["/venv/bin/python".into(), "python3".into()],
            Some("/venv/bin/python"),
        );
        assert_eq!(candidates, vec!["/venv/bin/python", "python3", "python"]);
    }

    #[test]
    fn test_gather_candidates_appends_configured() {
        let candidates = gather_candidates(vec![], Some("/opt/py/bin/python"));
        assert_eq!(candidates, vec!["python", "python3", "/opt/py/bin/python"]);
    }

    #[test]
    fn test_tool_state_set_get_clear() {
        let state = ToolState::new();
        assert!(state.get().is_none());
        let binding = ToolBinding {
            interpreter: "python".into(),
            executable: "/usr/bin/python".into(),
            version: "1.16.1".into(),
        };
        state.set(binding.clone());
        assert_eq!(state.get(), Some(binding.clone()));
        assert!(binding.is_legacy());
        state.clear();
        assert!(state.get().is_none());
    }

    #[tokio::test]
    async fn test_resolve_missing_interpreter_is_unresolved() {
        let r = resolve("no-such-python-3c9a").await;
        assert!(r.executable.is_none());
        assert!(r.version.is_none());
        assert!(r.binding().is_none());
    }
}

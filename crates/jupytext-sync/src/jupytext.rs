//! Invoking Jupytext.
//!
//! [`JupytextCli`] is the boundary between pairing logic and the external
//! tool. [`Jupytext`] implements it by running the currently bound
//! interpreter; tests and embedders can supply their own implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use jupytext_launch::{run_command, ToolBinding, ToolState};
use log::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::formats::FormatSpec;

/// Prints the document's paired formats as a JSON list.
///
/// argv: `<path> <include_config>`. The project config is only consulted
/// when `include_config` is `1`, so that implicit project defaults are not
/// mistaken for an explicit pairing.
const PAIRED_FORMATS_SCRIPT: &str = r#"
import json, os, sys
import jupytext
from jupytext.formats import short_form_multiple_formats

path = sys.argv[1]
include_config = sys.argv[2] == "1"
formats = None
if os.path.exists(path):
    nb = jupytext.read(path)
    formats = nb.metadata.get("jupytext", {}).get("formats")
if not formats and include_config:
    from jupytext.config import find_jupytext_configuration_file, load_jupytext_configuration_file
    config_file = find_jupytext_configuration_file(os.path.dirname(os.path.abspath(path)))
    if config_file:
        config = load_jupytext_configuration_file(config_file)
        if config is not None:
            formats = config.default_formats(path)
if formats:
    formats = short_form_multiple_formats(formats)
print(json.dumps([f for f in formats.split(",") if f] if formats else []))
"#;

/// Prints the extensions Jupytext can pair as a JSON list.
const SUPPORTED_EXTENSIONS_SCRIPT: &str =
    "import json; from jupytext.formats import NOTEBOOK_EXTENSIONS; print(json.dumps(NOTEBOOK_EXTENSIONS))";

/// Operations the pairing layer needs from Jupytext.
///
/// Futures are `'static` so they can be moved into the operation queue.
pub trait JupytextCli: Send + Sync + 'static {
    /// Version of the currently usable Jupytext, `None` if there is none.
    fn version(&self) -> Option<String>;

    /// `jupytext --sync <path>`. Returns stdout.
    fn sync(&self, path: PathBuf) -> BoxFuture<'static, SyncResult<String>>;

    /// `jupytext --set-formats <formats> <path>`. Returns stdout.
    fn set_formats(
        &self,
        path: PathBuf,
        formats: FormatSpec,
    ) -> BoxFuture<'static, SyncResult<String>>;

    /// Formats the document at `path` is paired with; empty when unpaired.
    fn paired_formats(&self, path: PathBuf) -> BoxFuture<'static, SyncResult<FormatSpec>>;

    /// Extensions Jupytext can pair, with leading dots.
    fn supported_extensions(&self) -> BoxFuture<'static, SyncResult<Vec<String>>>;
}

/// Runs Jupytext through the interpreter held in a [`ToolState`].
pub struct Jupytext {
    tools: Arc<ToolState>,
    sync_args: Vec<String>,
    set_formats_args: Vec<String>,
}

impl Jupytext {
    pub fn new(tools: Arc<ToolState>) -> Self {
        Self {
            tools,
            sync_args: vec![],
            set_formats_args: vec![],
        }
    }

    pub fn with_args(mut self, sync_args: Vec<String>, set_formats_args: Vec<String>) -> Self {
        self.sync_args = sync_args;
        self.set_formats_args = set_formats_args;
        self
    }

    fn binding(&self) -> SyncResult<ToolBinding> {
        self.tools.get().ok_or(SyncError::ToolUnavailable)
    }
}

/// Jupytext looks for config files relative to the working directory.
fn working_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Parse the last non-empty stdout line as a JSON list of strings.
fn parse_json_list(stdout: &str) -> SyncResult<Vec<String>> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| SyncError::UnexpectedOutput(stdout.to_string()))?;
    serde_json::from_str(line).map_err(|_| SyncError::UnexpectedOutput(line.to_string()))
}

impl JupytextCli for Jupytext {
    fn version(&self) -> Option<String> {
        self.tools.get().map(|b| b.version)
    }

    fn sync(&self, path: PathBuf) -> BoxFuture<'static, SyncResult<String>> {
        let binding = self.binding();
        let extra = self.sync_args.clone();
        async move {
            let binding = binding?;
            let mut args = vec!["-m".to_string(), "jupytext".into(), "--sync".into()];
            args.extend(extra);
            args.push(path_arg(&path));

            info!("[jupytext] Syncing {:?}", path);
            let stdout = run_command(&binding.program(), &args, working_dir(&path).as_deref()).await?;
            if !stdout.is_empty() {
                info!("[jupytext] {}", stdout);
            }
            Ok(stdout)
        }
        .boxed()
    }

    fn set_formats(
        &self,
        path: PathBuf,
        formats: FormatSpec,
    ) -> BoxFuture<'static, SyncResult<String>> {
        let binding = self.binding();
        let extra = self.set_formats_args.clone();
        async move {
            let binding = binding?;
            let mut args = vec![
                "-m".to_string(),
                "jupytext".into(),
                "--set-formats".into(),
                formats.to_string(),
            ];
            args.extend(extra);
            args.push(path_arg(&path));

            info!("[jupytext] Pairing {:?} as {}", path, formats);
            let stdout = run_command(&binding.program(), &args, working_dir(&path).as_deref()).await?;
            if !stdout.is_empty() {
                info!("[jupytext] {}", stdout);
            }
            Ok(stdout)
        }
        .boxed()
    }

    fn paired_formats(&self, path: PathBuf) -> BoxFuture<'static, SyncResult<FormatSpec>> {
        let binding = self.binding();
        async move {
            let binding = binding?;
            let include_config = if binding.is_legacy() { "0" } else { "1" };
            let args = [
                "-c".to_string(),
                PAIRED_FORMATS_SCRIPT.to_string(),
                path_arg(&path),
                include_config.to_string(),
            ];
            let stdout = run_command(&binding.program(), &args, working_dir(&path).as_deref()).await?;
            let formats = FormatSpec::from_list(&parse_json_list(&stdout)?)?;
            debug!("[jupytext] {:?} is paired as '{}'", path, formats);
            Ok(formats)
        }
        .boxed()
    }

    fn supported_extensions(&self) -> BoxFuture<'static, SyncResult<Vec<String>>> {
        let binding = self.binding();
        async move {
            let binding = binding?;
            let stdout =
                run_command(&binding.program(), &["-c", SUPPORTED_EXTENSIONS_SCRIPT], None).await?;
            parse_json_list(&stdout)
        }
        .boxed()
    }
}

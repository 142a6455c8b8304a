//! jupytext-sync CLI entry point.
//!
//! Watches a directory and keeps paired notebooks in sync, or runs a single
//! pairing operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use jupytext_launch::tools::{self, ToolState};
use jupytext_sync::project_file::{find_jupytext_config, is_jupytext_possibly_used};
use jupytext_sync::settings::{load_settings, settings_path};
use jupytext_sync::{
    default_tracker_path, AutoCreatedTracker, Dispatcher, FormatSpec, Jupytext, OperationQueue,
    Pairing, Settings,
};
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "jupytext-sync")]
#[command(about = "Keep Jupyter notebooks and their paired text files in sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory and sync paired files on change
    Watch {
        /// Directory to watch (default: current directory)
        dir: Option<PathBuf>,
    },

    /// Sync a file with its paired representations
    Sync { path: PathBuf },

    /// Pair a file with other formats
    Pair {
        path: PathBuf,

        /// Formats, e.g. `ipynb,py:percent` (default: current pairing or a suggestion)
        #[arg(long)]
        formats: Option<String>,

        /// Fail unless the formats include a notebook
        #[arg(long)]
        require_notebook: bool,
    },

    /// Show the paired formats of a file
    Formats {
        path: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the paired notebook of a text file, creating it if missing
    NotebookPath { path: PathBuf },

    /// List python interpreters and the jupytext they provide
    Discover {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and tool status
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Commands::Watch { dir } => watch(dir).await,
        Commands::Sync { path } => sync(&path).await,
        Commands::Pair {
            path,
            formats,
            require_notebook,
        } => pair(&path, formats, require_notebook).await,
        Commands::Formats { path, json } => formats(&path, json).await,
        Commands::NotebookPath { path } => notebook_path(&path).await,
        Commands::Discover { json } => discover(json).await,
        Commands::Status { json } => status(json).await,
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Whether failing to find jupytext should stop the command.
fn tool_is_required(workspace: &Path, require_tool: bool) -> bool {
    require_tool || is_jupytext_possibly_used(workspace)
}

/// Bind a jupytext and build the dispatcher for `workspace`.
///
/// With `require_tool` unset, a workspace without any Jupytext config may
/// run without a tool; every event is then skipped.
async fn build_dispatcher(
    workspace: &Path,
    require_tool: bool,
) -> anyhow::Result<Dispatcher<Jupytext>> {
    let settings = load_settings();
    let tools = Arc::new(ToolState::new());
    if let Err(e) = tools::validate(&tools, settings.python_executable.as_deref()).await {
        if tool_is_required(workspace, require_tool) {
            return Err(e.into());
        }
        warn!(
            "{}; {} has no jupytext config, continuing without jupytext",
            e,
            workspace.display()
        );
    }

    let cli = Jupytext::new(tools)
        .with_args(settings.sync_args.clone(), settings.set_formats_args.clone());
    let pairing = Pairing::new(Arc::new(cli), OperationQueue::new())
        .with_default_formats(settings.default_formats.clone());
    let supported = pairing.supported_extensions().await;
    let tracker = AutoCreatedTracker::load(default_tracker_path(workspace)).await;

    Ok(Dispatcher::new(pairing, Arc::new(tracker), settings).with_supported_extensions(supported))
}

async fn watch(dir: Option<PathBuf>) -> anyhow::Result<()> {
    let root = match dir {
        Some(dir) => absolute(&dir)?,
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    if !is_jupytext_possibly_used(&root) {
        info!("No jupytext config found; only explicitly paired files will be synced");
    }

    let dispatcher = Arc::new(build_dispatcher(&root, false).await?);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    jupytext_sync::watch::watch(dispatcher, &root, shutdown).await
}

async fn sync(path: &Path) -> anyhow::Result<()> {
    let path = absolute(path)?;
    let dispatcher = build_dispatcher(&workspace_of(&path), true).await?;
    let stdout = dispatcher.pairing().sync(&path).await?;
    if !stdout.is_empty() {
        println!("{}", stdout);
    }
    Ok(())
}

async fn pair(path: &Path, formats: Option<String>, require_notebook: bool) -> anyhow::Result<()> {
    let path = absolute(path)?;
    let requested = formats
        .map(|f| f.parse::<FormatSpec>())
        .transpose()
        .context("Invalid --formats")?;

    let dispatcher = build_dispatcher(&workspace_of(&path), true).await?;
    match dispatcher
        .pairing()
        .set_formats(&path, requested, require_notebook)
        .await?
    {
        Some(applied) => println!("Paired {} as {}", path.display(), applied),
        None => println!("Nothing to pair for {}", path.display()),
    }
    Ok(())
}

async fn formats(path: &Path, json: bool) -> anyhow::Result<()> {
    let path = absolute(path)?;
    let dispatcher = build_dispatcher(&workspace_of(&path), true).await?;
    let pairing = dispatcher.pairing();
    let current = pairing.try_read_paired_formats(&path).await?;
    let suggested = pairing.suggest_formats(&path);

    if json {
        let output = serde_json::json!({
            "path": path,
            "paired": current.is_paired(),
            "formats": current,
            "suggested": suggested,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if current.is_paired() {
        println!("{}", current);
    } else {
        println!("Not paired (suggested: {})", suggested);
    }
    Ok(())
}

async fn notebook_path(path: &Path) -> anyhow::Result<()> {
    let path = absolute(path)?;
    let dispatcher = build_dispatcher(&workspace_of(&path), true).await?;
    let notebook = dispatcher.open_paired_notebook(&path).await?;
    println!("{}", notebook.display());
    Ok(())
}

async fn discover(json: bool) -> anyhow::Result<()> {
    let settings = load_settings();
    let candidates = tools::gather_candidates(
        tools::environment_interpreters(),
        settings.python_executable.as_deref(),
    );
    let resolutions = tools::resolve_all(&candidates).await;
    let selected = tools::select_newest(&resolutions);

    if json {
        let output = serde_json::json!({
            "candidates": resolutions,
            "selected": selected,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for r in &resolutions {
        match (&r.executable, &r.version) {
            (Some(exe), Some(version)) => {
                println!("  {:<20} jupytext {} ({})", r.interpreter, version, exe.display())
            }
            (Some(exe), None) => {
                println!("  {:<20} no jupytext ({})", r.interpreter, exe.display())
            }
            _ => println!("  {:<20} not found", r.interpreter),
        }
    }
    match selected {
        Some(b) => println!("Selected: jupytext {} via {}", b.version, b.executable.display()),
        None => println!("No python with jupytext found"),
    }
    Ok(())
}

async fn status(json: bool) -> anyhow::Result<()> {
    let settings_file = settings_path();
    let settings: Settings = load_settings();
    let cwd = std::env::current_dir()?;

    let tools = Arc::new(ToolState::new());
    let binding = tools::validate(&tools, settings.python_executable.as_deref())
        .await
        .ok();
    let legacy = binding.as_ref().is_some_and(|b| b.is_legacy());
    let config = find_jupytext_config(&cwd);
    let tracker = AutoCreatedTracker::load(default_tracker_path(&cwd)).await;
    let auto_created = tracker.entries().await;

    if json {
        let output = serde_json::json!({
            "settings_path": settings_file,
            "settings": settings,
            "jupytext": binding,
            "legacy": legacy,
            "config_file": config.as_ref().map(|c| &c.path),
            "tracker_path": tracker.path(),
            "auto_created": auto_created,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Settings: {}", settings_file.display());
    match &binding {
        Some(b) if legacy => println!(
            "Jupytext: {} via {} (legacy: unpaired files are never synced)",
            b.version,
            b.executable.display()
        ),
        Some(b) => println!("Jupytext: {} via {}", b.version, b.executable.display()),
        None => println!("Jupytext: not found"),
    }
    match &config {
        Some(c) => println!("Config:   {}", c.path.display()),
        None => println!("Config:   none"),
    }
    println!(
        "Tracker:  {} ({} auto-created notebooks)",
        tracker.path().display(),
        auto_created.len()
    );
    Ok(())
}

/// The nearest project root above `path`, or its directory.
fn workspace_of(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or(path);
    dir.ancestors()
        .find(|d| d.join(".git").exists())
        .unwrap_or(dir)
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tool_optional_without_jupytext_config() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();

        assert!(!tool_is_required(temp.path(), false));
        assert!(tool_is_required(temp.path(), true));

        std::fs::write(temp.path().join("jupytext.toml"), "").unwrap();
        assert!(tool_is_required(temp.path(), false));
    }

    #[test]
    fn test_workspace_of_prefers_git_root() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("src").join("pkg");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();

        assert_eq!(workspace_of(&nested.join("nb.py")), temp.path());
    }
}

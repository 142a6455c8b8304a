//! Run an external command and capture its output.

use std::path::Path;
use std::process::Stdio;

use log::{debug, error};
use tokio::process::Command;

/// Error from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {code:?}{}", stderr_suffix(.stderr))]
    Exit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Command line is empty")]
    Empty,
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Python paths on Windows are often reported with backslashes; Jupytext and
/// the interpreter both accept forward slashes.
fn normalize_arg(arg: &str) -> String {
    arg.replace('\\', "/")
}

/// Run `program` with `args`, returning trimmed stdout on a zero exit status.
///
/// The child inherits the current environment plus `PYTHONUNBUFFERED=1` and a
/// UTF-8 `PYTHONIOENCODING` unless one is already set. When `cwd` is `None`
/// the child runs in the current directory.
pub async fn run_command<S: AsRef<str>>(
    program: &str,
    args: &[S],
    cwd: Option<&Path>,
) -> Result<String, CommandError> {
    if program.is_empty() {
        return Err(CommandError::Empty);
    }

    let program = normalize_arg(program);
    let args: Vec<String> = args.iter().map(|a| normalize_arg(a.as_ref())).collect();
    let command_line = if args.is_empty() {
        program.clone()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    let io_encoding =
        std::env::var("PYTHONIOENCODING").unwrap_or_else(|_| "utf-8".to_string());

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONIOENCODING", io_encoding)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!("[process] Executing: {}", command_line);

    let output = cmd.output().await.map_err(|source| {
        error!("[process] '{}' during '{}'", source, command_line);
        CommandError::Spawn {
            command: command_line.clone(),
            source,
        }
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        error!(
            "[process] Exit code {:?} during '{}'\n(stderr): {}\n(stdout): {}",
            output.status.code(),
            command_line,
            stderr,
            stdout
        );
        return Err(CommandError::Exit {
            command: command_line,
            code: output.status.code(),
            stdout,
            stderr,
        });
    }

    debug!("[process] '{}' succeeded", command_line);
    if !stderr.is_empty() {
        debug!("[process] (stderr): {}", stderr);
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_arg_replaces_backslashes() {
        assert_eq!(
            normalize_arg(r"C:\Users\me\venv\python.exe"),
            "C:/Users/me/venv/python.exe"
        );
        assert_eq!(normalize_arg("--sync"), "--sync");
    }

    #[tokio::test]
    async fn test_empty_program_is_rejected() {
        let result = run_command::<&str>("", &[], None).await;
        assert!(matches!(result, Err(CommandError::Empty)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let result = run_command::<&str>("definitely-not-a-real-binary-8d1f", &[], None).await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let out = run_command("sh", &["-c", "echo '  hello  '"], None)
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let err = run_command("sh", &["-c", "echo oops >&2; exit 3"], None)
            .await
            .unwrap_err();
        match err {
            CommandError::Exit { code, ref stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().ends_with(": oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_requested_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let out = run_command("sh", &["-c", "pwd -P"], Some(dir.path()))
            .await
            .unwrap();
        assert_eq!(std::path::PathBuf::from(out), expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_python_environment_is_set() {
        let out = run_command("sh", &["-c", "echo $PYTHONUNBUFFERED"], None)
            .await
            .unwrap();
        assert_eq!(out, "1");
    }
}

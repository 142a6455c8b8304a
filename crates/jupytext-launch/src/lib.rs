//! Python interpreter discovery and process running for jupytext-sync.
//!
//! This crate holds the pieces that talk to the outside world without knowing
//! anything about pairing:
//!
//! - Running commands with captured output ([`process`])
//! - Ordering Jupytext version strings ([`version`])
//! - Finding an interpreter that can run Jupytext ([`tools`])
//!
//! ```ignore
//! use jupytext_launch::tools;
//!
//! let candidates = tools::gather_candidates(tools::environment_interpreters(), None);
//! let binding = tools::discover(&candidates).await;
//! ```

pub mod process;
pub mod tools;
pub mod version;

// Re-export commonly used items
pub use process::{run_command, CommandError};
pub use tools::{discover, resolve, ToolBinding, ToolState};
pub use version::{compare_versions, MIN_SUPPORTED_VERSION};

// Environment context for prompts
//
// `SystemInfo` is interpolated into every system prompt; `workspace` gathers
// the optional richer snapshot (`tern ask --context`).

pub mod workspace;

pub use workspace::{directory_listing, gather, gather_in, human_size, WorkspaceContext};

use std::path::PathBuf;

/// Host facts the model needs to pick the right command dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub shell: String,
    pub cwd: PathBuf,
}

impl SystemInfo {
    pub fn detect() -> Self {
        let shell = std::env::var("SHELL")
            .ok()
            .and_then(|path| {
                PathBuf::from(path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "sh".to_string());

        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            shell,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

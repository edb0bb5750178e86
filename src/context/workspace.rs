// Workspace snapshot for prompt augmentation
//
// Collects the working directory, git branch/status and a short directory
// listing. Every probe is best-effort: a missing git binary, a non-repo
// directory or an unreadable entry just leaves that part out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const GIT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    pub cwd: PathBuf,
    pub git_branch: Option<String>,
    /// `git status --porcelain --branch`, or `(clean)`
    pub git_status: Option<String>,
    pub listing: String,
}

impl WorkspaceContext {
    /// Text block appended to the command prompt.
    pub fn render(&self) -> String {
        let mut parts = vec![format!("CWD: {}", self.cwd.display())];
        if let Some(branch) = &self.git_branch {
            parts.push(format!("Git branch: {}", branch));
        }
        if let Some(status) = &self.git_status {
            parts.push(format!("Git status:\n{}", status));
        }
        parts.push(format!("Directory listing:\n{}", self.listing));
        parts.join("\n\n")
    }
}

/// Snapshot the current directory.
pub async fn gather(max_entries: usize) -> WorkspaceContext {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    gather_in(&cwd, max_entries).await
}

/// Snapshot `dir`.
pub async fn gather_in(dir: &Path, max_entries: usize) -> WorkspaceContext {
    let git_branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
    let git_status = git(dir, &["status", "--porcelain", "--branch"])
        .await
        .map(|s| if s.is_empty() { "(clean)".to_string() } else { s });

    WorkspaceContext {
        cwd: dir.to_path_buf(),
        git_branch,
        git_status,
        listing: directory_listing(dir, max_entries),
    }
}

async fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(GIT_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            debug!("git {} unavailable: {}", args.join(" "), e);
            None
        }
        Err(_) => {
            debug!("git {} timed out", args.join(" "));
            None
        }
    }
}

/// Directories first, then files, case-insensitively by name.
pub fn directory_listing(dir: &Path, max_entries: usize) -> String {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(_) => return "  (cannot read directory)".to_string(),
    };

    let mut entries: Vec<(bool, String, Option<u64>)> = read
        .filter_map(|e| e.ok())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata() {
                Ok(meta) => (meta.is_dir(), name, meta.is_file().then(|| meta.len())),
                Err(_) => (false, name, None),
            }
        })
        .collect();

    if entries.is_empty() {
        return "  (empty directory)".to_string();
    }
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase())));

    let mut lines: Vec<String> = entries
        .iter()
        .take(max_entries)
        .map(|(is_dir, name, size)| {
            let prefix = if *is_dir { "d" } else { "f" };
            let size = match size {
                Some(0) | None => "-".to_string(),
                Some(bytes) => human_size(*bytes),
            };
            format!("  [{}] {:<40} {}", prefix, name, size)
        })
        .collect();

    if entries.len() > max_entries {
        lines.push(format!("  ... and {} more", entries.len() - max_entries));
    }
    lines.join("\n")
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return if unit == "B" {
                format!("{:.0}{}", size, unit)
            } else {
                format!("{:.1}{}", size, unit)
            };
        }
        size /= 1024.0;
    }
    format!("{:.1}PB", size)
}

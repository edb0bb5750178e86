// Configuration loader
// Loads ~/.config/tern/config.toml (or an explicit path), then applies
// environment overrides

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::CONFIG_RELATIVE_PATH;
use super::settings::{BackendEntry, Config};
use crate::providers::BackendKind;

/// Written by `tern init-config`. Every value shown is the default.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# tern configuration
#
# Environment overrides: TERN_MODEL, TERN_TEMPERATURE, TERN_STREAM,
# TERN_BACKENDS (comma separated kinds), OLLAMA_URL, LMSTUDIO_URL, LLAMACPP_URL

model = "gemma2:2b"
temperature = 0.1
num_ctx = 4096
num_predict = 512
stream = true
chat_history_window = 10

# Tried in order; the first reachable backend answers.
# kind: "ollama" | "openai" (LM Studio, vLLM, ...) | "llamacpp"
[[backends]]
kind = "ollama"
base_url = "http://localhost:11434"

# [[backends]]
# kind = "openai"
# base_url = "http://localhost:1234"

# [[backends]]
# kind = "llamacpp"
# base_url = "http://localhost:8080"

[timeouts]
connect_ms = 2000
probe_ms = 800
request_secs = 180
idle_secs = 30

[safety]
confirm = true
block_critical = true
# auto_confirm_max = "safe"
"#;

/// `~/.config/tern/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(CONFIG_RELATIVE_PATH))
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist; a missing default file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    load_config_with(path, |key| std::env::var(key).ok())
}

fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => {
            let path = default_config_path()?;
            if path.exists() {
                read_config_file(&path)?
            } else {
                tracing::debug!("No config file at {:?}, using defaults", path);
                Config::default()
            }
        }
    };

    apply_env_overrides(&mut config, lookup)?;

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::debug!("Loaded configuration from {:?}", path);
    Ok(config)
}

/// Apply `TERN_*` and per-server URL variables on top of the file values.
///
/// `TERN_BACKENDS` replaces the backend list (keeping per-entry settings of
/// kinds already configured); the URL variables then retarget every entry of
/// their kind.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(model) = get("TERN_MODEL") {
        config.model = model.trim().to_string();
    }

    if let Some(raw) = get("TERN_TEMPERATURE") {
        config.temperature = raw
            .trim()
            .parse()
            .with_context(|| format!("TERN_TEMPERATURE is not a number: {raw:?}"))?;
    }

    if let Some(raw) = get("TERN_STREAM") {
        config.stream = parse_bool(&raw)
            .with_context(|| format!("TERN_STREAM must be true/false, got {raw:?}"))?;
    }

    if let Some(raw) = get("TERN_BACKENDS") {
        let mut backends = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let Some(kind) = BackendKind::parse(name) else {
                bail!("Unknown backend kind '{}' in TERN_BACKENDS (expected ollama, openai or llamacpp)", name);
            };
            let entry = config
                .backends
                .iter()
                .find(|e| e.kind == kind)
                .cloned()
                .unwrap_or_else(|| BackendEntry::new(kind));
            backends.push(entry);
        }
        config.backends = backends;
    }

    for (var, kind) in [
        ("OLLAMA_URL", BackendKind::Ollama),
        ("LMSTUDIO_URL", BackendKind::OpenAiCompatible),
        ("LLAMACPP_URL", BackendKind::LlamaCpp),
    ] {
        if let Some(url) = get(var) {
            for entry in config.backends.iter_mut().filter(|e| e.kind == kind) {
                entry.base_url = Some(url.trim().to_string());
            }
        }
    }

    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Write the commented default config. Refuses to overwrite an existing file.
pub fn write_default_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if path.exists() {
        bail!("Config file already exists at {}", path.display());
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Configuration written to {:?}", path);
    Ok(path)
}

//! Updater configuration stored in `updater.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::CheckoutLocation;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "updater.toml";

/// Updater configuration (TOML).
///
/// Meant to be edited by humans; missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Workspace root every location is checked out under.
    pub workspace: PathBuf,

    pub svn: SvnConfig,

    /// Locations checked out by `updater run`, in order.
    pub locations: Vec<CheckoutLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SvnConfig {
    /// `svn` executable to run.
    pub binary: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Accept server certificates that fail verification.
    pub trust_server_cert: bool,

    /// Alternative svn runtime configuration directory.
    pub config_dir: Option<PathBuf>,

    /// Kill svn after this many seconds (0 disables the limit).
    pub timeout_secs: u64,

    /// Keep at most this many bytes of svn stderr for error reports.
    pub stderr_limit_bytes: usize,
}

impl SvnConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            binary: "svn".to_string(),
            username: None,
            password: None,
            trust_server_cert: false,
            config_dir: None,
            timeout_secs: 0,
            stderr_limit_bytes: 100_000,
        }
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            svn: SvnConfig::default(),
            locations: Vec::new(),
        }
    }
}

impl UpdaterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.svn.binary.trim().is_empty() {
            return Err(anyhow!("svn.binary must be non-empty"));
        }
        if self.svn.stderr_limit_bytes == 0 {
            return Err(anyhow!("svn.stderr_limit_bytes must be > 0"));
        }
        if self.svn.password.is_some() && self.svn.username.is_none() {
            return Err(anyhow!("svn.password requires svn.username"));
        }
        for (idx, location) in self.locations.iter().enumerate() {
            location
                .validate()
                .with_context(|| format!("locations[{idx}]"))?;
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `UpdaterConfig::default()`.
pub fn load_config(path: &Path) -> Result<UpdaterConfig> {
    if !path.exists() {
        let cfg = UpdaterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: UpdaterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &UpdaterConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

// Configuration for routescope.
// Read from an optional routescope.{yaml,yml,json} file, then environment
// variables, on top of built-in defaults.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAMES: &[&str] = &["routescope.yaml", "routescope.yml", "routescope.json"];
const DEFAULT_FILE_PATTERNS: &[&str] = &["**/*.controller.ts"];
const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["**/node_modules/**", "**/dist/**", "**/out/**"];
const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Globs selecting files to scan, relative to each root (ROUTESCOPE_FILE_PATTERNS)
    pub file_patterns: Vec<String>,

    /// Globs removing files from the scan (ROUTESCOPE_EXCLUDE_PATTERNS)
    pub exclude_patterns: Vec<String>,

    /// Debounce window for file-system events (ROUTESCOPE_WATCH_DEBOUNCE_MS)
    pub watch_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_patterns: DEFAULT_FILE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Loads `explicit` if given, otherwise the first config file found in
    /// `root`, otherwise defaults. Environment overrides apply last.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover(root),
        };
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = crate::util::read_to_string(path)?;
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        let config = match ext {
            "yaml" | "yml" => serde_yaml_ng::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?,
            "json" => serde_json::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?,
            _ => bail!("unsupported config format: {}", path.display()),
        };
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(val) = env::var("ROUTESCOPE_FILE_PATTERNS") {
            self.file_patterns = split_patterns(&val);
        }

        if let Ok(val) = env::var("ROUTESCOPE_EXCLUDE_PATTERNS") {
            self.exclude_patterns = split_patterns(&val);
        }

        if let Ok(val) = env::var("ROUTESCOPE_WATCH_DEBOUNCE_MS") {
            if let Ok(parsed) = val.parse() {
                self.watch_debounce_ms = parsed;
            } else {
                tracing::warn!(
                    value = %val,
                    default = self.watch_debounce_ms,
                    "invalid ROUTESCOPE_WATCH_DEBOUNCE_MS, keeping current value"
                );
            }
        }
    }
}

/// Config file candidates in `root`, in lookup order.
pub fn candidate_paths(root: &Path) -> Vec<PathBuf> {
    CONFIG_FILE_NAMES.iter().map(|name| root.join(name)).collect()
}

fn discover(root: &Path) -> Option<PathBuf> {
    candidate_paths(root).into_iter().find(|path| path.is_file())
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

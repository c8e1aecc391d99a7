//! Engine configuration, usually `canopy.toml` next to the tree file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML). Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick bound for `canopy run`.
    pub max_ticks: u32,

    /// Upper bound on threads one `parallel` node uses per tick.
    pub parallel_workers: usize,

    /// Tick bound for nested trees run by `invoke` without `maxTicks`.
    pub subtree_max_ticks: u32,

    /// Iteration bound for `repeat` nodes without `maxIterations`.
    pub repeat_max_iterations: u64,

    /// Reject duplicate kind/function registrations instead of replacing them.
    pub strict_registry: bool,

    pub event_log: EventLogConfig,

    pub model: ModelConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventLogConfig {
    /// JSON-lines event log; relative paths resolve against the config file.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Model backend command (e.g. `["my-llm", "--json"]`). Empty disables `model` nodes.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Backend stdout beyond this many bytes is an error.
    pub output_limit_bytes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn enabled(&self) -> bool {
        !self.command.is_empty()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ticks: 1000,
            parallel_workers: 4,
            subtree_max_ticks: 1000,
            repeat_max_iterations: 10_000,
            strict_registry: false,
            event_log: EventLogConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_ticks == 0 {
            return Err(anyhow!("max_ticks must be > 0"));
        }
        if self.parallel_workers == 0 {
            return Err(anyhow!("parallel_workers must be > 0"));
        }
        if self.subtree_max_ticks == 0 {
            return Err(anyhow!("subtree_max_ticks must be > 0"));
        }
        if self.repeat_max_iterations == 0 {
            return Err(anyhow!("repeat_max_iterations must be > 0"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self
            .model
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("model.command must start with a program name"));
        }
        Ok(())
    }

    /// Resolve a relative event log path against `base`.
    pub fn event_log_path(&self, base: &Path) -> Option<PathBuf> {
        self.event_log.path.as_ref().map(|path| {
            if path.is_relative() {
                base.join(path)
            } else {
                path.clone()
            }
        })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn full_file_loads_every_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("canopy.toml");
        fs::write(
            &path,
            "parallel_workers = 2\nstrict_registry = true\n\n\
             [event_log]\npath = \"events.jsonl\"\n\n\
             [model]\ncommand = [\"model-cli\"]\n",
        )
        .expect("write");
        let expected = EngineConfig {
            parallel_workers: 2,
            strict_registry: true,
            event_log: EventLogConfig {
                path: Some(PathBuf::from("events.jsonl")),
            },
            model: ModelConfig {
                command: vec!["model-cli".to_string()],
                ..ModelConfig::default()
            },
            ..EngineConfig::default()
        };
        assert_eq!(load_config(&path).expect("load"), expected);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("canopy.toml");
        fs::write(&path, "max_ticks = 5\n[model]\ntimeout_secs = 3\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_ticks, 5);
        assert_eq!(cfg.model.timeout_secs, 3);
        assert_eq!(cfg.parallel_workers, 4);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("canopy.toml");
        fs::write(&path, "parallel_workers = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("parallel_workers"));
    }

    #[test]
    fn relative_event_log_path_resolves_against_base() {
        let cfg = EngineConfig {
            event_log: EventLogConfig {
                path: Some(PathBuf::from("log/events.jsonl")),
            },
            ..EngineConfig::default()
        };
        assert_eq!(
            cfg.event_log_path(Path::new("/srv/trees")),
            Some(PathBuf::from("/srv/trees/log/events.jsonl"))
        );
    }
}

//! `canopy`: validate and run behavior trees described in JSON, and inspect
//! event logs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use canopy::core::event::{EventId, Tag};
use canopy::core::query::EventQuery;
use canopy::core::status::NodeStatus;
use canopy::exit_codes;
use canopy::io::config::{EngineConfig, load_config};
use canopy::io::event_log::{EventLog, JsonlEventLog};
use canopy::io::model::{CommandBackend, ModelKind};
use canopy::logging;
use canopy::tree::builder::{InitialContext, TreeBuilder};
use canopy::tree::description::Description;
use canopy::tree::executor::drive;
use canopy::tree::registry::Registry;

const CONFIG_FILE: &str = "canopy.toml";

#[derive(Parser)]
#[command(name = "canopy", version, about = "Behavior-tree execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and build a tree description without running it.
    Validate {
        tree: PathBuf,
        /// Config file (default: `canopy.toml` next to the tree).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Tick a tree until it finishes or `max_ticks` is reached.
    Run {
        tree: PathBuf,
        /// JSON object seeding the working set.
        #[arg(long)]
        memory: Option<PathBuf>,
        /// Config file (default: `canopy.toml` next to the tree).
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON-lines event log (overrides `event_log.path`).
        #[arg(long)]
        events: Option<PathBuf>,
        /// Override `max_ticks`.
        #[arg(long)]
        max_ticks: Option<u32>,
    },
    /// Print events from a JSON-lines log, one per line.
    Events {
        log: PathBuf,
        /// Only events of this type (repeatable).
        #[arg(long = "type")]
        types: Vec<String>,
        /// Only events carrying this `TYPE:ID` tag (repeatable; all must match).
        #[arg(long = "tag")]
        tags: Vec<Tag>,
        /// Only events up to and excluding this id.
        #[arg(long, conflicts_with = "after")]
        as_of: Option<EventId>,
        /// Only events after this id.
        #[arg(long)]
        after: Option<EventId>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { tree, config } => cmd_validate(&tree, config.as_deref()),
        Command::Run {
            tree,
            memory,
            config,
            events,
            max_ticks,
        } => cmd_run(
            &tree,
            memory.as_deref(),
            config.as_deref(),
            events.as_deref(),
            max_ticks,
        ),
        Command::Events {
            log,
            types,
            tags,
            as_of,
            after,
        } => cmd_events(&log, types, tags, as_of, after),
    }
}

fn cmd_validate(tree_path: &Path, config_path: Option<&Path>) -> Result<i32> {
    let (config, _) = load_config_for(tree_path, config_path)?;
    let description = read_description(tree_path)?;
    builder_for(&config)?
        .build(description, InitialContext::new())
        .with_context(|| format!("build {}", tree_path.display()))?;
    println!("ok");
    Ok(exit_codes::OK)
}

fn cmd_run(
    tree_path: &Path,
    memory_path: Option<&Path>,
    config_path: Option<&Path>,
    events_path: Option<&Path>,
    max_ticks: Option<u32>,
) -> Result<i32> {
    let (config, base) = load_config_for(tree_path, config_path)?;
    let description = read_description(tree_path)?;

    let mut initial = InitialContext::new();
    if let Some(path) = memory_path {
        initial = initial.with_working(read_json(path)?);
    }
    let log_path = events_path
        .map(Path::to_path_buf)
        .or_else(|| config.event_log_path(&base));
    let log = match &log_path {
        Some(path) => {
            let log: Arc<dyn EventLog> = Arc::new(
                JsonlEventLog::start(path)
                    .with_context(|| format!("open event log {}", path.display()))?,
            );
            initial = initial.with_event_log(Arc::clone(&log));
            Some(log)
        }
        None => None,
    };

    let tree = builder_for(&config)?
        .build(description, initial)
        .with_context(|| format!("build {}", tree_path.display()))?;
    let max_ticks = max_ticks.unwrap_or(config.max_ticks);
    let outcome = drive(&tree, max_ticks, |tick, status| {
        info!(tick, %status, "tick");
    })
    .context("tick tree")?;
    if let Some(log) = log {
        log.stop().context("stop event log")?;
    }

    let report = json!({
        "status": outcome.status,
        "ticks": outcome.ticks,
        "working": tree.working().snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(match outcome.status {
        NodeStatus::Success => exit_codes::OK,
        NodeStatus::Failure => exit_codes::FAILURE,
        NodeStatus::Running => exit_codes::STILL_RUNNING,
    })
}

fn cmd_events(
    log_path: &Path,
    types: Vec<String>,
    tags: Vec<Tag>,
    as_of: Option<EventId>,
    after: Option<EventId>,
) -> Result<i32> {
    if !log_path.exists() {
        bail!("event log {} does not exist", log_path.display());
    }
    let mut query = EventQuery::all();
    for event_type in types {
        query = query.with_type(event_type);
    }
    for tag in tags {
        query = query.with_tag(tag);
    }
    if let Some(id) = as_of {
        query = query.as_of(id);
    }
    if let Some(id) = after {
        query = query.after(id);
    }

    let log = JsonlEventLog::start(log_path)
        .with_context(|| format!("open event log {}", log_path.display()))?;
    for event in log.read(&query)? {
        let event = event.with_context(|| format!("read {}", log_path.display()))?;
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(exit_codes::OK)
}

/// Load the explicit config, or `canopy.toml` beside the tree. Returns the
/// config and the directory relative paths in it resolve against.
fn load_config_for(tree_path: &Path, explicit: Option<&Path>) -> Result<(EngineConfig, PathBuf)> {
    let config_path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => parent_dir(tree_path).join(CONFIG_FILE),
    };
    let config = load_config(&config_path)?;
    Ok((config, parent_dir(&config_path)))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn builder_for(config: &EngineConfig) -> Result<TreeBuilder> {
    let mut registry = Registry::standard(config);
    if config.model.enabled() {
        registry.register(
            "model",
            ModelKind::new(Arc::new(CommandBackend::from_config(&config.model))),
        )?;
    }
    Ok(TreeBuilder::new(Arc::new(registry)))
}

fn read_description(path: &Path) -> Result<Description> {
    let raw = read_json(path)?;
    Description::parse(&raw).with_context(|| format!("parse {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "canopy",
            "run",
            "tree.json",
            "--memory",
            "seed.json",
            "--max-ticks",
            "5",
        ]);
        match cli.command {
            Command::Run {
                tree,
                memory,
                max_ticks,
                ..
            } => {
                assert_eq!(tree, PathBuf::from("tree.json"));
                assert_eq!(memory, Some(PathBuf::from("seed.json")));
                assert_eq!(max_ticks, Some(5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_events_filters() {
        let cli = Cli::parse_from([
            "canopy", "events", "log.jsonl", "--type", "a", "--type", "b", "--tag", "node:n1",
        ]);
        match cli.command {
            Command::Events { types, tags, .. } => {
                assert_eq!(types, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(tags, vec![Tag::new("node", "n1")]);
            }
            _ => panic!("expected events"),
        }
    }

    #[test]
    fn as_of_and_after_conflict() {
        let id = EventId::generate().to_string();
        let result = Cli::try_parse_from([
            "canopy", "events", "log.jsonl", "--as-of", &id, "--after", &id,
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn config_defaults_to_sibling_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(CONFIG_FILE), "max_ticks = 7\n").expect("write");
        let (config, base) =
            load_config_for(&temp.path().join("tree.json"), None).expect("load");
        assert_eq!(config.max_ticks, 7);
        assert_eq!(base, temp.path());
    }
}

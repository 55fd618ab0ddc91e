//! Command-gated plan/execute pipeline.
//!
//! Turns a free-text instruction into a validated plan of tool invocations,
//! runs it under capability gating and retries the whole attempt once on
//! failure. Results are printed to stdout as JSON; diagnostics go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use orchestrator::control_plane::{CommandPayload, ControlPlane, DEFAULT_CONVERSATION_ID};
use orchestrator::core::types::Action;
use orchestrator::error::PipelineError;
use orchestrator::exit_codes;
use orchestrator::io::cache::KnowledgeCache;
use orchestrator::io::config::{DEFAULT_CONFIG_PATH, OrchestratorConfig, load_config, write_config};
use orchestrator::logging;
use orchestrator::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Command-gated plan/execute pipeline with capability gating and bounded retry"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Read a JSON command payload from stdin and run it.
    Handle {
        /// Single attempt; print `{plan, results}`.
        #[arg(long)]
        trace: bool,
    },
    /// Run an instruction given on the command line.
    Execute {
        #[arg(long, default_value = DEFAULT_CONVERSATION_ID)]
        conversation_id: String,
        /// Single attempt; print `{plan, results}`.
        #[arg(long)]
        trace: bool,
        #[arg(required = true)]
        instructions: Vec<String>,
    },
    /// Inspect or seed the knowledge cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// List enabled capabilities, or enable/disable some and save the config.
    Capabilities {
        #[arg(long, value_name = "ACTION")]
        enable: Vec<Action>,
        #[arg(long, value_name = "ACTION")]
        disable: Vec<Action>,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Store a JSON value under a topic.
    Store { topic: String, json: String },
    /// Print the entry stored under a topic.
    Load { topic: String },
    /// Print every stored topic.
    List,
    /// Print entry count and total size.
    Stats,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Command(_)) => exit_codes::COMMAND_REJECTED,
        Some(PipelineError::Recovery(_)) => exit_codes::RECOVERY_EXHAUSTED,
        _ => exit_codes::INVALID,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Handle { trace } => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("read command payload from stdin")?;
            let payload: CommandPayload =
                serde_json::from_str(&raw).context("parse command payload")?;
            cmd_run(&cli.config, &payload, trace)
        }
        Command::Execute {
            conversation_id,
            trace,
            instructions,
        } => {
            let payload = CommandPayload::execute(conversation_id, instructions.join(" "));
            cmd_run(&cli.config, &payload, trace)
        }
        Command::Cache { command } => cmd_cache(&cli.config, command),
        Command::Capabilities { enable, disable } => {
            cmd_capabilities(&cli.config, &enable, &disable)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &OrchestratorConfig::default())
}

fn cmd_run(config_path: &Path, payload: &CommandPayload, trace: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let plane = ControlPlane::new(Orchestrator::from_config(&config)?);
    if trace {
        print_json(&plane.handle_with_trace(payload)?)
    } else {
        print_json(&plane.handle(payload)?)
    }
}

fn cmd_cache(config_path: &Path, command: CacheCommand) -> Result<()> {
    let config = load_config(config_path)?;
    let cache = KnowledgeCache::open(&config.execution.cache_dir)?;
    match command {
        CacheCommand::Store { topic, json } => {
            let data: Value = serde_json::from_str(&json).context("parse cache value")?;
            let key = cache.store(&topic, data)?;
            println!("{key}");
            Ok(())
        }
        CacheCommand::Load { topic } => match cache.load_entry(&topic) {
            Some(entry) => print_json(&entry),
            None => bail!("no cache entry for '{topic}'"),
        },
        CacheCommand::List => {
            for topic in cache.list_topics()? {
                println!("{topic}");
            }
            Ok(())
        }
        CacheCommand::Stats => print_json(&cache.stats()?),
    }
}

fn cmd_capabilities(config_path: &Path, enable: &[Action], disable: &[Action]) -> Result<()> {
    let mut config = load_config(config_path)?;
    if !enable.is_empty() || !disable.is_empty() {
        for action in enable {
            config.set_capability(*action, true);
        }
        for action in disable {
            config.set_capability(*action, false);
        }
        write_config(config_path, &config)?;
    }
    for action in config.capability_registry()?.list_enabled() {
        println!("{action}");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}

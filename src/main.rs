use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use memfx::config::{validate_config, Config, ConfigLoader};
use memfx::{
    EffectId, EffectRegistry, EnableOutcome, HandleOptions, PointerSpec, ProcessHandle,
    ProcessIdentifier, Session,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Reversible runtime patches for a running process
#[derive(Parser)]
#[command(name = "memfx")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "memfx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the modules of a process
    Modules {
        /// Executable name or pid
        process: ProcessIdentifier,

        #[arg(long)]
        json: bool,
    },

    /// Hex dump memory at a pointer such as `dxhr.exe+0x15DE1A8,0x14,0x140`
    Read {
        process: ProcessIdentifier,
        pointer: PointerSpec,

        #[arg(short, long, default_value_t = 16)]
        len: usize,
    },

    /// Write hex bytes at a pointer
    Write {
        process: ProcessIdentifier,
        pointer: PointerSpec,
        /// Bytes as hex, e.g. `01` or `0000803f`
        bytes: String,
    },

    /// List the registered effects
    Effects {
        #[arg(long)]
        json: bool,
    },

    /// Enable effects and keep them applied until Ctrl+C
    Run {
        /// Overrides the configured target
        process: Option<ProcessIdentifier>,

        /// Effect ids; defaults to the configured list
        #[arg(short, long = "effect")]
        effects: Vec<EffectId>,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new(&cli.config)
        .load_or_default()
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    validate_config(&config)?;
    init_logging(&config);

    let options = HandleOptions::from(&config.memory);

    match cli.command {
        Command::Modules { process, json } => list_modules(process, options, json),
        Command::Read {
            process,
            pointer,
            len,
        } => read_memory(process, options, &pointer, len),
        Command::Write {
            process,
            pointer,
            bytes,
        } => write_memory(process, options, &pointer, &bytes),
        Command::Effects { json } => list_effects(json),
        Command::Run { process, effects } => {
            let process = match process {
                Some(process) => process,
                None => config.target.process.parse()?,
            };
            let effects = if effects.is_empty() {
                config.effects.enabled.clone()
            } else {
                effects
            };
            run(process, options, &config, effects).await
        }
    }
}

fn list_modules(process: ProcessIdentifier, options: HandleOptions, json: bool) -> Result<()> {
    let handle = ProcessHandle::attach_with(process, options)?;
    let table = handle.modules();

    if json {
        let modules: Vec<_> = table.iter().collect();
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    println!("{}", handle);
    for module in table.iter() {
        println!(
            "  {}  {:#010x}  {}",
            module.base,
            module.size,
            module.name
        );
    }
    Ok(())
}

fn read_memory(
    process: ProcessIdentifier,
    options: HandleOptions,
    spec: &PointerSpec,
    len: usize,
) -> Result<()> {
    let handle = ProcessHandle::attach_with(process, options)?;
    let pointer = handle.pointer_from_spec(spec);
    let address = pointer.resolve()?;
    let bytes = pointer.read_bytes(len)?;

    for (row, chunk) in bytes.chunks(16).enumerate() {
        let offset = (row * 16) as u64;
        let row_address = address
            .checked_add(offset)
            .context("address overflow while dumping")?;
        println!("{}  {}", row_address, hex::encode(chunk));
    }
    Ok(())
}

fn write_memory(
    process: ProcessIdentifier,
    options: HandleOptions,
    spec: &PointerSpec,
    bytes: &str,
) -> Result<()> {
    let data = hex::decode(bytes.trim_start_matches("0x")).context("invalid hex bytes")?;
    if data.is_empty() {
        bail!("nothing to write");
    }

    let handle = ProcessHandle::attach_with(process, options)?;
    let pointer = handle.pointer_from_spec(spec);
    pointer.write_bytes(&data)?;
    info!(pointer = %pointer, len = data.len(), "bytes written");
    Ok(())
}

fn list_effects(json: bool) -> Result<()> {
    let registry = EffectRegistry::dxhr()?;
    let descriptors = registry.describe();

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    for effect in descriptors {
        match effect.conflict_group {
            Some(group) => println!("{:>3}  {}  [{}]", effect.id, effect.name, group),
            None => println!("{:>3}  {}", effect.id, effect.name),
        }
    }
    Ok(())
}

async fn run(
    process: ProcessIdentifier,
    options: HandleOptions,
    config: &Config,
    effects: Vec<EffectId>,
) -> Result<()> {
    if effects.is_empty() {
        bail!("no effects to enable");
    }

    let registry = EffectRegistry::dxhr()?;
    let mut session = Session::attach(process, registry, options)?
        .with_critical(config.effects.critical.iter().copied());
    info!(process = %session.process(), "attached");

    for id in effects {
        match session.enable(id)? {
            EnableOutcome::Enabled => info!(effect = id, "enabled"),
            EnableOutcome::AlreadyActive => info!(effect = id, "already active"),
            EnableOutcome::Incompatible => warn!(effect = id, "incompatible, skipped"),
            EnableOutcome::Conflict(other) => {
                warn!(effect = id, conflicts_with = other, "conflict, skipped")
            }
            EnableOutcome::Failed(err) => warn!(effect = id, error = %err, "apply failed"),
        }
    }

    if session.active_ids().is_empty() {
        bail!("no effect could be enabled");
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.effects.tick_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !session.process().is_alive() {
                    warn!("target process exited");
                    break;
                }
                session.tick();
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted, reverting effects");
                break;
            }
        }
    }

    let report = session.detach();
    for (id, err) in &report.failed {
        error!(effect = id, error = %err, "could not revert");
    }
    info!(reverted = report.reverted.len(), "done");
    Ok(())
}

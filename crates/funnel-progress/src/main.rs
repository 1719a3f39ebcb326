//! `funnelctl` - CLI for funnel-progress
//!
//! This binary inspects and edits the recorded funnel progress and watches
//! the shared storage for changes made by other processes.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};

use funnel_progress::cli::{Cli, Command, ConfigCommand, ResetCommand, SetCommand, WatchCommand};
use funnel_progress::config::StorageBackend;
use funnel_progress::funnel::FunnelStep;
use funnel_progress::{
    init_logging, storage, Config, FunnelField, FunnelState, FunnelStore, LocalBus,
    StorageWatcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Show(show_cmd) => handle_show(&open_store(&config)?, show_cmd.json),
        Command::Set(set_cmd) => handle_set(&open_store(&config)?, set_cmd),
        Command::Reset(reset_cmd) => handle_reset(&open_store(&config)?, &reset_cmd),
        Command::Watch(watch_cmd) => handle_watch(&config, open_store(&config)?, watch_cmd).await,
        Command::Steps => {
            handle_steps(&open_store(&config)?);
            Ok(())
        }
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn open_store(config: &Config) -> anyhow::Result<FunnelStore> {
    let backend = storage::open(config).context("failed to open storage")?;
    let store = FunnelStore::from_config(config, backend, Arc::new(LocalBus::new()));
    debug!("Using {:?}", store);
    Ok(store)
}

fn print_state(state: &FunnelState) {
    for field in FunnelField::ALL {
        println!("  {:<14} {}", format!("{field}:"), state.get(field).unwrap_or("-"));
    }
}

fn handle_show(store: &FunnelStore, json: bool) -> anyhow::Result<()> {
    let state = store.read();
    if json {
        println!("{}", serde_json::to_string_pretty(&*state)?);
    } else {
        println!("Funnel progress ({})", store.key());
        println!("----------------");
        print_state(&state);
    }
    Ok(())
}

fn handle_set(store: &FunnelStore, cmd: SetCommand) -> anyhow::Result<()> {
    let field = FunnelField::from(cmd.field);
    store
        .set(field, cmd.id)
        .with_context(|| format!("failed to record {field}"))?;
    println!("Recorded {field}.");
    Ok(())
}

fn handle_reset(store: &FunnelStore, cmd: &ResetCommand) -> anyhow::Result<()> {
    if !cmd.yes {
        if cmd.all {
            println!("This will delete every key in the funnel storage.");
        } else {
            println!("This will delete all recorded funnel progress.");
        }
        println!("Use --yes to confirm.");
        return Ok(());
    }
    if cmd.all {
        store.clear_storage().context("failed to clear storage")?;
        println!("Storage cleared.");
    } else {
        store.reset().context("failed to reset funnel progress")?;
        println!("Funnel progress cleared.");
    }
    Ok(())
}

async fn handle_watch(
    config: &Config,
    store: FunnelStore,
    cmd: WatchCommand,
) -> anyhow::Result<()> {
    if config.storage.backend == StorageBackend::Memory {
        warn!("Memory storage is private to this process; no external changes will be seen");
    }

    let listener_store = store.clone();
    let json = cmd.json;
    let subscription = store.subscribe(move || {
        let state = listener_store.read();
        if json {
            match serde_json::to_string(&*state) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode state: {e}"),
            }
        } else {
            println!("Funnel progress changed:");
            print_state(&state);
        }
    });

    let watcher = match cmd.interval {
        Some(ms) => StorageWatcher::new(store, Duration::from_millis(ms.max(1))),
        None => StorageWatcher::from_config(store, config),
    };
    println!("Watching for changes every {:?}. Press Ctrl-C to stop.", watcher.interval());
    let (handle, task) = watcher.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    handle.stop();
    let changes = task.await.context("watcher task failed")?;
    subscription.unsubscribe();

    println!("Stopped after {changes} change(s).");
    Ok(())
}

fn handle_steps(store: &FunnelStore) {
    let state = store.read();
    let furthest = FunnelStep::furthest_recorded(&state);

    println!("Funnel steps");
    println!("------------");
    for step in FunnelStep::ALL {
        let recorded = match step.produces() {
            Some(field) if state.get(field).is_some() => "recorded",
            Some(_) => "pending",
            None => "",
        };
        let produces = step
            .produces()
            .map_or_else(|| "-".to_string(), |field| field.to_string());
        let marker = if Some(step) == furthest { ">" } else { " " };
        println!("{marker} {:<20} {:<14} {recorded}", step.path(), produces);
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Backend:            {}", config.storage.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Key:                {}", config.storage.key);
                println!("  Quota (bytes):      {}", config.storage.quota_bytes);
                println!();
                println!("[Watch]");
                println!("  Poll interval (ms): {}", config.watch.poll_interval_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

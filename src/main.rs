use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jotty_hub::app::{Integration, validate_config};
use jotty_hub::config::Config;
use jotty_hub::logging;
use jotty_hub::tree::{flatten_items, resolve_path};
use jotty_hub::views::{EntityEvent, task_statuses};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "jotty-hub", version, about = "Jotty notes and lists for your hub")]
struct Cli {
    /// Config file (defaults to JOTTY_HUB_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the URL and API key
    Check,
    /// Poll Jotty until interrupted, logging entity and sensor changes
    Run,
    /// Fetch once and print every sensor and entity view as JSON
    Sensors,
    /// Invoke one action, e.g. `call check_item --data '{"checklist_id":"a","item_index":"0.1"}'`
    Call {
        action: String,
        #[arg(long)]
        data: Option<String>,
    },
    /// Show a task's items with their index paths
    Task {
        id: String,
        /// Only show the item at this index path
        #[arg(long)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    logging::init(&config.logging.level);

    match cli.command {
        Command::Check => check(&config).await,
        Command::Run => run(config).await,
        Command::Sensors => sensors(config).await,
        Command::Call { action, data } => call(config, &action, data.as_deref()).await,
        Command::Task { id, path } => task(config, &id, path.as_deref()).await,
    }
}

async fn check(config: &Config) -> Result<()> {
    let title = validate_config(config)
        .await
        .with_context(|| format!("validating {}", config.connection.url))?;
    println!("{title}");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let mut integration = Integration::setup(config)
        .await
        .context("setting up Jotty integration")?;
    let mut updates = integration.subscribe();
    report(&mut integration);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                report(&mut integration);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    integration.shutdown().await;
    Ok(())
}

fn report(integration: &mut Integration) {
    for event in integration.sync_entities() {
        match event {
            EntityEvent::Created(view) => {
                info!(tracking_id = %view.key.tracking_id(), title = %view.title, "entity created")
            }
            EntityEvent::Unavailable(key) => {
                info!(tracking_id = %key.tracking_id(), "entity unavailable")
            }
            EntityEvent::Available(key) => {
                info!(tracking_id = %key.tracking_id(), "entity available again")
            }
        }
    }
    for sensor in integration.sensors() {
        info!(
            sensor = %sensor.entity_id,
            state = %sensor.state,
            available = sensor.available,
            "sensor"
        );
    }
}

async fn sensors(config: Config) -> Result<()> {
    let mut integration = Integration::setup(config)
        .await
        .context("setting up Jotty integration")?;
    integration.sync_entities();
    let output = json!({
        "sensors": integration.sensors(),
        "entities": integration.entity_views(),
    });
    integration.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn call(config: Config, action: &str, data: Option<&str>) -> Result<()> {
    let params: Value = match data {
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object")?,
        None => Value::Null,
    };
    let integration = Integration::setup(config)
        .await
        .context("setting up Jotty integration")?;
    let result = integration.dispatcher().call(action, params).await;
    integration.shutdown().await;

    let outcome = result?;
    println!("{}", serde_json::to_string_pretty(&outcome.to_value())?);
    Ok(())
}

async fn task(config: Config, id: &str, path: Option<&str>) -> Result<()> {
    let integration = Integration::setup(config)
        .await
        .context("setting up Jotty integration")?;
    let fetched = integration.client().get_task(id).await;
    integration.shutdown().await;
    let task = fetched.with_context(|| format!("fetching task {id}"))?;

    if let Some(path) = path {
        let Some(item) = resolve_path(&task.items, path) else {
            bail!("no item at {path} in task {id}");
        };
        println!("{}", serde_json::to_string_pretty(item)?);
        return Ok(());
    }

    let statuses = task_statuses(&task);
    println!("{} ({})", task.title, task.id);
    for flat in flatten_items(&task.items) {
        let status = flat.item.status.as_deref().unwrap_or("todo");
        let label = statuses
            .iter()
            .find(|s| s.id == status)
            .map(|s| s.label.as_str())
            .unwrap_or(status);
        println!(
            "{}{:<8} [{}] {}",
            "  ".repeat(flat.depth),
            flat.path,
            label,
            flat.item.text
        );
    }
    Ok(())
}

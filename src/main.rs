// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use tessera::config::{EngineConfig, Settings};
use tessera::decisions::{DecisionOutcome, DecisionStore};
use tessera::engine::Engine;
use tessera::engine::registry::FnRegistry;
use tessera::engine::situation::RawData;
use tessera::goals::{CreateGoalInput, GoalStatus, GoalStore, UpdateGoalInput};
use tessera::memory::{
    CreateMemoryInput, LifecycleConfig, MemoryCategory, MemoryStore, spawn_decay_scheduler,
};
use tessera::service::ContextService;
use tessera::storage::{self, ManifestStore};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Deterministic context assembly engine", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML); required for assemble
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL override (defaults to the data directory)
    #[arg(long, global = true, env = "TESSERA_DATABASE_URL")]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble context for an entity and print text + manifest
    Assemble {
        #[arg(long)]
        entity: String,
        #[arg(long, default_value = "default")]
        mode: String,
        /// JSON file holding the raw per-category data map
        #[arg(long)]
        data: PathBuf,
        /// Also record a decision with this recommendation text
        #[arg(long)]
        recommendation: Option<String>,
    },
    /// Goal management
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Memory management
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Decay operations
    #[command(subcommand)]
    Decay(DecayCommand),
    /// Read the latest manifest for an entity
    Manifest {
        #[arg(long)]
        entity: String,
    },
    /// Attach an outcome to a recorded decision
    Outcome {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = false)]
        followed: bool,
        #[arg(long)]
        feedback: Option<String>,
        #[arg(long)]
        score: Option<f64>,
    },
}

#[derive(Subcommand)]
enum GoalCommand {
    Create {
        #[arg(long)]
        entity: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Priority adjustments as block_key=delta pairs
        #[arg(long = "adjust", value_parser = parse_adjustment)]
        adjustments: Vec<(String, f64)>,
    },
    List {
        #[arg(long)]
        entity: String,
        /// Include completed/abandoned goals
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Update {
        #[arg(long)]
        id: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<GoalStatus>,
        #[arg(long)]
        progress: Option<f64>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    Create {
        #[arg(long)]
        entity: String,
        #[arg(long, value_parser = parse_category)]
        category: MemoryCategory,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        detail: Option<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    List {
        #[arg(long)]
        entity: String,
        /// Include archived/revised memories
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Reinforce {
        #[arg(long)]
        id: String,
    },
    Revise {
        #[arg(long)]
        id: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        detail: Option<String>,
    },
}

#[derive(Subcommand)]
enum DecayCommand {
    /// Run a single decay pass and print the report
    Run {
        /// Reinforcement grace window in seconds
        #[arg(long, default_value_t = 3600)]
        grace_secs: i64,
    },
    /// Keep running decay passes on the configured interval
    Watch,
}

fn parse_adjustment(raw: &str) -> Result<(String, f64), String> {
    let (key, delta) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected block_key=delta, got {raw}"))?;
    let delta: f64 = delta
        .parse()
        .map_err(|_| format!("invalid delta in {raw}"))?;
    Ok((key.to_string(), delta))
}

fn parse_status(raw: &str) -> Result<GoalStatus, String> {
    raw.parse()
}

fn parse_category(raw: &str) -> Result<MemoryCategory, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging before any async code runs
    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt().init();
    }

    let mut settings = Settings::from_env();
    if let Some(url) = &cli.database_url {
        settings.database_url = url.clone();
    }

    let pool = storage::connect(&settings.database_url, settings.max_connections).await?;
    storage::run_migrations(&pool).await?;

    // Lifecycle thresholds follow the engine config when one is given;
    // management commands fall back to the defaults.
    let config = cli
        .config
        .as_ref()
        .map(|path| EngineConfig::from_toml_file(path))
        .transpose()?;
    let lifecycle = config
        .as_ref()
        .map(|c| c.lifecycle)
        .unwrap_or_else(LifecycleConfig::default);

    match cli.command {
        Command::Assemble {
            entity,
            mode,
            data,
            recommendation,
        } => {
            let config = config.ok_or_else(|| {
                anyhow::anyhow!("no engine config: pass --config or set TESSERA_CONFIG")
            })?;
            let registry = FnRegistry::with_builtins();
            let engine = Engine::new(config, &registry)?;
            let service = ContextService::new(Arc::new(engine), pool, lifecycle);

            let raw: RawData = serde_json::from_str(&std::fs::read_to_string(&data)?)
                .map_err(|e| anyhow::anyhow!("raw data must be a JSON object: {e}"))?;
            let output = service.assemble(&entity, &mode, &raw).await?;
            if let Some(err) = &output.persist_error {
                eprintln!("warning: manifest not persisted: {err}");
            }
            if let Some(recommendation) = recommendation {
                let decision_id = service.record_decision(&output, recommendation).await?;
                info!(decision_id = %decision_id, "recorded decision");
            }
            println!("{}", output.text);
            println!("---");
            println!("{}", serde_json::to_string_pretty(&output.manifest)?);
        }
        Command::Goal(command) => run_goal(GoalStore::new(pool), command).await?,
        Command::Memory(command) => {
            run_memory(MemoryStore::new(pool, lifecycle), command).await?
        }
        Command::Decay(command) => {
            let store = MemoryStore::new(pool, lifecycle);
            match command {
                DecayCommand::Run { grace_secs } => {
                    let report = store
                        .run_decay_cycle(chrono::Duration::seconds(grace_secs))
                        .await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                DecayCommand::Watch => {
                    let interval = std::time::Duration::from_secs(settings.decay_interval_secs);
                    info!(
                        interval_secs = settings.decay_interval_secs,
                        "decay scheduler started"
                    );
                    spawn_decay_scheduler(Arc::new(store), interval).await?;
                }
            }
        }
        Command::Manifest { entity } => {
            match ManifestStore::new(pool).latest(&entity).await? {
                Some(stored) => println!("{}", serde_json::to_string_pretty(&stored)?),
                None => eprintln!("no manifest recorded for {entity}"),
            }
        }
        Command::Outcome {
            id,
            followed,
            feedback,
            score,
        } => {
            let record = DecisionStore::new(pool)
                .attach_outcome(
                    &id,
                    DecisionOutcome {
                        followed,
                        result: Default::default(),
                        feedback,
                        feedback_score: score,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}

async fn run_goal(store: GoalStore, command: GoalCommand) -> anyhow::Result<()> {
    match command {
        GoalCommand::Create {
            entity,
            name,
            description,
            adjustments,
        } => {
            let goal = store
                .create(CreateGoalInput {
                    entity_id: entity,
                    name,
                    description,
                    priority_adjustments: adjustments.into_iter().collect(),
                    target_date: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&goal)?);
        }
        GoalCommand::List { entity, all } => {
            let goals = store.list_by_entity(&entity, all).await?;
            println!("{}", serde_json::to_string_pretty(&goals)?);
        }
        GoalCommand::Update {
            id,
            status,
            progress,
            name,
        } => {
            let goal = store
                .update(UpdateGoalInput {
                    goal_id: id,
                    name,
                    status,
                    progress,
                    ..Default::default()
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&goal)?);
        }
    }
    Ok(())
}

async fn run_memory(store: MemoryStore, command: MemoryCommand) -> anyhow::Result<()> {
    match command {
        MemoryCommand::Create {
            entity,
            category,
            summary,
            detail,
            tags,
        } => {
            let memory = store
                .create(CreateMemoryInput {
                    entity_id: entity,
                    category,
                    summary,
                    detail,
                    tags,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }
        MemoryCommand::List { entity, all } => {
            let memories = store.list_by_entity(&entity, all).await?;
            println!("{}", serde_json::to_string_pretty(&memories)?);
        }
        MemoryCommand::Reinforce { id } => {
            let memory = store.reinforce(&id).await?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }
        MemoryCommand::Revise {
            id,
            summary,
            detail,
        } => {
            let (old, replacement) = store
                .revise(&id, &summary, detail.as_deref().unwrap_or(""))
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "revised": old,
                    "replacement": replacement,
                }))?
            );
        }
    }
    Ok(())
}

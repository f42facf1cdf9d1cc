//! task-rollover
//!
//! Serves the rollover trigger and presentation API, or runs a single
//! operation from the command line.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use task_rollover::cli::import::ImportArgs;
use task_rollover::cli::rollover::{GenerateArgs, RolloverArgs};
use task_rollover::cli::tree::{TreeArgs, render_forest};
use task_rollover::cli::{Cli, Command, ServeArgs};
use task_rollover::config::{Config, ConfigLoader};
use task_rollover::db::Database;
use task_rollover::db::fixture::Fixture;
use task_rollover::logging::{self, LogTarget};
use task_rollover::notify::LogNotifier;
use task_rollover::rollover::{RolloverEngine, RolloverSettings};
use task_rollover::schedule::generate_for_template;
use task_rollover::server::{AppState, start_server};
use task_rollover::tree::assemble_forest;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    // SAFETY: set before any other thread is spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("TASK_ROLLOVER_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    for source in loader.sources() {
        info!("Config: {}", source.display());
    }
    debug!(tiers = ?loader.tiers(), "Config tiers applied");

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    let config = loader.into_config();

    match cli.command {
        Some(Command::Serve(args)) => run_server(config, args).await?,
        None => run_server(config, ServeArgs::default()).await?,
        Some(Command::Rollover(args)) => run_rollover(&config, args).await?,
        Some(Command::Generate(args)) => run_generate(&config, args)?,
        Some(Command::Tree(args)) => run_tree(&config, args)?,
        Some(Command::Import(args)) => run_import(&config, args)?,
    }

    Ok(())
}

fn open_database(config: &Config) -> Result<Arc<Database>> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)
        .with_context(|| format!("failed to open {}", config.server.db_path.display()))?;
    Ok(Arc::new(db))
}

fn build_engine(config: &Config, db: Arc<Database>) -> Result<RolloverEngine> {
    let settings = RolloverSettings::from_config(&config.rollover)?;
    Ok(RolloverEngine::new(db, Arc::new(LogNotifier), settings))
}

async fn run_server(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Starting task-rollover v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {:?}", config.server.db_path);
    info!("Default timezone: {}", config.rollover.default_timezone);

    let db = open_database(&config)?;
    let engine = Arc::new(build_engine(&config, db.clone())?);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let (shutdown_tx, _addr) = start_server(AppState::new(db, engine), addr).await?;

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(());
    Ok(())
}

async fn run_rollover(config: &Config, args: RolloverArgs) -> Result<()> {
    let db = open_database(config)?;
    let engine = build_engine(config, db)?;
    let now = Utc::now();

    let output = match args.user {
        Some(user_id) => serde_json::to_string_pretty(&engine.run_user(&user_id, now, args.date).await?)?,
        None => serde_json::to_string_pretty(&engine.run_all(now, args.date).await?)?,
    };
    println!("{}", output);
    Ok(())
}

fn run_generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let db = open_database(config)?;
    let outcome = generate_for_template(&*db, &args.client, &args.template, args.month)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_tree(config: &Config, args: TreeArgs) -> Result<()> {
    let db = open_database(config)?;
    let tasks = db.list_tasks(&args.user, args.board)?;
    print!("{}", render_forest(&assemble_forest(tasks)));
    Ok(())
}

fn run_import(config: &Config, args: ImportArgs) -> Result<()> {
    let fixture = Fixture::from_file(&args.file)?;

    if args.dry_run {
        println!("Dry run, would import:");
        for (section, count) in fixture.counts() {
            println!("  {}: {}", section, count);
        }
        return Ok(());
    }

    let db = open_database(config)?;
    let report = db.import_fixture(&fixture)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

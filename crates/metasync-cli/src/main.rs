use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metasync_catalog::{PostgresCatalog, SchemaIntrospector};
use metasync_core::{
    ChangeKind, Config, DriftState, EntityModel, EntityOutcome, EntityRegistry, EntityStatus,
    ReconcileReport, SchemaDiff, StatusReport,
};
use metasync_engine::Reconciler;

mod registry;

use registry::JsonFileRegistry;

/// metasync - keep a PostgreSQL schema in step with declared entities
#[derive(Parser)]
#[command(name = "metasync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: metasync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the JSON entity model (overrides the config)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every declared entity against the database
    Reconcile {
        /// Output file for the reconcile report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show pending changes without touching the database
    Status {
        /// Only inspect this entity
        entity: Option<String>,

        /// Output file for the status report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the full pipeline for a single entity
    ApplySafe {
        /// Entity name as declared in the model
        entity: String,
    },

    /// Drop every declared table (development profiles only)
    DropAll {
        /// Confirm the drop
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref(), cli.verbose)?;
    config.apply_env_overrides()?;

    if let Some(model) = &cli.model {
        config.reconcile.model = model.clone();
    }

    if cli.verbose {
        eprintln!("{} profile: {}", "Using".cyan(), config.reconcile.profile);
    }

    let registry = JsonFileRegistry::load(&config.model_path())
        .context("Failed to load the entity model")?;
    if cli.verbose {
        eprintln!("{} {}", "Loaded model from:".cyan(), registry.path().display());
    }

    let reconciler = connect(&config, cli.verbose).await?;

    match cli.command {
        Commands::Reconcile { output } => {
            reconcile_command(&reconciler, &registry, output.as_deref(), cli.verbose).await
        }
        Commands::Status { entity, output } => {
            status_command(&reconciler, &registry, entity.as_deref(), output.as_deref()).await
        }
        Commands::ApplySafe { entity } => {
            apply_safe_command(&reconciler, &registry, &entity).await
        }
        Commands::DropAll { yes } => drop_all_command(&reconciler, &registry, yes).await,
    }
}

/// Log to stderr; `RUST_LOG` wins over the default level
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = if let Some(config_path) = path {
        Config::from_file(config_path)?
    } else if Path::new("metasync.toml").exists() {
        Config::from_file(Path::new("metasync.toml"))?
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };
    Ok(config)
}

async fn connect(config: &Config, verbose: bool) -> Result<Reconciler> {
    if verbose {
        eprintln!("{} schema {}...", "Connecting to".cyan(), config.database.schema);
    }

    let catalog = PostgresCatalog::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    catalog
        .test_connection()
        .await
        .context("Connection test failed")?;

    if verbose {
        eprintln!(
            "{} {}:{}/{}",
            "Connected to".green(),
            catalog.host(),
            catalog.port(),
            catalog.database()
        );
    }

    Ok(Reconciler::from_config(Arc::new(catalog), &config.reconcile))
}

/// Reconcile command - apply safe changes to every entity
async fn reconcile_command(
    reconciler: &Reconciler,
    registry: &JsonFileRegistry,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let model = registry.get_all_entities();
    if verbose {
        eprintln!("{} {} entities...", "Reconciling".cyan(), model.len());
    }

    let report = reconciler.reconcile_all(&model).await;

    if let Some(path) = output {
        report.save_to_file(path)?;
        if verbose {
            eprintln!("{} {}", "Report saved to:".green(), path.display());
        }
    }

    print_reconcile_report(&report);

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

/// Status command - read-only drift inspection
async fn status_command(
    reconciler: &Reconciler,
    registry: &JsonFileRegistry,
    entity: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let model = registry.get_all_entities();
    let report = match entity {
        Some(name) => single_entity_status(reconciler, &model, name).await?,
        None => reconciler.status_all(&model).await?,
    };

    if let Some(path) = output {
        std::fs::write(path, report.to_json()?)?;
    }

    print_status_report(&report);
    Ok(())
}

async fn single_entity_status(
    reconciler: &Reconciler,
    model: &EntityModel,
    name: &str,
) -> Result<StatusReport> {
    let diff = reconciler.status_for(model, name).await?;
    let exists = match model.get(name) {
        Some(entity) => reconciler.catalog().table_exists(&entity.table).await?,
        None => false,
    };

    let mut report = StatusReport::new();
    report.insert(name, EntityStatus::new(exists, diff));
    Ok(report)
}

/// Apply-safe command - full pipeline for one entity
async fn apply_safe_command(
    reconciler: &Reconciler,
    registry: &JsonFileRegistry,
    entity: &str,
) -> Result<()> {
    let model = registry.get_all_entities();
    let outcome = reconciler
        .apply_safe(&model, entity)
        .await
        .with_context(|| format!("Failed to reconcile '{}'", entity))?;

    println!("{} {}", entity.bold(), format_outcome(&outcome));
    Ok(())
}

/// Drop-all command - development reset
async fn drop_all_command(
    reconciler: &Reconciler,
    registry: &JsonFileRegistry,
    yes: bool,
) -> Result<()> {
    if !yes {
        return Err(anyhow::anyhow!(
            "drop-all removes every declared table and its data. Re-run with --yes to confirm."
        ));
    }

    let model = registry.get_all_entities();
    let dropped = reconciler.drop_all(&model).await?;

    println!("{}", format!("Dropped {} tables", dropped.len()).red().bold());
    for table in &dropped {
        println!("  - {}", table);
    }
    Ok(())
}

fn format_outcome(outcome: &EntityOutcome) -> String {
    match outcome {
        EntityOutcome::Created => "created".green().to_string(),
        EntityOutcome::Updated {
            applied,
            skipped_risky,
        } => {
            let mut text = format!("updated ({} applied", applied).cyan().to_string();
            if *skipped_risky > 0 {
                text.push_str(&format!(", {} risky skipped", skipped_risky).yellow().to_string());
            }
            text.push_str(&")".cyan().to_string());
            text
        }
        EntityOutcome::Unchanged => "unchanged".dimmed().to_string(),
        EntityOutcome::Failed { error } => format!("{} {}", "FAILED".red().bold(), error),
    }
}

/// Print reconcile report to stdout
fn print_reconcile_report(report: &ReconcileReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Schema Reconciliation Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Entities:  {}", report.summary.total);
    println!("  Created:   {}", report.summary.created);
    println!("  Updated:   {}", report.summary.updated);
    println!("  Unchanged: {}", report.summary.unchanged);

    if report.summary.failed > 0 {
        println!("  Failed:    {}", report.summary.failed.to_string().red().bold());
    } else {
        println!("  Failed:    {}", report.summary.failed.to_string().green());
    }

    if report.summary.pending_risky > 0 {
        println!(
            "  Risky changes awaiting review: {}",
            report.summary.pending_risky.to_string().yellow()
        );
    }
    println!();

    println!("{}", "Entities:".bold());
    for (name, outcome) in &report.entities {
        println!("  {} {}", name, format_outcome(outcome));
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Print status report to stdout
fn print_status_report(report: &StatusReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Schema Drift Status".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    for (name, status) in &report.entities {
        let state = match status.state {
            DriftState::NotReconciled => "NOT RECONCILED".yellow().bold(),
            DriftState::Clean => "CLEAN".green(),
            DriftState::Drifted => "DRIFTED".red().bold(),
        };
        println!("  [{}] {} ({})", state, name, status.table);

        if status.state == DriftState::Drifted {
            println!(
                "    {} changes: {} safe, {} risky",
                status.summary.total, status.summary.safe, status.summary.risky
            );
            print_changes(&status.diff);
        }
    }

    println!();
    if report.pending_changes() == 0 {
        println!("{}", "✓ No drift detected!".green().bold());
    } else {
        let review = report.entities_needing_review();
        if !review.is_empty() {
            println!(
                "{} {}",
                "⚠ Manual review required for:".yellow().bold(),
                review.join(", ")
            );
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

fn print_changes(diff: &SchemaDiff) {
    for change in &diff.changes {
        let kind = match change.kind {
            ChangeKind::Add => "ADD".green(),
            ChangeKind::AlterType => "TYPE".cyan(),
            ChangeKind::AlterNullable => "NULL".cyan(),
        };
        let marker = if change.risky { "RISKY".red().bold().to_string() } else { String::new() };

        println!("      {} {} {}", kind, change.column, marker);
        println!("        {}", change.sql.dimmed());
        if let Some(risk) = &change.risk_description {
            println!("        {}", risk.yellow());
        }
    }
}

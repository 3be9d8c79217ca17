//! schema-clone CLI - foreign-key aware table cloning and backup.

use clap::{Parser, Subcommand};
use schema_clone::drivers;
use schema_clone::{
    CloneError, CloneOrchestrator, Config, ConnectionConfig, CyclePolicy, DependencyDirection,
    DependencyResolver, MetadataProvider, TableIdentity,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "schema-clone")]
#[command(about = "Foreign-key aware table cloning and backup")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone tables and everything they reference to the target
    Clone {
        /// Override source schema
        #[arg(long)]
        source_schema: Option<String>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Root table to clone (repeatable); replaces the configured list
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Add every table the roots reference through foreign keys
        #[arg(long)]
        expand: bool,

        /// Create missing target schemas
        #[arg(long)]
        create_schemas: bool,

        /// Leave tables outside the source schema alone on same-connection clones
        #[arg(long)]
        skip_shared: bool,

        /// Dry run: resolve and show the plan without changing the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the foreign key dependencies of a table
    Deps {
        /// Table to start from (schema.table or table)
        #[arg(long)]
        table: String,

        /// Direction to follow: ascending, descending or both
        #[arg(long, default_value = "ascending")]
        direction: String,

        /// Stay inside the table's schema
        #[arg(long)]
        scoped: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CloneError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Clone {
            source_schema,
            target_schema,
            tables,
            expand,
            create_schemas,
            skip_shared,
            dry_run,
        } => {
            // Apply overrides
            if let Some(schema) = source_schema {
                config.clone.source_schema = Some(schema);
            }
            if let Some(schema) = target_schema {
                config.clone.target_schema = Some(schema);
            }
            if !tables.is_empty() {
                config.clone.tables = tables;
            }
            config.clone.expand_foreign_keys |= expand;
            config.clone.create_missing_schemas |= create_schemas;
            config.clone.skip_shared_tables |= skip_shared;
            config.validate()?;

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler()?;

            let orchestrator = CloneOrchestrator::connect(&config).await?;
            let outcome = if dry_run {
                run_plan(&orchestrator, &config, cli.output_json).await
            } else {
                run_clone(&orchestrator, &config, &cancel_token, cli.output_json).await
            };
            orchestrator.close().await;
            outcome?;
        }

        Commands::Deps {
            table,
            direction,
            scoped,
        } => {
            let direction: DependencyDirection = direction.parse()?;
            let connection = drivers::connect(&config.source).await?;
            let provider = connection.provider.as_ref();

            let default_schema = config
                .clone
                .source_schema
                .clone()
                .unwrap_or_else(|| provider.default_schema().to_string());
            let start = TableIdentity::parse(&table, Some(&default_schema))?;

            let result = DependencyResolver::new(provider)
                .resolve_referenced(&start, direction, scoped)
                .await;
            connection.close().await;
            let graph = result?;

            let order = graph.topological_order(CyclePolicy::Lenient)?;

            if cli.output_json {
                let tables: Vec<_> = graph
                    .iter()
                    .map(|(table, deps)| {
                        json!({
                            "table": table.to_string(),
                            "dependencies": deps.iter().map(ToString::to_string).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                let output = json!({
                    "root": start.to_string(),
                    "direction": format!("{:?}", direction).to_lowercase(),
                    "tables": tables,
                    "order": order.iter().map(ToString::to_string).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Dependencies of {} ({:?}):", start, direction);
                for (table, deps) in graph.iter() {
                    if deps.is_empty() {
                        println!("  {}", table);
                    } else {
                        let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
                        println!("  {} -> {}", table, deps.join(", "));
                    }
                }
                println!("\nOrder:");
                for (i, table) in order.iter().enumerate() {
                    println!("  {}. {}", i + 1, table);
                }
            }
        }

        Commands::HealthCheck => {
            let mut results = vec![check_connection("source", &config.source).await];
            if let Some(target) = &config.target {
                results.push(check_connection("target", target).await);
            }
            let healthy = results.iter().all(|r| r.error.is_none());

            if cli.output_json {
                let checks: Vec<_> = results
                    .iter()
                    .map(|r| {
                        json!({
                            "side": r.side,
                            "connection": r.connection,
                            "connected": r.error.is_none(),
                            "latency_ms": r.latency_ms,
                            "error": r.error,
                        })
                    })
                    .collect();
                let output = json!({ "healthy": healthy, "connections": checks });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Health Check Results:");
                for r in &results {
                    println!(
                        "  {} ({}): {} ({}ms)",
                        r.side,
                        r.connection,
                        if r.error.is_none() { "OK" } else { "FAILED" },
                        r.latency_ms
                    );
                    if let Some(ref err) = r.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Err(CloneError::backend("Health check failed"));
            }
        }
    }

    Ok(())
}

async fn run_plan(
    orchestrator: &CloneOrchestrator,
    config: &Config,
    output_json: bool,
) -> Result<(), CloneError> {
    let plan = orchestrator.plan(&config.clone).await?;

    if output_json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    println!("\nDry run completed!");
    println!("  Drop order:");
    for table in plan.drop_order() {
        println!("    {}", table);
    }
    println!("  Copy order:");
    for table in &plan.tables {
        let note = if table.shared { " (shared, skipped if present)" } else { "" };
        println!("    {} -> {}{}", table.source, table.target, note);
    }
    if !plan.schemas_to_create.is_empty() {
        println!("  Schemas to create: {}", plan.schemas_to_create.join(", "));
    }
    Ok(())
}

async fn run_clone(
    orchestrator: &CloneOrchestrator,
    config: &Config,
    cancel_token: &CancellationToken,
    output_json: bool,
) -> Result<(), CloneError> {
    let result = orchestrator.clone_tables(&config.clone, cancel_token).await?;

    if output_json {
        println!("{}", result.to_json()?);
    } else {
        println!("\nClone completed!");
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!("  Tables copied: {}", result.tables_copied());
        if result.tables_skipped() > 0 {
            println!("  Tables skipped: {}", result.tables_skipped());
        }
        println!("  Rows: {}", result.rows_copied);
        if !result.schemas_created.is_empty() {
            println!("  Schemas created: {}", result.schemas_created.join(", "));
        }
    }
    Ok(())
}

struct HealthStatus {
    side: &'static str,
    connection: String,
    latency_ms: u64,
    error: Option<String>,
}

async fn check_connection(side: &'static str, config: &ConnectionConfig) -> HealthStatus {
    let start = Instant::now();
    let outcome: Result<Vec<String>, CloneError> = async {
        let connection = drivers::connect(config).await?;
        let schemas = connection.provider.list_schemas().await;
        connection.close().await;
        schemas
    }
    .await;

    let error = match outcome {
        Ok(schemas) => {
            info!("{} connected, {} schemas visible", side, schemas.len());
            None
        }
        Err(e) => {
            warn!("{} connection failed: {}", side, e);
            Some(e.to_string())
        }
    };

    HealthStatus {
        side,
        connection: config.connection_id(),
        latency_ms: start.elapsed().as_millis() as u64,
        error,
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the --output-json document
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, CloneError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping after the current step...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, CloneError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current step...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}

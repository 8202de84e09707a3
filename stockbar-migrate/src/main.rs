//! stockbar Migration CLI Tool
//!
//! Command-line interface over `stockbar::migration::Migrator`. `plan`, `verify` and
//! `partition` work offline; every other command connects to the database.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use colored::Colorize;
use stockbar::migration::{Direction, Migration, Migrator, PlannedMigration};
use stockbar::schema::{Cadence, PartitionBounds, PartitionGranularity};
use stockbar::{connect, migrations, MayPostgresExecutor, MigrationConfig};
use std::process;

#[derive(Parser)]
#[command(name = "stockbar-migrate")]
#[command(about = "Migration management tool for the stockbar price-bar schema")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL (overrides config and environment)
    #[arg(long)]
    database_url: Option<String>,

    /// Schema holding the bar tables and the state table
    #[arg(long)]
    schema: Option<String>,

    /// Run statements in autocommit instead of one transaction per migration
    #[arg(long)]
    no_transaction: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status (applied vs pending)
    Status,

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Dry run - print the statements without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Rollback migrations
    Down {
        /// Number of migrations to rollback (default: 1)
        #[arg(long, default_value = "1")]
        steps: usize,

        /// Dry run - print the statements without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate checksums of applied migrations
    Validate,

    /// Show detailed migration information
    Info {
        /// Show information for a specific migration version
        #[arg(long)]
        version: Option<i64>,
    },

    /// Print every migration's statements without a database
    Plan {
        /// Print backward statements, newest migration first
        #[arg(long)]
        down: bool,
    },

    /// Check that every migration's backward action exactly undoes its forward action
    Verify,

    /// Print the statement attaching the partition that holds a timestamp
    Partition {
        /// Bar cadence: 1m, 1h or 1d
        #[arg(long)]
        cadence: Cadence,

        /// Timestamp, e.g. 2024-01-01T09:30:00 or 2024-01-01
        #[arg(long)]
        at: String,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let quiet = cli.quiet;
    match run(cli) {
        Ok(()) => {
            if !quiet {
                println!("{}", "✅ Success".green());
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = MigrationConfig::load().context("Failed to load configuration")?;
    if let Some(url) = cli
        .database_url
        .or_else(|| std::env::var("STOCKBAR_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        config.database_url = url;
    }
    if let Some(schema) = cli.schema {
        config.schema = schema;
    }
    if cli.no_transaction {
        config.transactional = false;
    }

    let migrator = Migrator::from_config(migrations::registry()?, &config);

    match cli.command {
        Commands::Status => handle_status(&migrator, &open(&config)?),
        Commands::Up { steps, dry_run } => handle_up(&migrator, &open(&config)?, steps, dry_run),
        Commands::Down { steps, dry_run } => handle_down(&migrator, &open(&config)?, steps, dry_run),
        Commands::Validate => handle_validate(&migrator, &open(&config)?),
        Commands::Info { version } => handle_info(&migrator, &open(&config)?, version),
        Commands::Plan { down } => handle_plan(&migrator, down),
        Commands::Verify => handle_verify(&migrator),
        Commands::Partition { cadence, at } => handle_partition(&migrator, cadence, &at),
    }
}

fn open(config: &MigrationConfig) -> Result<MayPostgresExecutor> {
    let client = connect(&config.database_url).context("Error connecting to database")?;
    Ok(MayPostgresExecutor::new(client))
}

fn handle_status(migrator: &Migrator, executor: &MayPostgresExecutor) -> Result<()> {
    let status = migrator.status(executor)?;

    println!("\n📊 Migration Status\n");

    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied.len());
        for record in &status.applied {
            let time_str = record
                .execution_time_ms
                .map_or_else(|| "N/A".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  ✓ m{}_{} ({}, {})",
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time_str
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending.len());
        for pending in &status.pending {
            println!("  ⏳ m{}_{} {}", pending.version, pending.name, "(pending)".yellow());
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied.len(),
        status.pending.len()
    );
    Ok(())
}

fn handle_up(
    migrator: &Migrator,
    executor: &MayPostgresExecutor,
    steps: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        let plan = migrator.plan(executor, Direction::Up, steps)?;
        if plan.is_empty() {
            println!("No pending migrations to apply");
        } else {
            println!("Would apply {} migration(s):", plan.len());
            print_plan(&plan);
        }
        return Ok(());
    }

    println!("Applying migrations...");
    let applied = migrator.up(executor, steps)?;
    if applied > 0 {
        println!("✅ Successfully applied {applied} migration(s)");
    } else {
        println!("✅ No migrations to apply");
    }
    Ok(())
}

fn handle_down(
    migrator: &Migrator,
    executor: &MayPostgresExecutor,
    steps: usize,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        let plan = migrator.plan(executor, Direction::Down, Some(steps))?;
        if plan.is_empty() {
            println!("No applied migrations to rollback");
        } else {
            println!("Would rollback {} migration(s):", plan.len());
            print_plan(&plan);
        }
        return Ok(());
    }

    println!("Rolling back migrations...");
    let rolled_back = migrator.down(executor, Some(steps))?;
    if rolled_back > 0 {
        println!("✅ Successfully rolled back {rolled_back} migration(s)");
    } else {
        println!("✅ No migrations to rollback");
    }
    Ok(())
}

fn handle_validate(migrator: &Migrator, executor: &MayPostgresExecutor) -> Result<()> {
    println!("Validating checksums...");
    // status() fails on the first mismatching checksum
    migrator.status(executor)?;
    println!("✅ All checksums valid");
    Ok(())
}

fn handle_info(migrator: &Migrator, executor: &MayPostgresExecutor, version: Option<i64>) -> Result<()> {
    let status = migrator.status(executor)?;

    let Some(version) = version else {
        println!("\n📋 Migration System Information\n");
        println!("Total Migrations: {}", status.total());
        println!("Applied: {}", status.applied.len());
        println!("Pending: {}", status.pending.len());
        if let Some(latest) = status.latest_applied_version() {
            println!("Latest Applied Version: {latest}");
        }
        if let Some(next) = status.next_pending_version() {
            println!("Next Pending Version: {next}");
        }
        return Ok(());
    };

    if let Some(record) = status.applied.iter().find(|r| r.version == version) {
        println!("\n📋 Migration Information\n");
        println!("Version: {}", record.version);
        println!("Name: {}", record.name);
        println!("Checksum: {}", record.checksum);
        println!("Applied At: {}", record.applied_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(ms) = record.execution_time_ms {
            println!("Execution Time: {ms}ms");
        }
        println!("Success: {}", record.success);
    } else if let Some(pending) = status.pending.iter().find(|p| p.version == version) {
        println!("\n📋 Migration Information (Pending)\n");
        println!("Version: {}", pending.version);
        println!("Name: {}", pending.name);
        println!("Checksum: {}", pending.checksum);
        println!("Status: Pending");
    } else {
        bail!("No migration with version {version}");
    }
    Ok(())
}

fn handle_plan(migrator: &Migrator, down: bool) -> Result<()> {
    let direction = if down { Direction::Down } else { Direction::Up };
    print_plan(&migrator.render_all(direction)?);
    Ok(())
}

fn handle_verify(migrator: &Migrator) -> Result<()> {
    migrator.verify()?;
    for migration in migrator.registry().iter() {
        println!("  ✓ m{}_{} reverses cleanly", migration.version(), migration.name());
    }
    Ok(())
}

fn handle_partition(migrator: &Migrator, cadence: Cadence, at: &str) -> Result<()> {
    let sql = partition_sql(cadence, at, migrator.options().schema.as_deref())?;
    println!("{sql};");
    Ok(())
}

fn partition_sql(cadence: Cadence, at: &str, schema: Option<&str>) -> Result<String> {
    let ts = parse_timestamp(at)?;
    let bounds = PartitionBounds::containing(
        &cadence.table_name(),
        PartitionGranularity::for_cadence(cadence),
        ts,
    )?;
    Ok(bounds.attach_sql(schema))
}

fn print_plan(plan: &[PlannedMigration]) {
    for migration in plan {
        println!(
            "\n-- m{}_{} ({})",
            migration.version,
            migration.name,
            migration.direction
        );
        for statement in &migration.statements {
            println!("{};", statement.sql);
        }
    }
}

fn parse_timestamp(input: &str) -> Result<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(ts);
        }
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Unrecognized timestamp '{input}'"))?;
    date.and_hms_opt(0, 0, 0)
        .with_context(|| format!("Unrecognized timestamp '{input}'"))
}

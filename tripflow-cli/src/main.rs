mod db;
mod ingest;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load trip CSV files into the trip store
    Ingest(ingest::IngestArgs),
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Init {
        /// SQLite path or database URL; defaults to the environment
        #[clap(short, long)]
        database: Option<String>,
    },
    Migrate {
        #[clap(subcommand)]
        direction: db::MigrateDirection,
        #[clap(short, long)]
        database: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        Commands::Ingest(ingest_args) => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after the current chunk");
                    on_interrupt.cancel();
                }
            });
            ingest::run(ingest_args, cancel).await?;
        }
        Commands::Db { command } => match command {
            DbCommands::Init { database } => {
                let database = db::database_config(database.as_deref());
                info!("Initializing database");
                db::migrate_database(&database, db::MigrateDirection::Up).await?;
            }
            DbCommands::Migrate {
                direction,
                database,
            } => {
                let database = db::database_config(database.as_deref());
                info!("Running database migration: {:?}", direction);
                db::migrate_database(&database, direction).await?;
            }
        },
    }

    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_deref()
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .without_time()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_flags_parse() {
        let cli = Cli::try_parse_from([
            "tripflow",
            "ingest",
            "--all-cleaned",
            "--chunksize",
            "100",
            "--batch-size",
            "10",
            "--jobs",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Ingest(args) => {
                assert!(args.all_cleaned);
                assert_eq!(args.chunksize, Some(100));
                assert_eq!(args.batch_size, Some(10));
                assert_eq!(args.jobs, 2);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn path_and_all_cleaned_conflict() {
        let parsed = Cli::try_parse_from(["tripflow", "ingest", "trips.csv", "--all-cleaned"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn migrate_takes_a_direction() {
        let cli = Cli::try_parse_from(["tripflow", "db", "migrate", "down", "-d", ":memory:"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Db {
                command: DbCommands::Migrate {
                    direction: db::MigrateDirection::Down,
                    ..
                }
            }
        ));
    }
}

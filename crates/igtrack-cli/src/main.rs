mod ingest;
mod query;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use igtrack_ingest::IngestOptions;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "igtrack-cli")]
#[command(about = "Instagram relationship snapshot tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Ingest one or more export archives, oldest snapshot first
    Ingest {
        /// Instagram export `.zip` files
        #[arg(required = true)]
        archives: Vec<PathBuf>,
        /// Run every step, then roll back instead of committing
        #[arg(long)]
        dry_run: bool,
    },
    /// Ingest raw followers/following/pending JSON files
    IngestJson {
        #[arg(long)]
        followers: PathBuf,
        #[arg(long)]
        following: PathBuf,
        /// Omit when the export has no pending requests file
        #[arg(long)]
        pending: Option<PathBuf>,
        /// Original archive filename; must contain a YYYY-MM-DD date
        #[arg(long)]
        filename: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// List ingested snapshots, newest first
    Snapshots {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show one profile's event timeline
    Timeline {
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("igtrack-cli: no command given; see --help");
        return Ok(());
    };

    let config = igtrack_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = igtrack_db::PoolConfig::from_app_config(&config);
    let pool = igtrack_db::connect_pool(&config.database_url, pool_config).await?;
    let options = IngestOptions::from_config(&config);

    match command {
        Commands::Migrate => {
            let applied = igtrack_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Ingest { archives, dry_run } => {
            ingest::run_ingest_archives(&pool, options.with_dry_run(dry_run), &archives).await?;
        }
        Commands::IngestJson {
            followers,
            following,
            pending,
            filename,
            dry_run,
        } => {
            ingest::run_ingest_json(
                &pool,
                options.with_dry_run(dry_run),
                &ingest::JsonInputs {
                    followers: &followers,
                    following: &following,
                    pending: pending.as_deref(),
                    filename: &filename,
                },
            )
            .await?;
        }
        Commands::Snapshots { limit } => query::run_snapshots(&pool, limit).await?,
        Commands::Timeline { username } => query::run_timeline(&pool, &username).await?,
    }

    Ok(())
}

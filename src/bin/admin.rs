//! Explora Admin CLI
//!
//! Operator tool for schema setup, account and token bootstrap, and running a
//! single image generation job by hand.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use explora::api::JwtKeys;
use explora::app::Services;
use explora::{
    build_prompt, AppConfig, JobOutcome, LocationId, NewUser, PostgresStore, UserStorage,
};

#[derive(Parser)]
#[command(name = "explora-admin")]
#[command(about = "Explora Admin CLI - Database setup, tokens and job maintenance")]
#[command(version = "1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema (idempotent)
    InitDb,

    /// Create an account directly in the database (e.g. the first admin)
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        /// Read from EXPLORA_PASSWORD when not given
        #[arg(long, env = "EXPLORA_PASSWORD", hide_env_values = true)]
        password: String,

        /// Grant admin access
        #[arg(long)]
        admin: bool,
    },

    /// Mint a bearer token
    MintToken {
        /// User id placed in the `sub` claim
        #[arg(long)]
        user_id: String,

        /// Grant admin access
        #[arg(long)]
        admin: bool,
    },

    /// Run one image generation job in-process, retries included
    Generate {
        /// Location to generate an image for
        #[arg(long)]
        location_id: i64,
    },

    /// Print the generation prompt for a location name
    Prompt {
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }
    let config = AppConfig::load().context("failed to load configuration")?;

    // --verbose wins, then RUST_LOG, then the configured level
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::InitDb => init_db(&config).await?,

        Commands::CreateUser {
            username,
            email,
            password,
            admin,
        } => {
            let store = connect(&config).await?;
            let user = store
                .create_user(NewUser::with_password(username, email, &password)?.admin(admin))
                .await?;
            info!("👤 Created user {} (id {}, admin: {})", user.username, user.id, user.is_admin);
        }

        Commands::MintToken { user_id, admin } => {
            let keys = JwtKeys::new(config.require_jwt_secret()?, config.auth.token_ttl_hours);
            let token = keys.issue(&user_id, admin)?;
            info!(
                "🔑 Token for {} (admin: {}, valid {}h)",
                user_id, admin, config.auth.token_ttl_hours
            );
            println!("{}", token);
        }

        Commands::Generate { location_id } => {
            generate(&config, LocationId::new(location_id)).await?;
        }

        Commands::Prompt { name } => {
            println!("{}", build_prompt(&name));
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> Result<PostgresStore> {
    let Some(url) = config.database.url.as_deref() else {
        bail!("database.url is not configured (set DATABASE_URL or EXPLORA__DATABASE__URL)");
    };

    info!("🗄️  Connecting to database...");
    let store = PostgresStore::connect(url, config.database.max_connections).await?;
    store.init_schema().await?;
    Ok(store)
}

async fn init_db(config: &AppConfig) -> Result<()> {
    connect(config).await?;
    info!("✅ Schema is up to date");
    Ok(())
}

async fn generate(config: &AppConfig, location_id: LocationId) -> Result<()> {
    if config.database.url.is_none() {
        warn!("No database.url configured; the in-memory store has no locations");
    }

    let services = Services::from_config(config).await?;
    let job = services.job;
    let mut attempt = 1;

    info!("🎨 Generating image for location {}", location_id);
    loop {
        match job.run(location_id, attempt).await {
            JobOutcome::Completed(completion) => {
                info!("✅ Job completed after {} attempt(s)", attempt);
                println!("{}", serde_json::to_string_pretty(&completion)?);
                return Ok(());
            }
            JobOutcome::RetryScheduled {
                next_attempt,
                delay,
                error,
            } => {
                warn!(
                    "Attempt {} failed ({}); retrying in {:?}",
                    attempt, error, delay
                );
                tokio::time::sleep(delay).await;
                attempt = next_attempt;
            }
            JobOutcome::Abandoned { attempts, error } => {
                error!("❌ Abandoned after {} attempts: {}", attempts, error);
                bail!("job abandoned: {}", error.kind());
            }
            JobOutcome::Failed { error } => {
                error!("❌ Job failed: {}", error);
                bail!("job failed: {}", error.kind());
            }
        }
    }
}

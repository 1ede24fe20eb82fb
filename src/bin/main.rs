use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use chronicler::recognition::default_recognizer;
use chronicler::{ChroniclerConfig, DatabaseConfig, GenerationPipeline, Orchestrator};

#[derive(Parser)]
#[command(name = "chronicler")]
#[command(about = "Chronicles of uploaded media and compositions generated from their audio")]
struct Cli {
    /// Configuration file (defaults to CHRONICLER_CONFIG, then the XDG and
    /// working directory lookups)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST server
    Server {
        #[arg(short, long, default_value = "8080")]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Generate a composition from an audio file and print it as JSON
    Compose {
        audio: PathBuf,
        /// Recognition language (defaults to the configured default)
        #[arg(short, long)]
        language: Option<String>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<ChroniclerConfig> {
    match path {
        Some(path) => ChroniclerConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => ChroniclerConfig::load(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chronicler=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { port, host, db_url } => {
            let config = Arc::new(load_config(cli.config)?);

            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for REST server: {}", db_config.url);

            let orchestrator = Arc::new(Orchestrator::new(db_config, config).await?);
            let app = chronicler::api::create_router(orchestrator);

            let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
            info!("Server listening on http://{}:{}", host, port);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = chronicler::create_connection(db_config).await?;
            chronicler::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::Compose { audio, language } => {
            let config = Arc::new(load_config(cli.config)?);
            let language = language.unwrap_or_else(|| config.default_language.clone());
            info!("Composing {} (language {})", audio.display(), language);

            let recognizer = default_recognizer(&config);
            let pipeline = GenerationPipeline::new(config, recognizer);

            let document =
                tokio::task::spawn_blocking(move || pipeline.run(&audio, &language)).await??;

            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}

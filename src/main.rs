use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, PlaceCommand, TagCommand};
use lieux::auth::{AuthState, FirebaseAuth};
use lieux::cache::FileCache;
use lieux::config::{Backend, Config};
use lieux::remote::{DocumentStore, FirestoreConfig, FirestoreStore, SqliteDocumentStore};
use lieux::SyncStore;

#[derive(Parser)]
#[command(name = "lieux")]
#[command(version)]
#[command(about = "Save places on the map, tag them, keep them in sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage saved places
    Place(PlaceCommand),

    /// Manage tags
    Tag(TagCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lieux=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Place(cmd)) => {
            let store = open_store(&config).await?;
            cmd.run(&store).await?;
        }
        Some(Commands::Tag(cmd)) => {
            let store = open_store(&config).await?;
            cmd.run(&store).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Build the store for the configured backend and sign it in.
async fn open_store(config: &Config) -> Result<SyncStore, Box<dyn std::error::Error>> {
    let auth = AuthState::new();

    let remote: Arc<dyn DocumentStore> = match config.backend.value {
        Backend::Sqlite => {
            let store = SqliteDocumentStore::open(&config.database_path()).await?;
            auth.sign_in(config.user_id.value.clone());
            Arc::new(store)
        }
        Backend::Firestore => {
            let settings = &config.firestore;
            let (Some(project_id), Some(api_key), Some(email), Some(password)) = (
                &settings.project_id,
                &settings.api_key,
                &settings.email,
                &settings.password,
            ) else {
                return Err(
                    "Firestore backend needs firestore.project_id, api_key, email and password"
                        .into(),
                );
            };

            let session = FirebaseAuth::new(api_key)
                .sign_in_with_password(email, password)
                .await?;

            let mut firestore_config = FirestoreConfig::new(project_id);
            if let Some(base_url) = &settings.base_url {
                firestore_config = firestore_config.with_base_url(base_url);
            }
            let store = FirestoreStore::new(firestore_config);
            store.set_id_token(Some(session.id_token));
            auth.sign_in(session.user_id);
            Arc::new(store)
        }
    };

    let cache = Arc::new(FileCache::new(config.cache_path()));
    let store = SyncStore::new(remote, cache);
    store.handle_auth_change(auth.current_user()).await;

    if let Some(message) = store.last_error() {
        return Err(format!("Failed to load data: {}", message).into());
    }
    Ok(store)
}

//! Startup helpers for the terminal client.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::api::GroqConnector;
use crate::config::AppConfig;
use crate::error::ChatResult;
use crate::i18n::Localizer;
use crate::session::ChatSession;
use crate::settings::SettingsStore;
use crate::storage::{KeyValueStore, SqliteKeyValueStore};
use crate::terminal::{TerminalController, TerminalView};

/// Run the client (used by the `groq-chat` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on a normal exit, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting groq-chat v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::from(1);
    }
    tracing::info!("API endpoint: {}", config.api.base_url);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(run_session(config));
    // Stdin reads block a worker thread; do not wait for it.
    rt.shutdown_timeout(Duration::from_millis(100));

    if let Err(e) = result {
        tracing::error!("Client error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run_session(config: AppConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("cannot create data directory {}", config.data_dir.display()))?;
    let storage = initialize_storage(&config)
        .await
        .context("cannot open local storage")?;

    let language = SettingsStore::load(Arc::clone(&storage))
        .await?
        .current()
        .language;
    let view = Arc::new(TerminalView::stdio(
        Localizer::resolve(config.locales_dir.as_deref(), language).await,
    ));
    let connector = Arc::new(GroqConnector::new(config.api.clone()));

    let session = ChatSession::start(&config, storage, connector, view.clone()).await?;
    TerminalController::new(session, view).run().await?;
    Ok(())
}

/// Open the database and apply the API key seed from the environment.
///
/// The seed only fills an empty stored key; a key saved through the
/// settings always wins.
///
/// # Errors
/// Returns an error if the database cannot be opened or written.
pub async fn initialize_storage(config: &AppConfig) -> ChatResult<Arc<dyn KeyValueStore>> {
    let path = config.database_path();
    tracing::info!("Database: {}", path.display());
    let storage: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&path).await?);
    seed_api_key(Arc::clone(&storage), config.api_key_seed.as_deref()).await?;
    Ok(storage)
}

async fn seed_api_key(storage: Arc<dyn KeyValueStore>, seed: Option<&str>) -> ChatResult<()> {
    let Some(seed) = seed else {
        return Ok(());
    };
    let mut settings = SettingsStore::load(storage).await?;
    if !settings.current().api_key.is_empty() {
        return Ok(());
    }
    let mut next = settings.current().clone();
    next.api_key = seed.to_string();
    settings.save(next).await?;
    tracing::info!("API key taken from the environment");
    Ok(())
}

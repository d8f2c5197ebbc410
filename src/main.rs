use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use municipal_news::config::{Config, DatabaseConfig};
use municipal_news::db::Database;
use municipal_news::importer::{start_background_import, Importer};
use municipal_news::routes::{self, AppState};
use municipal_news::scraper::Scraper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "municipal_news=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("SITE_CONFIG").unwrap_or_else(|_| "site.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded {} feeds from {}", config.feeds.len(), config_path);

    // Connect to the article store
    let db_config = DatabaseConfig::from_env()?;
    let db = Arc::new(Database::connect(db_config).await?);
    info!("Database ready");

    let importer = Arc::new(Importer::new(db.clone(), config.feeds.clone())?);
    if config.import_interval > 0 {
        let bg_importer = importer.clone();
        let interval = config.import_interval;
        tokio::spawn(async move {
            start_background_import(bg_importer, interval).await;
        });
        info!("Background import every {} minutes", interval);
    }

    let scraper = Arc::new(Scraper::new(&config.scrape.user_agent)?);

    let state = Arc::new(AppState {
        db,
        importer,
        scraper,
        config: Arc::new(config),
    });

    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string());
    let app = routes::app(state, &static_dir);

    // Start server
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wordcards::game::PostgresGameRepository;
use wordcards::{create_router, AppState, BroadcastHub, Config, GameRepository, InMemoryGameRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordcards=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(listen_addr = %config.listen_addr, "Starting word card game server");

    let game_repository: Arc<dyn GameRepository + Send + Sync> = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let repository = PostgresGameRepository::new(pool);
            repository.init_schema().await?;
            info!("Using PostgreSQL game repository");
            Arc::new(repository)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory game repository");
            Arc::new(InMemoryGameRepository::new())
        }
    };

    if let Some(cards_path) = &config.cards_path {
        let contents = tokio::fs::read_to_string(cards_path).await?;
        let texts: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let inserted = game_repository.import_cards(&texts).await?;
        info!(cards_path = %cards_path, read = texts.len(), inserted, "Cards imported");
    } else {
        warn!("CARDS_PATH not set, rounds need cards already in the store");
    }

    let hub = BroadcastHub::start(config.hub_config());
    let app_state = AppState::new(game_repository, hub.clone());
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Server running on http://{}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C after stopping the hub. Stopping it first ends every
/// open event stream, otherwise those connections would keep the server alive.
async fn shutdown_signal(hub: BroadcastHub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    hub.shutdown().await;
}

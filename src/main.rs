use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod database;
mod directions;
mod heatmap;
mod locations;
mod routes;
mod scheduler;
mod utils;

use cache::TrafficCache;
use config::Config;
use database::ReadingStore;
use directions::{google::GoogleDirectionsClient, TravelTimeSource};
use routes::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hudson_wait_times=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = sqlx::SqlitePool::connect(&config.database_url).await?;
    let store = Arc::new(ReadingStore::new(pool, config.app_timezone));
    store.init_tables().await?;

    let source: Arc<dyn TravelTimeSource> = Arc::new(GoogleDirectionsClient::new(&config)?);
    let cache = Arc::new(TrafficCache::new(
        Arc::clone(&source),
        Arc::clone(&store),
        config.cache_ttl,
    ));

    if source.is_configured() {
        scheduler::spawn_refresh_loop(Arc::clone(&cache), config.refresh_interval);
    } else {
        tracing::warn!("GOOGLE_MAPS_API_KEY not set, serving placeholder wait times");
    }
    if config.admin_key.is_none() {
        tracing::info!("ADMIN_KEY not set, manual readings are disabled");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        store,
        cache,
        source,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

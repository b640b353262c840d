// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use weft::api::{create_router, AppState};
use weft::config::CONFIG;
use weft::pipeline::executor::ExecutorClient;
use weft::pipeline::Pipeline;
use weft::provider::ProviderRegistry;
use weft::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = CONFIG.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting weft");
    info!("Executor: {}", CONFIG.executor_base_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(CONFIG.sqlite_max_connections)
        .connect(&CONFIG.database_url)
        .await?;

    let store = Store::new(pool);
    store.run_migrations().await?;

    let registry = Arc::new(ProviderRegistry::builtin());
    info!("Providers: {}", registry.identifiers().join(", "));

    let executor = Arc::new(ExecutorClient::new(CONFIG.executor_base_url.clone()));
    let pipeline = Arc::new(Pipeline::new(store, registry, executor));

    let app = create_router(AppState { pipeline });

    let addr: SocketAddr = format!("{}:{}", CONFIG.host, CONFIG.port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

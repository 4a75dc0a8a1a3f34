use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::clients::memory::{
    MemoryContentCatalog, MemoryContentIndex, MemoryInteractionStore, MemoryUserDirectory,
};
use feed_service::{handlers, metrics, BatchCache, BatchComposer, Config, FeedService};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},actix_web=info", config.app.log_level).into());
    if config.app.env == "production" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(env = %config.app.env, "Starting feed service");

    // In-memory backing stores. Production deployments swap these for
    // networked adapters behind the same traits.
    let users = Arc::new(MemoryUserDirectory::new());
    let interactions = Arc::new(MemoryInteractionStore::new());
    let index = Arc::new(MemoryContentIndex::new());
    let catalog = Arc::new(MemoryContentCatalog::new());
    if config.app.env != "production" {
        tracing::warn!("using in-memory backing stores; data will not survive a restart");
    }

    let composer = Arc::new(BatchComposer::standard(
        index,
        interactions.clone(),
        users.clone(),
        config.feed.clone(),
    ));
    let cache = Arc::new(BatchCache::new(composer, &config.feed));
    let feed = Arc::new(FeedService::new(cache, users, interactions, catalog));

    let addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(feed.clone()))
            .wrap(actix_middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/health/live", web::get().to(|| async { "OK" }))
            .route("/health/ready", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::register_routes)
    })
    .bind(&addr)?
    .run()
    .await
}

use feedloop::{
    cache::create_redis_pool,
    create_db_pool, create_router, init_tracing, shutdown_telemetry,
    webhooks::{DispatcherConfig, WebhookDispatcher},
    AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "feedloop",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    let issues = config.validate_for_production();
    if !issues.is_empty() {
        for issue in &issues {
            warn!(issue = %issue, "Configuration warning");
        }
    }

    info!(
        database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let db_pool = create_db_pool(&config);

    info!("Database connection pool created");

    let dispatcher_shutdown = if config.webhooks.dispatcher_enabled {
        match WebhookDispatcher::new(db_pool.clone(), DispatcherConfig::from(&config.webhooks)) {
            Ok(dispatcher) => Some(dispatcher.spawn()),
            Err(e) => {
                error!(error = %e, "Failed to start webhook dispatcher");
                None
            }
        }
    } else {
        info!("Webhook dispatcher disabled");
        None
    };

    let redis_pool = create_redis_pool(&config.redis);
    let state = AppState::new(db_pool, redis_pool, &config);
    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    {
        error!(error = %e, "HTTP server error");
    }

    if let Some(shutdown) = dispatcher_shutdown {
        info!("Shutting down webhook dispatcher...");
        let _ = shutdown.send(true);
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }

    shutdown_telemetry();

    info!("Server shutdown complete");
}

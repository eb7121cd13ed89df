use jwt_router::app::create_app;
use jwt_router::config::Settings;
use jwt_router::entity::memory::load_seed_file;
use jwt_router::entity::EntityModel;
use jwt_router::state::AppState;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Load entity tables
    let models: Vec<Arc<dyn EntityModel>> = match &settings.seed_file {
        Some(path) => match load_seed_file(path).await {
            Ok(models) => {
                info!("Loaded {} entity tables from {}", models.len(), path);
                models
                    .into_iter()
                    .map(|model| Arc::new(model) as Arc<dyn EntityModel>)
                    .collect()
            }
            Err(e) => {
                error!("Failed to load seed file: {}", e);
                std::process::exit(1);
            }
        },
        None => Vec::new(),
    };

    let port = settings.port;
    let state = match AppState::new(settings, models) {
        Ok(state) => state,
        Err(e) => {
            error!("Invalid authorization policy: {}", e);
            std::process::exit(1);
        }
    };

    let app = create_app(state);

    // Build server address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    // Start server
    let server = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server running on {}, press Ctrl+C to stop", addr);
    let serve = axum::serve(server, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

// Simple signal handler that works on all platforms
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

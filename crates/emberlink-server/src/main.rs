use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use emberlink_server::config::ServerConfig;
use emberlink_server::{build_app, spawn_janitor};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load();
    config.validate();
    let addr = config.listen_addr.clone();

    let (app, state) = build_app(config);

    let shutdown = CancellationToken::new();
    let janitor = spawn_janitor(state, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Emberlink relay listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server error");

    shutdown.cancel();
    let _ = janitor.await;
}

use std::sync::Arc;

use chatbridge_rs::auth::build_allowed_key_set;
use chatbridge_rs::config::{load_config, AppConfig};
use chatbridge_rs::observability::init_tracing;
use chatbridge_rs::router;
use chatbridge_rs::state::AppState;
use chatbridge_rs::transport::HttpTransport;

fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);
    let runtime = build_runtime(&config);

    runtime.block_on(async move {
        run(config).await;
    });
}

fn build_runtime(config: &AppConfig) -> tokio::runtime::Runtime {
    let worker_threads = config.server.runtime_worker_threads;
    let mut runtime_builder = if worker_threads == Some(1) {
        tokio::runtime::Builder::new_current_thread()
    } else {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if let Some(threads) = worker_threads {
            builder.worker_threads(threads);
        }
        builder
    };
    runtime_builder.enable_io();
    runtime_builder.enable_time();
    runtime_builder.build().unwrap_or_else(|e| {
        eprintln!("Failed to initialize Tokio runtime: {e}");
        std::process::exit(1);
    })
}

async fn run(config: AppConfig) {
    let host = config.server.host.clone();
    let port = config.server.port;

    let transport = HttpTransport::new(&config.server).unwrap_or_else(|e| {
        eprintln!("Failed to build upstream transport: {e}");
        std::process::exit(1);
    });
    let allowed_client_keys = build_allowed_key_set(&config);
    let state = Arc::new(AppState::new(config, transport, allowed_client_keys));

    tracing::info!(
        "chatbridge starting on {}:{} (upstream={}, wire_format={})",
        host,
        port,
        state.chat_url(),
        state.config.upstream.wire_format
    );

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        });

    tracing::info!("chatbridge is ready to accept connections");

    let app = router(state);
    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

use std::sync::Arc;

use chat_api::http::{self, AppState};
use chat_core::assistant::{Provisioner, TurnExecutor};
use chat_core::config::{ApiConfig, LogFormat, load_dotenv};
use chat_core::openai::{AssistantsApi, OpenAiAssistantsClient};
use chat_core::store::JsonFileStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "chat_api=debug,chat_core=info,axum=info,tower_http=info";

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to read config: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    let api: Arc<dyn AssistantsApi> = match OpenAiAssistantsClient::new(config.openai.clone()) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(error = %err, "failed to initialize assistants client");
            std::process::exit(1);
        }
    };
    let store = Arc::new(JsonFileStore::new(&config.assistant_record_path));

    let provisioned = match Provisioner::new(api.clone(), store)
        .ensure_assistant(&config.assistant)
        .await
    {
        Ok(provisioned) => provisioned,
        Err(err) => {
            error!(error = %err, "failed to provision assistant");
            std::process::exit(1);
        }
    };
    info!(
        assistant_id = %provisioned.assistant_id,
        outcome = ?provisioned.outcome,
        "assistant ready"
    );

    let shutdown = CancellationToken::new();
    let app = http::build_router(AppState {
        turns: Arc::new(TurnExecutor::new(api, &provisioned, config.turn)),
        shutdown: shutdown.clone(),
    });

    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "invalid bind address");
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    info!(
        "chat api listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        error!(error = %err, "server terminated unexpectedly");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received; cancelling in-flight turns");
    shutdown.cancel();
}

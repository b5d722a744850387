// api-gateway-rs/src/main.rs
// Prompt optimizer gateway binary
//
// Start-up order: .env, logging, configuration, credential probe, bind, serve.
// Configuration or signing failures stop the process before it listens.

use std::net::SocketAddr;
use std::sync::Arc;

use api_gateway::{create_router, telemetry, AppState};
use relay_config::{EnvSource, Environment, RelayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let source = EnvSource::with_dotenv();

    // Logging needs the environment before the rest of the configuration
    let environment = Environment::detect(&source).unwrap_or_default();
    telemetry::init_tracing(environment);

    let config = match RelayConfig::from_source(&source) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            return Err(err.into());
        }
    };

    let state = AppState::new(config.clone())?;

    let probe = state.relay.issuer().issue().map_err(|err| {
        tracing::error!(error = %err, "Failed to sign probe credential");
        err
    })?;
    tracing::info!(
        subject = %probe.subject_id(),
        expires_at = probe.expires_at(),
        "Credential issuer ready"
    );

    let app = create_router(Arc::new(state));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        environment = %config.environment,
        model = %config.model_name,
        candidates = config.candidate_count,
        "Prompt optimizer gateway listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}

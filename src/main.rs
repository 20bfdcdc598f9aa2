use dirauth::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::setup_subscriber()?;

    let mut state = dirauth::initialize_state()?;
    state.metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "metrics recorder not installed");
            None
        },
    };

    let address = state.config.address.clone();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "server started");

    axum::serve(listener, dirauth::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#![recursion_limit = "256"]

use anyhow::Context;
use chainhead_monitor::{Config, Monitor, server, service, telemetry, transport::WsTransport};
use tracing::{Instrument, error, info, info_span};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    telemetry::init(config.stage);

    info!(
        service = %config.service_name,
        stage = %config.stage,
        network = %config.network,
        endpoints = config.ws_endpoints.len(),
        http_endpoint = config.http_endpoint.as_deref().unwrap_or("-"),
        "Starting service"
    );

    let listener =
        server::bind(config.listen_addr).await.context("failed to bind status listener")?;

    let transport = WsTransport::new()
        .dial_timeout(config.dial_timeout)
        .call_timeout(config.call_timeout);
    let monitor = Monitor::builder(transport, config.ws_endpoints.clone())
        .retry_policy(config.retry_policy)
        .service_name(config.service_name.clone())
        .build();

    let span = info_span!("chain", network = %config.network, stage = %config.stage);
    service::run(monitor, listener, shutdown_signal()).instrument(span).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for ctrl-c");
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
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

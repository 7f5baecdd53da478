//! Runs a [`Monitor`] next to its HTTP status listener.
//!
//! The monitor and the listener have different lifetimes. A monitor that stops, with an error or
//! a panic, does not take the listener down: `/status` keeps answering `503 stopped` until the
//! shutdown future resolves. A listener that dies, on the other hand, ends the service right away.

use std::future::Future;

use thiserror::Error;
use tokio::{net::TcpListener, task::JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info};

use crate::{
    error::MonitorError,
    monitor::{BlockSink, Monitor},
    server,
    transport::ChainTransport,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("monitor task panicked")]
    MonitorPanicked,

    #[error("monitor task failed")]
    MonitorTask(#[source] JoinError),

    #[error("status listener failed")]
    Listener(#[source] std::io::Error),

    #[error("status listener task failed")]
    ListenerTask(#[source] JoinError),
}

/// Runs `monitor` and serves its state on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the monitor's failure if it stopped on its own, otherwise the listener's failure.
/// Either is only returned once the service has shut down.
pub async fn run<T, S>(
    monitor: Monitor<T, S>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServiceError>
where
    T: ChainTransport + 'static,
    S: BlockSink + 'static,
{
    let cancel = CancellationToken::new();
    let state = monitor.state();
    let mut monitor_task = tokio::spawn(monitor.run(cancel.clone()).in_current_span());
    let mut server_task =
        tokio::spawn(server::serve(listener, state, cancel.clone().cancelled_owned()));

    tokio::pin!(shutdown);

    let mut monitor_outcome = None;
    let server_outcome = loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break None;
            }
            result = &mut monitor_task, if monitor_outcome.is_none() => {
                let outcome = monitor_result(result);
                if let Err(err) = &outcome {
                    error!(error = %err, "Monitor stopped, status stays available until shutdown");
                }
                monitor_outcome = Some(outcome);
            }
            result = &mut server_task => {
                error!("Status listener stopped unexpectedly, shutting down");
                break Some(result);
            }
        }
    };
    cancel.cancel();

    let monitor_outcome = match monitor_outcome {
        Some(outcome) => outcome,
        None => monitor_result(monitor_task.await),
    };
    let server_outcome = match server_outcome {
        Some(result) => result,
        None => server_task.await,
    };
    let server_outcome = match server_outcome {
        Ok(result) => result.map_err(ServiceError::Listener),
        Err(err) => Err(ServiceError::ListenerTask(err)),
    };

    info!("Status listener stopped");
    monitor_outcome.and(server_outcome)
}

fn monitor_result(result: Result<Result<(), MonitorError>, JoinError>) -> Result<(), ServiceError> {
    match result {
        Ok(result) => result.map_err(ServiceError::Monitor),
        Err(err) if err.is_panic() => Err(ServiceError::MonitorPanicked),
        Err(err) => Err(ServiceError::MonitorTask(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, num::NonZeroUsize, time::Duration};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        sync::oneshot,
    };

    use super::*;
    use crate::{
        EndpointPool, MonitorState, RetryPolicy,
        test_utils::{ScriptedTransport, wait_for_state},
    };

    async fn status(addr: std::net::SocketAddr) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn monitor(transport: ScriptedTransport) -> Monitor<ScriptedTransport> {
        let pool = EndpointPool::new(["wss://a"]).unwrap();
        Monitor::builder(transport, pool)
            .retry_policy(RetryPolicy::new(NonZeroUsize::MIN, Duration::ZERO))
            .build()
    }

    #[tokio::test]
    async fn listener_outlives_a_failed_monitor() {
        let (transport, _feeds) = ScriptedTransport::new();
        transport.unreachable("wss://a");
        let monitor = monitor(transport);
        let mut states = monitor.state();

        let listener = server::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let service = tokio::spawn(run(monitor, listener, async move {
            let _ = stopped.await;
        }));

        wait_for_state(&mut states, MonitorState::Stopped, Duration::from_secs(5)).await;

        let response = status(addr).await;
        assert!(response.starts_with("HTTP/1.1 503"), "{response}");
        assert!(response.ends_with("stopped"), "{response}");
        assert!(!service.is_finished());

        stop.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), service).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServiceError::Monitor(MonitorError::Connect(_)))));
    }

    #[tokio::test]
    async fn shutdown_cancels_a_running_monitor() {
        let (transport, _feeds) = ScriptedTransport::new();
        let monitor = monitor(transport.clone());
        let mut states = monitor.state();

        let listener = server::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let service = tokio::spawn(run(monitor, listener, async move {
            let _ = stopped.await;
        }));

        wait_for_state(&mut states, MonitorState::Running, Duration::from_secs(5)).await;
        let response = status(addr).await;
        assert!(response.ends_with("running"), "{response}");

        stop.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), service).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(*states.borrow(), MonitorState::Stopped);
        assert_eq!(transport.closed_connections(), 1);
    }
}

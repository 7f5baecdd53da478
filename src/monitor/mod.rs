//! Chain-head monitoring state machine.
//!
//! [`Monitor`] keeps a single head subscription alive for as long as its cancellation token is
//! not cancelled:
//!
//! 1. **Connecting** - [`establish`] scans the endpoint pool with bounded per-endpoint retries.
//! 2. **Subscribing** - a new-head subscription is opened on the fresh connection.
//! 3. **Running** - the monitor waits for exactly one of: cancellation, a terminal subscription
//!    error, or a new header. Headers are fetched and reported one at a time, in arrival order.
//! 4. **Reconnecting** - after a subscription error the dead session is dropped and steps 1 and 2
//!    run again, always scanning the pool from its first endpoint.
//! 5. **ShuttingDown** / **Stopped** - the current session is released and the run ends.
//!
//! Failing to connect or subscribe, initially or while reconnecting, is fatal: the monitor stops
//! and [`Monitor::run`] returns the error so the caller can decide whether to start it again.
//! A failed block fetch only drops that one head.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainhead_monitor::{EndpointPool, Monitor, RetryPolicy, transport::WsTransport};
//! use std::{num::NonZeroUsize, time::Duration};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = EndpointPool::new(["wss://node-a.example", "wss://node-b.example"])?;
//! let monitor = Monitor::builder(WsTransport::new(), pool)
//!     .retry_policy(RetryPolicy::new(NonZeroUsize::new(3).unwrap(), Duration::from_secs(5)))
//!     .build();
//!
//! let cancel = CancellationToken::new();
//! let handle = tokio::spawn(monitor.run(cancel.clone()));
//!
//! // later
//! cancel.cancel();
//! handle.await??;
//! # Ok(()) }
//! ```

mod builder;
mod connection;
mod session;
mod sink;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::{
    error::{ConnectionError, MonitorError, TransportError},
    monitor::session::{Session, fetch_block, subscribe},
    transport::ChainTransport,
    types::{Endpoint, EndpointPool, Header, MonitorState, RetryPolicy},
};

pub use builder::{DEFAULT_SERVICE_NAME, MonitorBuilder};
pub use connection::establish;
pub use sink::{BlockSink, LogSink};

/// Long-running chain-head monitor.
///
/// Built with [`MonitorBuilder`]; consumed by [`Monitor::run`].
pub struct Monitor<T: ChainTransport, S: BlockSink = LogSink> {
    transport: T,
    pool: EndpointPool,
    retry_policy: RetryPolicy,
    sink: S,
    service_name: String,
    state: watch::Sender<MonitorState>,
    transitions: broadcast::Sender<MonitorState>,
}

/// Number of state transitions kept for a [`Monitor::transitions`] receiver that falls behind.
pub const TRANSITION_BUFFER_CAPACITY: usize = 32;

/// What woke the monitor up while running.
enum Event {
    Cancelled,
    SubscriptionFailed(TransportError),
    Header(Header),
}

#[derive(Clone, Copy)]
enum Phase {
    Initial,
    Reconnect,
}

impl Phase {
    fn connect_error(self, err: ConnectionError) -> MonitorError {
        match self {
            Phase::Initial => MonitorError::Connect(err),
            Phase::Reconnect => MonitorError::Reconnect(err),
        }
    }

    fn subscribe_error(self, endpoint: Endpoint, source: TransportError) -> MonitorError {
        match self {
            Phase::Initial => MonitorError::Subscribe { endpoint, source },
            Phase::Reconnect => MonitorError::Resubscribe { endpoint, source },
        }
    }
}

impl<T: ChainTransport> Monitor<T> {
    /// Shorthand for [`MonitorBuilder::new`].
    #[must_use]
    pub fn builder(transport: T, pool: EndpointPool) -> MonitorBuilder<T> {
        MonitorBuilder::new(transport, pool)
    }
}

impl<T: ChainTransport, S: BlockSink> Monitor<T, S> {
    /// Returns a receiver tracking the monitor's [`MonitorState`].
    ///
    /// The last state published by a finished run is always [`MonitorState::Stopped`].
    #[must_use]
    pub fn state(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Returns a receiver of every state the monitor enters, in order.
    ///
    /// Unlike [`Monitor::state`], short-lived states such as [`MonitorState::ShuttingDown`] are
    /// never coalesced away. A receiver more than [`TRANSITION_BUFFER_CAPACITY`] states behind
    /// loses the oldest ones.
    #[must_use]
    pub fn transitions(&self) -> broadcast::Receiver<MonitorState> {
        self.transitions.subscribe()
    }

    /// Runs the monitor until `cancel` is cancelled or a fatal error occurs.
    ///
    /// Cancellation is observed at every suspension point (dial, retry delay, subscribe, wait,
    /// block fetch) and always ends in `Ok(())`. The current connection and subscription are
    /// released on every exit path.
    ///
    /// # Errors
    ///
    /// * [`MonitorError::Connect`] / [`MonitorError::Subscribe`] - if the first session cannot be
    ///   opened.
    /// * [`MonitorError::Reconnect`] / [`MonitorError::Resubscribe`] - if a session cannot be
    ///   reopened after a subscription error.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), MonitorError> {
        let span = info_span!("monitor", service = %self.service_name);
        async {
            info!(endpoints = self.pool.len(), "Starting monitoring");
            let result = self.drive(&cancel).await;
            match &result {
                Ok(()) => info!("Monitoring stopped"),
                Err(err) => error!(error = %err, "Monitoring stopped with error"),
            }
            self.transition(MonitorState::Stopped);
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        self.transition(MonitorState::Connecting);
        let Some(mut session) = self.open_session(Phase::Initial, cancel).await? else {
            self.shut_down(None);
            return Ok(());
        };

        loop {
            let (headers, errors) = session.subscription.channels_mut();
            let event = tokio::select! {
                () = cancel.cancelled() => Event::Cancelled,
                result = errors => {
                    Event::SubscriptionFailed(result.unwrap_or(TransportError::SubscriptionClosed))
                }
                header = headers.recv() => match header {
                    Some(header) => Event::Header(header),
                    None => Event::SubscriptionFailed(TransportError::SubscriptionClosed),
                },
            };

            match event {
                Event::Cancelled => {
                    self.shut_down(Some(session));
                    return Ok(());
                }
                Event::SubscriptionFailed(err) => {
                    error!(endpoint = %session.endpoint, error = %err, "Subscription error");
                    // the dead session is abandoned, not unsubscribed on the node
                    drop(session);

                    self.transition(MonitorState::Reconnecting);
                    session = match self.open_session(Phase::Reconnect, cancel).await? {
                        Some(session) => session,
                        None => {
                            self.shut_down(None);
                            return Ok(());
                        }
                    };
                }
                Event::Header(header) => {
                    debug!(block_number = header.number, hash = %header.hash, "New head received");
                    let Ok(block) =
                        fetch_block(&self.transport, &session.connection, header.hash, cancel)
                            .await
                    else {
                        self.shut_down(Some(session));
                        return Ok(());
                    };
                    if let Some(block) = block {
                        self.sink.report(&block);
                    }
                }
            }
        }
    }

    /// Connects and subscribes. Returns `Ok(None)` if cancelled along the way.
    async fn open_session(
        &self,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> Result<Option<Session<T::Connection>>, MonitorError> {
        let (endpoint, connection) =
            match establish(&self.transport, &self.pool, &self.retry_policy, cancel).await {
                Ok(established) => established,
                Err(ConnectionError::Cancelled) => return Ok(None),
                Err(err) => return Err(phase.connect_error(err)),
            };

        self.transition(MonitorState::Subscribing);
        let Ok(subscription) = subscribe(&self.transport, &connection, cancel).await else {
            return Ok(None);
        };
        let subscription =
            subscription.map_err(|source| phase.subscribe_error(endpoint.clone(), source))?;

        self.transition(MonitorState::Running);
        info!(endpoint = %endpoint, "Monitoring new heads");
        Ok(Some(Session { endpoint, connection, subscription }))
    }

    fn shut_down(&self, session: Option<Session<T::Connection>>) {
        self.transition(MonitorState::ShuttingDown);
        if let Some(session) = session {
            session.close();
        }
        info!("Service is off with graceful shutdown");
    }

    fn transition(&self, state: MonitorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Monitor state changed");
        }
        // no receivers is fine
        let _ = self.transitions.send(state);
    }
}

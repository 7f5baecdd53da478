//! Chain-head monitor: follows a chain's new blocks over WebSocket and survives node outages.
//!
//! The main entry point is [`Monitor`], built via [`MonitorBuilder`] from a
//! [`ChainTransport`](transport::ChainTransport) and an [`EndpointPool`].
//!
//! # Resilience
//!
//! A connection is obtained by trying each endpoint of the pool in order, with a bounded number
//! of attempts per endpoint and a fixed delay between attempts ([`RetryPolicy`]). Once a
//! subscription to new chain heads is open, a terminal subscription error triggers a full
//! reconnect and resubscribe. Exhausting the pool is fatal and ends [`Monitor::run`] with a
//! [`MonitorError`].
//!
//! # Ordering
//!
//! Heads are handled one at a time in the order the subscription delivers them. Each head's block
//! is fetched by hash and passed to a [`BlockSink`]; by default [`LogSink`] logs its hash, number
//! and transaction count. A block that cannot be fetched is logged and skipped.
//!
//! # Cancellation
//!
//! [`Monitor::run`] takes a [`CancellationToken`](tokio_util::sync::CancellationToken) that is
//! observed at every suspension point. Cancelling it releases the current connection and
//! subscription and ends the run with `Ok(())`.

pub mod config;
pub mod monitor;
pub mod server;
pub mod service;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

mod error;
mod types;

pub use config::{Config, ConfigError, Network, Stage};
pub use error::{ConnectionError, MonitorError, TransportError};
pub use monitor::{BlockSink, LogSink, Monitor, MonitorBuilder, establish};
pub use types::{
    Block, DEFAULT_INTER_ATTEMPT_DELAY, DEFAULT_MAX_ATTEMPTS, Endpoint, EndpointPool, Header,
    MonitorState, RetryPolicy,
};

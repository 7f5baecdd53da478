use std::sync::Arc;

use alloy::{
    primitives::BlockHash,
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

use crate::types::Endpoint;

/// Errors returned by a [`ChainTransport`](crate::transport::ChainTransport) call or delivered on
/// a subscription's error channel.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The underlying RPC transport returned an error.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// A timeout elapsed while waiting for the node.
    #[error("Operation timed out")]
    Timeout,

    /// The node does not know a block with the requested hash.
    #[error("Block not found, hash: {0}")]
    BlockNotFound(BlockHash),

    /// The head subscription stopped delivering notifications.
    #[error("Subscription closed")]
    SubscriptionClosed,
}

impl From<RpcError<TransportErrorKind>> for TransportError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        TransportError::RpcError(Arc::new(error))
    }
}

impl From<TransportErrorKind> for TransportError {
    fn from(kind: TransportErrorKind) -> Self {
        RpcError::Transport(kind).into()
    }
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}

/// Failure to obtain a live connection from the endpoint pool.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Every endpoint used up its attempts.
    #[error(
        "failed to connect to any of {endpoints} endpoint(s) after {attempts_per_endpoint} attempt(s) each"
    )]
    Exhausted {
        endpoints: usize,
        attempts_per_endpoint: usize,
        #[source]
        last_error: TransportError,
    },

    /// The cancellation token fired while connecting.
    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Terminal failure of [`Monitor::run`](crate::Monitor::run).
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    #[error("failed to create connection: {0}")]
    Connect(#[source] ConnectionError),

    #[error("failed to subscribe to new heads on {endpoint}: {source}")]
    Subscribe {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },

    #[error("failed to reconnect after subscription error: {0}")]
    Reconnect(#[source] ConnectionError),

    #[error("failed to resubscribe to new heads on {endpoint}: {source}")]
    Resubscribe {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },
}

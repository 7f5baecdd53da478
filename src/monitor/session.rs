use alloy::primitives::BlockHash;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    error::TransportError,
    transport::{ChainTransport, HeadSubscription},
    types::{Block, Endpoint},
};

/// The cancellation token fired while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// A live connection and the head subscription opened on it.
///
/// Both are released together when the session is closed or dropped, and are never reused.
#[derive(Debug)]
pub(crate) struct Session<C> {
    pub(crate) endpoint: Endpoint,
    pub(crate) connection: C,
    pub(crate) subscription: HeadSubscription,
}

impl<C> Session<C> {
    /// Unsubscribes, then drops the connection.
    pub(crate) fn close(mut self) {
        self.subscription.unsubscribe();
        debug!(endpoint = %self.endpoint, "Session closed");
    }
}

/// Opens a new-head subscription on `connection`.
///
/// There is no retry here; recovering from a failed subscription means reconnecting first.
pub(crate) async fn subscribe<T: ChainTransport>(
    transport: &T,
    connection: &T::Connection,
    cancel: &CancellationToken,
) -> Result<Result<HeadSubscription, TransportError>, Cancelled> {
    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(Cancelled),
        result = transport.subscribe_new_heads(connection) => Ok(result),
    }
}

/// Fetches the block behind a chain-head notification in a single round trip.
///
/// A failed fetch is logged and yields `Ok(None)`: the head is dropped from reporting and not
/// retried.
pub(crate) async fn fetch_block<T: ChainTransport>(
    transport: &T,
    connection: &T::Connection,
    hash: BlockHash,
    cancel: &CancellationToken,
) -> Result<Option<Block>, Cancelled> {
    let result = tokio::select! {
        biased;

        () = cancel.cancelled() => return Err(Cancelled),
        result = transport.block_by_hash(connection, hash) => result,
    };

    match result {
        Ok(block) => Ok(Some(block)),
        Err(err) => {
            error!(hash = %hash, error = %err, "Failed to fetch block");
            Ok(None)
        }
    }
}

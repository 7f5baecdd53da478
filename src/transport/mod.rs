//! Chain transport capability used by the monitor.
//!
//! The monitor never talks to a node directly. It goes through a [`ChainTransport`], which
//! knows how to:
//! * dial an [`Endpoint`] and hand back an exclusively owned connection
//! * open a [`HeadSubscription`] for new chain heads on that connection
//! * fetch a [`Block`] by hash over that connection
//!
//! [`WsTransport`] is the production implementation, speaking JSON-RPC over WebSocket through
//! alloy. Tests plug in the scripted transport from `test_utils`.

pub mod subscription;
pub mod ws;

use alloy::primitives::BlockHash;

use crate::{
    error::TransportError,
    types::{Block, Endpoint},
};

pub use subscription::{DEFAULT_HEADER_BUFFER_CAPACITY, HeadSender, HeadSubscription};
pub use ws::{WsConnection, WsTransport};

/// Dial, subscribe and fetch primitives against a chain node.
///
/// Dropping a [`ChainTransport::Connection`] closes it.
pub trait ChainTransport: Send + Sync {
    /// Live handle to exactly one endpoint.
    type Connection: Send + Sync;

    /// Opens a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    fn dial(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Opens a push subscription for new chain heads on `connection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node refuses the subscription.
    fn subscribe_new_heads(
        &self,
        connection: &Self::Connection,
    ) -> impl Future<Output = Result<HeadSubscription, TransportError>> + Send;

    /// Fetches the block with the given hash in a single round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the block is unknown to the node.
    fn block_by_hash(
        &self,
        connection: &Self::Connection,
        hash: BlockHash,
    ) -> impl Future<Output = Result<Block, TransportError>> + Send;
}

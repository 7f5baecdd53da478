use std::time::Duration;

use alloy::{
    network::Ethereum,
    primitives::BlockHash,
    providers::{Provider, RootProvider},
    pubsub::Subscription,
    rpc::types as rpc,
};
use tokio::{sync::broadcast::error::RecvError, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    transport::{
        ChainTransport, HeadSubscription,
        subscription::{DEFAULT_HEADER_BUFFER_CAPACITY, HeadSender},
    },
    types::{Block, Endpoint, Header},
};

/// Default timeout for establishing a WebSocket connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for a single RPC call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON-RPC over WebSocket transport backed by an alloy [`RootProvider`].
#[derive(Debug, Clone)]
pub struct WsTransport {
    dial_timeout: Duration,
    call_timeout: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the maximum time a single dial may take.
    #[must_use]
    pub fn dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    /// Set the maximum time a block fetch or subscribe request may take.
    #[must_use]
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Live WebSocket connection to one endpoint.
#[derive(Debug, Clone)]
pub struct WsConnection {
    endpoint: Endpoint,
    provider: RootProvider<Ethereum>,
}

impl WsConnection {
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn provider(&self) -> &RootProvider<Ethereum> {
        &self.provider
    }
}

impl ChainTransport for WsTransport {
    type Connection = WsConnection;

    async fn dial(&self, endpoint: &Endpoint) -> Result<WsConnection, TransportError> {
        debug!(endpoint = %endpoint, timeout_ms = self.dial_timeout.as_millis(), "Dialing endpoint");
        let provider = timeout(self.dial_timeout, RootProvider::connect(endpoint.as_str()))
            .await
            .map_err(TransportError::from)?
            .map_err(TransportError::from)?;
        Ok(WsConnection { endpoint: endpoint.clone(), provider })
    }

    async fn subscribe_new_heads(
        &self,
        connection: &WsConnection,
    ) -> Result<HeadSubscription, TransportError> {
        let subscription = timeout(self.call_timeout, connection.provider.subscribe_blocks())
            .await
            .map_err(TransportError::from)?
            .map_err(TransportError::from)?;

        let (sender, head_subscription) = HeadSubscription::channel(DEFAULT_HEADER_BUFFER_CAPACITY);
        let forwarder = tokio::spawn(forward_heads(subscription, sender));

        info!(endpoint = %connection.endpoint, "Subscribed to new heads");
        Ok(head_subscription.with_forwarder(forwarder.abort_handle()))
    }

    async fn block_by_hash(
        &self,
        connection: &WsConnection,
        hash: BlockHash,
    ) -> Result<Block, TransportError> {
        let block = timeout(self.call_timeout, connection.provider.get_block_by_hash(hash))
            .await
            .map_err(TransportError::from)?
            .map_err(TransportError::from)?;

        block.map(|block| Block::from(&block)).ok_or(TransportError::BlockNotFound(hash))
    }
}

/// Pumps the alloy subscription into the monitor-facing channels until either side goes away.
async fn forward_heads(mut subscription: Subscription<rpc::Header>, mut sender: HeadSender) {
    loop {
        match subscription.recv().await {
            Ok(header) => {
                if !sender.send(Header::from(&header)).await {
                    debug!("Head subscription dropped, stopping forwarder");
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Head subscription lagged");
            }
            Err(RecvError::Closed) => {
                sender.fail(TransportError::SubscriptionClosed);
                return;
            }
        }
    }
}

impl From<&rpc::Header> for Header {
    fn from(header: &rpc::Header) -> Self {
        Header { hash: header.hash, number: header.number }
    }
}

impl From<&rpc::Block> for Block {
    fn from(block: &rpc::Block) -> Self {
        Block {
            hash: block.header.hash,
            number: block.header.number,
            transaction_count: block.transactions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::{primitives::B256, providers::ext::AnvilApi};
    use alloy_node_bindings::Anvil;

    use super::*;

    #[test]
    fn builder_overrides_timeouts() {
        let transport = WsTransport::new()
            .dial_timeout(Duration::from_secs(1))
            .call_timeout(Duration::from_secs(2));
        assert_eq!(transport.dial_timeout, Duration::from_secs(1));
        assert_eq!(transport.call_timeout, Duration::from_secs(2));

        let defaults = WsTransport::default();
        assert_eq!(defaults.dial_timeout, DEFAULT_DIAL_TIMEOUT);
        assert_eq!(defaults.call_timeout, DEFAULT_CALL_TIMEOUT);
    }

    #[tokio::test]
    async fn dial_times_out_on_unroutable_endpoint() {
        // reserved TEST-NET address, never answers
        let transport = WsTransport::new().dial_timeout(Duration::from_millis(50));
        let result = transport.dial(&Endpoint::new("ws://192.0.2.1:8546")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dial_fails_on_refused_endpoint() {
        let transport = WsTransport::new().dial_timeout(Duration::from_secs(5));
        let result = transport.dial(&Endpoint::new("ws://127.0.0.1:1")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "requires the anvil binary"]
    async fn subscribes_and_fetches_against_anvil() -> anyhow::Result<()> {
        let anvil = Anvil::new().try_spawn()?;
        let transport = WsTransport::new();
        let endpoint = Endpoint::new(anvil.ws_endpoint_url().as_str());

        let connection = transport.dial(&endpoint).await?;
        let mut subscription = transport.subscribe_new_heads(&connection).await?;

        connection.provider().anvil_mine(Some(1), None).await?;

        let (headers, _) = subscription.channels_mut();
        let header = timeout(Duration::from_secs(5), headers.recv()).await?.expect("header");
        assert_eq!(header.number, 1);

        let block = transport.block_by_hash(&connection, header.hash).await?;
        assert_eq!(block.number, 1);
        assert_eq!(block.hash, header.hash);
        assert_eq!(block.transaction_count, 0);

        let missing = transport.block_by_hash(&connection, B256::repeat_byte(0xab)).await;
        assert!(matches!(missing, Err(TransportError::BlockNotFound(_))));

        Ok(())
    }
}

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy::{
    primitives::{B256, BlockHash},
    transports::TransportErrorKind,
};
use tokio::sync::mpsc;

use crate::{
    error::TransportError,
    transport::{ChainTransport, HeadSender, HeadSubscription},
    types::{Block, Endpoint, Header},
};

const FEED_BUFFER_CAPACITY: usize = 16;

/// Header with a hash derived from its number, so blocks can be resolved from the hash alone.
#[must_use]
pub fn header(number: u64) -> Header {
    Header { hash: B256::left_padding_from(&number.to_be_bytes()), number }
}

#[derive(Debug, Default)]
struct DialScript {
    failures_left: usize,
    stall: bool,
}

enum DialOutcome {
    Connect,
    Refuse,
    Stall,
}

#[derive(Debug, Default)]
struct Script {
    dials: HashMap<Endpoint, DialScript>,
    failing_subscribes: usize,
    stall_subscribes: bool,
    failing_blocks: HashSet<BlockHash>,
    stalled_blocks: HashSet<BlockHash>,
    transaction_counts: HashMap<BlockHash, usize>,
}

#[derive(Debug, Default)]
struct Calls {
    dials: Vec<Endpoint>,
    subscribes: Vec<Endpoint>,
    fetches: Vec<BlockHash>,
}

#[derive(Debug)]
struct Inner {
    script: Mutex<Script>,
    calls: Mutex<Calls>,
    closed_connections: Arc<AtomicUsize>,
    feeds: mpsc::UnboundedSender<HeadSender>,
}

/// In-memory [`ChainTransport`] whose behaviour is scripted per endpoint and per block.
///
/// Every successful subscription hands its [`HeadSender`] to the feed receiver returned by
/// [`ScriptedTransport::new`], so tests can push headers and terminal errors into the monitor.
/// Endpoints without a script always connect. Clones share one script, so behaviour can be
/// changed while a monitor is running.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

/// Connection handed out by [`ScriptedTransport`]; counts how often connections are closed.
#[derive(Debug)]
pub struct ScriptedConnection {
    endpoint: Endpoint,
    closed: Arc<AtomicUsize>,
}

impl ScriptedConnection {
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn refused() -> TransportError {
    TransportErrorKind::custom_str("connection refused").into()
}

impl ScriptedTransport {
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HeadSender>) {
        let (feeds, feed_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            script: Mutex::default(),
            calls: Mutex::default(),
            closed_connections: Arc::default(),
            feeds,
        };
        (Self { inner: Arc::new(inner) }, feed_rx)
    }

    /// Every later dial to `endpoint` fails.
    pub fn unreachable(&self, endpoint: &str) {
        self.fail_dials(endpoint, usize::MAX);
    }

    /// The next `failures` dials to `endpoint` fail, later ones succeed.
    pub fn fail_dials(&self, endpoint: &str, failures: usize) {
        lock(&self.inner.script).dials.entry(Endpoint::new(endpoint)).or_default().failures_left =
            failures;
    }

    /// Later dials to `endpoint` never complete.
    pub fn stall_dials(&self, endpoint: &str) {
        lock(&self.inner.script).dials.entry(Endpoint::new(endpoint)).or_default().stall = true;
    }

    /// The next subscribe call fails.
    pub fn fail_next_subscribe(&self) {
        lock(&self.inner.script).failing_subscribes += 1;
    }

    /// Later subscribe calls never complete.
    pub fn stall_subscribes(&self) {
        lock(&self.inner.script).stall_subscribes = true;
    }

    /// Fetching the block behind `header` fails.
    pub fn fail_block(&self, header: &Header) {
        lock(&self.inner.script).failing_blocks.insert(header.hash);
    }

    /// Fetching the block behind `header` never completes.
    pub fn stall_block(&self, header: &Header) {
        lock(&self.inner.script).stalled_blocks.insert(header.hash);
    }

    /// Sets the transaction count reported for the block behind `header`.
    pub fn set_transaction_count(&self, header: &Header, count: usize) {
        lock(&self.inner.script).transaction_counts.insert(header.hash, count);
    }

    /// Endpoints dialed so far, in call order.
    #[must_use]
    pub fn dials(&self) -> Vec<Endpoint> {
        lock(&self.inner.calls).dials.clone()
    }

    /// Endpoints whose connections were subscribed, in call order.
    #[must_use]
    pub fn subscribes(&self) -> Vec<Endpoint> {
        lock(&self.inner.calls).subscribes.clone()
    }

    /// Block hashes fetched so far, in call order.
    #[must_use]
    pub fn fetches(&self) -> Vec<BlockHash> {
        lock(&self.inner.calls).fetches.clone()
    }

    /// Number of connections that have been dropped.
    #[must_use]
    pub fn closed_connections(&self) -> usize {
        self.inner.closed_connections.load(Ordering::SeqCst)
    }

    fn dial_outcome(&self, endpoint: &Endpoint) -> DialOutcome {
        let mut script = lock(&self.inner.script);
        let Some(dial) = script.dials.get_mut(endpoint) else {
            return DialOutcome::Connect;
        };
        if dial.stall {
            return DialOutcome::Stall;
        }
        if dial.failures_left == 0 {
            return DialOutcome::Connect;
        }
        if dial.failures_left != usize::MAX {
            dial.failures_left -= 1;
        }
        DialOutcome::Refuse
    }
}

impl ChainTransport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn dial(&self, endpoint: &Endpoint) -> Result<ScriptedConnection, TransportError> {
        lock(&self.inner.calls).dials.push(endpoint.clone());

        match self.dial_outcome(endpoint) {
            DialOutcome::Stall => std::future::pending().await,
            DialOutcome::Refuse => Err(refused()),
            DialOutcome::Connect => Ok(ScriptedConnection {
                endpoint: endpoint.clone(),
                closed: Arc::clone(&self.inner.closed_connections),
            }),
        }
    }

    async fn subscribe_new_heads(
        &self,
        connection: &ScriptedConnection,
    ) -> Result<HeadSubscription, TransportError> {
        lock(&self.inner.calls).subscribes.push(connection.endpoint.clone());

        let stalled = {
            let mut script = lock(&self.inner.script);
            if script.failing_subscribes > 0 {
                script.failing_subscribes -= 1;
                return Err(TransportErrorKind::PubsubUnavailable.into());
            }
            script.stall_subscribes
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let (sender, subscription) = HeadSubscription::channel(FEED_BUFFER_CAPACITY);
        // a dropped feed receiver drops the sender, which closes the subscription right away
        let _ = self.inner.feeds.send(sender);
        Ok(subscription)
    }

    async fn block_by_hash(
        &self,
        _connection: &ScriptedConnection,
        hash: BlockHash,
    ) -> Result<Block, TransportError> {
        lock(&self.inner.calls).fetches.push(hash);

        let (stalled, failing, transaction_count) = {
            let script = lock(&self.inner.script);
            (
                script.stalled_blocks.contains(&hash),
                script.failing_blocks.contains(&hash),
                script.transaction_counts.get(&hash).copied().unwrap_or_default(),
            )
        };

        if stalled {
            std::future::pending::<()>().await;
        }
        if failing {
            return Err(TransportError::BlockNotFound(hash));
        }

        let mut number = [0u8; 8];
        number.copy_from_slice(&hash[24..]);
        Ok(Block { hash, number: u64::from_be_bytes(number), transaction_count })
    }
}

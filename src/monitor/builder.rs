use tokio::sync::{broadcast, watch};

use crate::{
    monitor::{BlockSink, LogSink, Monitor, TRANSITION_BUFFER_CAPACITY},
    transport::ChainTransport,
    types::{EndpointPool, MonitorState, RetryPolicy},
};

/// Default name attached to the monitor's tracing span.
pub const DEFAULT_SERVICE_NAME: &str = "chainhead-monitor";

/// Builder for constructing a [`Monitor`].
///
/// Use this to configure the retry policy, the block sink and the service name.
pub struct MonitorBuilder<T: ChainTransport, S: BlockSink = LogSink> {
    transport: T,
    pool: EndpointPool,
    retry_policy: RetryPolicy,
    sink: S,
    service_name: String,
}

impl<T: ChainTransport> MonitorBuilder<T> {
    /// Create a builder with the default [`RetryPolicy`] reporting blocks through [`LogSink`].
    #[must_use]
    pub fn new(transport: T, pool: EndpointPool) -> Self {
        Self {
            transport,
            pool,
            retry_policy: RetryPolicy::default(),
            sink: LogSink,
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
        }
    }
}

impl<T: ChainTransport, S: BlockSink> MonitorBuilder<T, S> {
    /// Set the per-endpoint retry policy used for the initial connection and every reconnect.
    #[must_use]
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Set the name recorded on the monitor's tracing span.
    #[must_use]
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Replace the consumer of fetched blocks.
    #[must_use]
    pub fn sink<S2: BlockSink>(self, sink: S2) -> MonitorBuilder<T, S2> {
        MonitorBuilder {
            transport: self.transport,
            pool: self.pool,
            retry_policy: self.retry_policy,
            sink,
            service_name: self.service_name,
        }
    }

    /// Build the [`Monitor`].
    #[must_use]
    pub fn build(self) -> Monitor<T, S> {
        let (state, _) = watch::channel(MonitorState::Connecting);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER_CAPACITY);
        Monitor {
            transport: self.transport,
            pool: self.pool,
            retry_policy: self.retry_policy,
            sink: self.sink,
            service_name: self.service_name,
            state,
            transitions,
        }
    }
}

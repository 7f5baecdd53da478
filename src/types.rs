use std::{fmt, num::NonZeroUsize, time::Duration};

use alloy::primitives::BlockHash;

use crate::config::ConfigError;

/// Address of a socket-reachable chain node.
///
/// The string is opaque to the monitor; validating its format is the transport's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordered, non-empty list of candidate endpoints.
///
/// Order defines failover priority and never changes after construction. The first endpoint is
/// the primary; the rest are fallbacks tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool {
    primary: Endpoint,
    fallbacks: Vec<Endpoint>,
}

impl EndpointPool {
    /// Builds a pool from `endpoints`, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyEndpoints`] if `endpoints` yields nothing.
    pub fn new<I, E>(endpoints: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = E>,
        E: Into<Endpoint>,
    {
        let mut endpoints = endpoints.into_iter().map(Into::into);
        let primary = endpoints.next().ok_or(ConfigError::EmptyEndpoints)?;
        Ok(Self { primary, fallbacks: endpoints.collect() })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Endpoint> {
        self.into_iter()
    }

    #[must_use]
    pub fn primary(&self) -> &Endpoint {
        &self.primary
    }

    #[must_use]
    pub fn fallbacks(&self) -> &[Endpoint] {
        &self.fallbacks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fallbacks.len() + 1
    }

    /// Always `false`; a pool cannot be constructed empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the endpoint following `index` together with its position, wrapping around at
    /// the end of the pool.
    #[must_use]
    pub fn next_after(&self, index: usize) -> (&Endpoint, usize) {
        let next = (index % self.len() + 1) % self.len();
        match next.checked_sub(1).and_then(|fallback| self.fallbacks.get(fallback)) {
            Some(endpoint) => (endpoint, next),
            None => (&self.primary, 0),
        }
    }
}

impl<'a> IntoIterator for &'a EndpointPool {
    type Item = &'a Endpoint;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter { primary: Some(&self.primary), fallbacks: self.fallbacks.iter() }
    }
}

/// Iterator over an [`EndpointPool`] in priority order.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    primary: Option<&'a Endpoint>,
    fallbacks: std::slice::Iter<'a, Endpoint>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Endpoint;

    fn next(&mut self) -> Option<Self::Item> {
        self.primary.take().or_else(|| self.fallbacks.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = usize::from(self.primary.is_some()) + self.fallbacks.len();
        (len, Some(len))
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Default number of dial attempts made against a single endpoint.
pub const DEFAULT_MAX_ATTEMPTS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(2);
/// Default pause between two dial attempts on the same endpoint.
pub const DEFAULT_INTER_ATTEMPT_DELAY: Duration = Duration::from_secs(5);

/// Bounded per-endpoint retry settings used while establishing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts_per_endpoint: NonZeroUsize,
    inter_attempt_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts_per_endpoint: NonZeroUsize, inter_attempt_delay: Duration) -> Self {
        Self { max_attempts_per_endpoint, inter_attempt_delay }
    }

    #[must_use]
    pub const fn max_attempts_per_endpoint(&self) -> usize {
        self.max_attempts_per_endpoint.get()
    }

    #[must_use]
    pub const fn inter_attempt_delay(&self) -> Duration {
        self.inter_attempt_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INTER_ATTEMPT_DELAY)
    }
}

/// New chain-head notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub hash: BlockHash,
    pub number: u64,
}

/// The fields of a fetched block the monitor reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub hash: BlockHash,
    pub number: u64,
    pub transaction_count: usize,
}

/// Lifecycle of a [`crate::Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Connecting,
    Subscribing,
    Running,
    Reconnecting,
    ShuttingDown,
    Stopped,
}

impl MonitorState {
    #[must_use]
    pub fn is_stopped(self) -> bool {
        self == MonitorState::Stopped
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Connecting => "connecting",
            MonitorState::Subscribing => "subscribing",
            MonitorState::Running => "running",
            MonitorState::Reconnecting => "reconnecting",
            MonitorState::ShuttingDown => "shutting_down",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

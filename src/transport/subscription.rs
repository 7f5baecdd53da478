use tokio::{
    sync::{mpsc, oneshot},
    task::AbortHandle,
};
use tracing::debug;

use crate::{error::TransportError, types::Header};

/// Default capacity of the header channel.
pub const DEFAULT_HEADER_BUFFER_CAPACITY: usize = 128;

/// Push subscription for new chain heads.
///
/// Exposes two independent channels: one delivering [`Header`] notifications in arrival order
/// and one delivering at most one terminal [`TransportError`]. A closed header channel means the
/// subscription is dead as well.
///
/// The subscription is released by [`HeadSubscription::unsubscribe`] or on drop, whichever comes
/// first. Releasing twice is a no-op.
#[derive(Debug)]
pub struct HeadSubscription {
    headers: mpsc::Receiver<Header>,
    errors: oneshot::Receiver<TransportError>,
    forwarder: Option<AbortHandle>,
    released: bool,
}

impl HeadSubscription {
    /// Creates a subscription together with the [`HeadSender`] that feeds it.
    #[must_use]
    pub fn channel(buffer_capacity: usize) -> (HeadSender, HeadSubscription) {
        let (header_tx, header_rx) = mpsc::channel(buffer_capacity);
        let (error_tx, error_rx) = oneshot::channel();
        let sender = HeadSender { headers: header_tx, error: Some(error_tx) };
        (sender, HeadSubscription::new(header_rx, error_rx))
    }

    #[must_use]
    pub fn new(
        headers: mpsc::Receiver<Header>,
        errors: oneshot::Receiver<TransportError>,
    ) -> Self {
        Self { headers, errors, forwarder: None, released: false }
    }

    /// Attaches the task pumping notifications into this subscription; it is aborted on release.
    #[must_use]
    pub fn with_forwarder(mut self, forwarder: AbortHandle) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Returns the header and terminal-error channels so both can be awaited at once.
    pub(crate) fn channels_mut(
        &mut self,
    ) -> (&mut mpsc::Receiver<Header>, &mut oneshot::Receiver<TransportError>) {
        (&mut self.headers, &mut self.errors)
    }

    /// Releases the subscription.
    ///
    /// Returns `true` if this call released it and `false` if it was already released.
    pub fn unsubscribe(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.headers.close();
        self.errors.close();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        debug!("Head subscription released");
        true
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for HeadSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Producer side of a [`HeadSubscription`].
#[derive(Debug)]
pub struct HeadSender {
    headers: mpsc::Sender<Header>,
    error: Option<oneshot::Sender<TransportError>>,
}

impl HeadSender {
    /// Delivers a header. Returns `false` once the subscription has been released.
    pub async fn send(&self, header: Header) -> bool {
        self.headers.send(header).await.is_ok()
    }

    /// Delivers the terminal error. Only the first call has an effect.
    ///
    /// Returns `false` if the error was already sent or the subscription was released.
    pub fn fail(&mut self, error: TransportError) -> bool {
        match self.error.take() {
            Some(sender) => sender.send(error).is_ok(),
            None => false,
        }
    }

    /// Returns `true` once the subscription side is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.headers.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;

    use super::*;

    fn header(number: u64) -> Header {
        Header { hash: B256::with_last_byte(number as u8), number }
    }

    #[tokio::test]
    async fn headers_arrive_in_order() {
        let (sender, mut subscription) = HeadSubscription::channel(4);

        assert!(sender.send(header(1)).await);
        assert!(sender.send(header(2)).await);

        let (headers, _) = subscription.channels_mut();
        assert_eq!(headers.recv().await, Some(header(1)));
        assert_eq!(headers.recv().await, Some(header(2)));
    }

    #[tokio::test]
    async fn terminal_error_is_delivered_once() {
        let (mut sender, mut subscription) = HeadSubscription::channel(4);

        assert!(sender.fail(TransportError::SubscriptionClosed));
        assert!(!sender.fail(TransportError::Timeout));

        let (_, errors) = subscription.channels_mut();
        assert!(matches!(errors.await, Ok(TransportError::SubscriptionClosed)));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (sender, mut subscription) = HeadSubscription::channel(4);

        assert!(subscription.unsubscribe());
        assert!(subscription.is_released());
        assert!(!subscription.unsubscribe());

        assert!(sender.is_closed());
        assert!(!sender.send(header(1)).await);
    }

    #[tokio::test]
    async fn dropping_releases_the_subscription() {
        let (mut sender, subscription) = HeadSubscription::channel(4);
        drop(subscription);

        assert!(sender.is_closed());
        assert!(!sender.fail(TransportError::Timeout));
    }

    #[tokio::test]
    async fn unsubscribe_aborts_the_forwarder() {
        let (_sender, subscription) = HeadSubscription::channel(4);
        let forwarder = tokio::spawn(std::future::pending::<()>());
        let mut subscription = subscription.with_forwarder(forwarder.abort_handle());

        subscription.unsubscribe();

        let join = forwarder.await.unwrap_err();
        assert!(join.is_cancelled());
    }
}

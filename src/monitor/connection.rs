use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{ConnectionError, TransportError},
    transport::ChainTransport,
    types::{Endpoint, EndpointPool, RetryPolicy},
};

/// Connects to the first endpoint of `pool` that accepts a connection.
///
/// Endpoints are tried strictly in pool order. Each one gets up to
/// [`RetryPolicy::max_attempts_per_endpoint`] dials, separated by
/// [`RetryPolicy::inter_attempt_delay`]; no delay follows the last attempt on an endpoint. The
/// scan always starts from the beginning of the pool, also when reconnecting.
///
/// Cancelling `cancel` aborts an in-flight dial or delay.
///
/// # Errors
///
/// * [`ConnectionError::Exhausted`] - if every endpoint used up its attempts.
/// * [`ConnectionError::Cancelled`] - if `cancel` fired first.
pub async fn establish<T: ChainTransport>(
    transport: &T,
    pool: &EndpointPool,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(Endpoint, T::Connection), ConnectionError> {
    let mut last_error = match connect(transport, pool.primary(), policy, cancel).await? {
        Ok(connection) => return Ok((pool.primary().clone(), connection)),
        Err(err) => err,
    };

    for endpoint in pool.fallbacks() {
        match connect(transport, endpoint, policy, cancel).await? {
            Ok(connection) => return Ok((endpoint.clone(), connection)),
            Err(err) => last_error = err,
        }
    }

    error!(endpoints = pool.len(), "Failed to connect to any endpoint after multiple attempts");
    Err(ConnectionError::Exhausted {
        endpoints: pool.len(),
        attempts_per_endpoint: policy.max_attempts_per_endpoint(),
        last_error,
    })
}

/// Spends the retry budget on a single endpoint.
///
/// The outer error is cancellation, the inner one the last dial failure.
async fn connect<T: ChainTransport>(
    transport: &T,
    endpoint: &Endpoint,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Result<T::Connection, TransportError>, ConnectionError> {
    let result = tokio::select! {
        biased;

        () = cancel.cancelled() => {
            debug!(endpoint = %endpoint, "Connection attempt cancelled");
            return Err(ConnectionError::Cancelled);
        }
        result = dial_with_retry(transport, endpoint, policy) => result,
    };

    match &result {
        Ok(_) => info!(endpoint = %endpoint, "Connected to endpoint"),
        Err(err) => error!(
            endpoint = %endpoint,
            attempts = policy.max_attempts_per_endpoint(),
            error = %err,
            "Failed to connect to endpoint"
        ),
    }
    Ok(result)
}

/// Dials `endpoint` up to `max_attempts_per_endpoint` times with a constant delay in between.
async fn dial_with_retry<T: ChainTransport>(
    transport: &T,
    endpoint: &Endpoint,
    policy: &RetryPolicy,
) -> Result<T::Connection, TransportError> {
    let max_attempts = policy.max_attempts_per_endpoint();
    let retry_strategy = ConstantBuilder::default()
        .with_delay(policy.inter_attempt_delay())
        .with_max_times(max_attempts - 1);

    let attempts = AtomicUsize::new(0);
    let attempts = &attempts;

    let dial = move || async move {
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let result = transport.dial(endpoint).await;
        if let Err(err) = &result {
            warn!(
                endpoint = %endpoint,
                attempt = attempt,
                max_attempts = max_attempts,
                error = %err,
                "Connection attempt failed"
            );
        }
        result
    };

    dial.retry(retry_strategy)
        .sleep(tokio::time::sleep)
        .notify(|_: &TransportError, delay: Duration| {
            debug!(endpoint = %endpoint, "Retrying connection after {:?}", delay);
        })
        .await
}

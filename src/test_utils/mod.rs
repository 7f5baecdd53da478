//! Helpers for driving a [`Monitor`](crate::Monitor) without a real node.

pub mod macros;
pub mod transport;

use std::time::Duration;

use tokio::sync::watch;

use crate::types::MonitorState;

pub use transport::{ScriptedConnection, ScriptedTransport, header};

/// Waits until the monitor publishes `expected`, panicking after `timeout`.
///
/// # Panics
///
/// If the state is not reached in time or the monitor is dropped first.
pub async fn wait_for_state(
    states: &mut watch::Receiver<MonitorState>,
    expected: MonitorState,
    timeout: Duration,
) {
    tokio::time::timeout(timeout, states.wait_for(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {expected}"))
        .unwrap_or_else(|_| panic!("monitor dropped before reaching state {expected}"));
}

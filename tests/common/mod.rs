#![allow(dead_code)]

use std::{num::NonZeroUsize, time::Duration};

use chainhead_monitor::{
    Block, EndpointPool, Monitor, MonitorError, MonitorState, RetryPolicy,
    test_utils::{ScriptedTransport, wait_for_state},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

pub const STATE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MonitorSetup {
    pub handle: JoinHandle<Result<(), MonitorError>>,
    pub blocks: mpsc::UnboundedReceiver<Block>,
    pub states: watch::Receiver<MonitorState>,
    pub transitions: broadcast::Receiver<MonitorState>,
    pub cancel: CancellationToken,
}

impl MonitorSetup {
    /// Waits for the run to finish and returns its result.
    pub async fn finish(&mut self) -> (Result<(), MonitorError>, MonitorState) {
        let result = tokio::time::timeout(STATE_TIMEOUT, &mut self.handle)
            .await
            .expect("monitor did not stop in time")
            .expect("monitor task panicked");
        let state = *self.states.borrow();
        (result, state)
    }

    pub async fn wait_for(&mut self, state: MonitorState) {
        wait_for_state(&mut self.states, state, STATE_TIMEOUT).await;
    }

    /// Every state entered since the monitor was built, in order.
    pub fn transitions(&mut self) -> Vec<MonitorState> {
        let mut states = Vec::new();
        while let Ok(state) = self.transitions.try_recv() {
            states.push(state);
        }
        states
    }
}

pub fn retry_policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(NonZeroUsize::new(max_attempts).unwrap(), Duration::ZERO)
}

/// Spawns a monitor over `endpoints` that reports into a channel.
pub fn spawn_monitor(
    transport: ScriptedTransport,
    endpoints: &[&str],
    max_attempts: usize,
) -> MonitorSetup {
    let pool = EndpointPool::new(endpoints.iter().copied()).unwrap();
    let (sink, blocks) = mpsc::unbounded_channel();
    let monitor = Monitor::builder(transport, pool)
        .retry_policy(retry_policy(max_attempts))
        .service_name("monitor-test")
        .sink(sink)
        .build();
    let states = monitor.state();
    let transitions = monitor.transitions();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(monitor.run(cancel.clone()));

    MonitorSetup { handle, blocks, states, transitions, cancel }
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + STATE_TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

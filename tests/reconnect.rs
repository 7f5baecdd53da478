mod common;

use chainhead_monitor::{
    ConnectionError, Endpoint, MonitorError, MonitorState, TransportError, assert_next_block,
    test_utils::{ScriptedTransport, header},
};

use crate::common::spawn_monitor;

fn endpoints(names: &[&str]) -> Vec<Endpoint> {
    names.iter().copied().map(Endpoint::new).collect()
}

#[tokio::test]
async fn subscription_error_triggers_exactly_one_resubscribe() -> anyhow::Result<()> {
    let (transport, mut feeds) = ScriptedTransport::new();
    let mut setup = spawn_monitor(transport.clone(), &["wss://a"], 3);

    setup.wait_for(MonitorState::Running).await;
    let mut old_feed = feeds.recv().await.expect("subscription");
    old_feed.send(header(1)).await;
    assert_next_block!(setup.blocks, 1);

    assert!(old_feed.fail(TransportError::SubscriptionClosed));
    let new_feed = feeds.recv().await.expect("resubscription");
    new_feed.send(header(2)).await;
    assert_next_block!(setup.blocks, 2);

    assert_eq!(transport.dials(), endpoints(&["wss://a", "wss://a"]));
    assert_eq!(transport.subscribes(), endpoints(&["wss://a", "wss://a"]));
    assert_eq!(transport.closed_connections(), 1);
    assert!(old_feed.is_closed());
    assert!(feeds.try_recv().is_err());

    setup.cancel.cancel();
    let (result, state) = setup.finish().await;
    assert!(result.is_ok());
    assert_eq!(state, MonitorState::Stopped);
    Ok(())
}

#[tokio::test]
async fn closed_header_stream_triggers_resubscribe() -> anyhow::Result<()> {
    let (transport, mut feeds) = ScriptedTransport::new();
    let mut setup = spawn_monitor(transport.clone(), &["wss://a"], 3);

    setup.wait_for(MonitorState::Running).await;
    let old_feed = feeds.recv().await.expect("subscription");
    drop(old_feed);

    let new_feed = feeds.recv().await.expect("resubscription");
    new_feed.send(header(7)).await;
    assert_next_block!(setup.blocks, 7);
    assert_eq!(transport.subscribes().len(), 2);

    setup.cancel.cancel();
    let (result, _) = setup.finish().await;
    assert!(result.is_ok());
    Ok(())
}

#[tokio::test]
async fn fails_over_to_the_first_reachable_endpoint() -> anyhow::Result<()> {
    let (transport, mut feeds) = ScriptedTransport::new();
    transport.unreachable("wss://bad1");
    transport.unreachable("wss://bad2");
    let mut setup = spawn_monitor(transport.clone(), &["wss://bad1", "wss://bad2", "wss://good"], 2);

    setup.wait_for(MonitorState::Running).await;
    let mut feed = feeds.recv().await.expect("subscription");

    let scan = ["wss://bad1", "wss://bad1", "wss://bad2", "wss://bad2", "wss://good"];
    assert_eq!(transport.dials(), endpoints(&scan));
    assert_eq!(transport.subscribes(), endpoints(&["wss://good"]));

    // reconnecting scans the pool from the start again
    feed.fail(TransportError::SubscriptionClosed);
    let feed = feeds.recv().await.expect("resubscription");
    feed.send(header(1)).await;
    assert_next_block!(setup.blocks, 1);

    let rescan: Vec<&str> = scan.iter().chain(scan.iter()).copied().collect();
    assert_eq!(transport.dials(), endpoints(&rescan));

    setup.cancel.cancel();
    let (result, _) = setup.finish().await;
    assert!(result.is_ok());
    Ok(())
}

#[tokio::test]
async fn exhausted_reconnect_is_fatal() {
    let (transport, mut feeds) = ScriptedTransport::new();
    let mut setup = spawn_monitor(transport.clone(), &["wss://a", "wss://b"], 2);

    setup.wait_for(MonitorState::Running).await;
    let mut feed = feeds.recv().await.expect("subscription");

    transport.unreachable("wss://a");
    transport.unreachable("wss://b");
    feed.fail(TransportError::SubscriptionClosed);

    let (result, state) = setup.finish().await;

    assert!(matches!(
        result,
        Err(MonitorError::Reconnect(ConnectionError::Exhausted {
            endpoints: 2,
            attempts_per_endpoint: 2,
            ..
        }))
    ));
    assert_eq!(state, MonitorState::Stopped);
    assert_eq!(transport.dials().len(), 5);
    assert_eq!(transport.subscribes().len(), 1);
}

#[tokio::test]
async fn failed_resubscribe_is_fatal() {
    let (transport, mut feeds) = ScriptedTransport::new();
    let mut setup = spawn_monitor(transport.clone(), &["wss://a"], 3);

    setup.wait_for(MonitorState::Running).await;
    let mut feed = feeds.recv().await.expect("subscription");

    transport.fail_next_subscribe();
    feed.fail(TransportError::SubscriptionClosed);

    let (result, state) = setup.finish().await;

    assert!(matches!(result, Err(MonitorError::Resubscribe { .. })));
    assert_eq!(state, MonitorState::Stopped);
    assert_eq!(transport.dials().len(), 2);
    assert_eq!(transport.closed_connections(), 2);
}

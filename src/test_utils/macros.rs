/// Asserts that the next reported block has the given number.
///
/// Works on any `tokio::sync::mpsc` receiver of [`Block`](crate::Block) values, e.g. the
/// receiving end of an `UnboundedSender<Block>` sink.
#[macro_export]
macro_rules! assert_next_block {
    ($blocks: expr, $expected: expr) => {
        $crate::assert_next_block!($blocks, $expected, timeout = 5)
    };
    ($blocks: expr, $expected: expr, timeout = $secs: expr) => {
        let message = tokio::time::timeout(std::time::Duration::from_secs($secs), $blocks.recv())
            .await
            .expect("timed out");
        match message {
            Some(block) => assert_eq!(block.number, $expected, "unexpected block {block:?}"),
            None => panic!("Expected block {:?}, but sink was closed", $expected),
        }
    };
}

/// Asserts that no block is pending on the receiver.
#[macro_export]
macro_rules! assert_no_block {
    ($blocks: expr) => {
        match $blocks.try_recv() {
            Ok(block) => panic!("Expected no pending block, got {block:?}"),
            Err(_) => {}
        }
    };
}

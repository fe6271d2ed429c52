//! Zero-copy buffers nobody received are dropped with their sender.
//!
//! Kept in its own test binary: the handle table is process-wide.

use std::time::Duration;

use bytes::Bytes;
use icom::{context, Communicator, Timeouts};

#[test]
fn unreceived_handles_are_revoked_when_links_close() {
    let timeouts = Timeouts {
        recv: Duration::from_secs(5),
        send: Duration::from_secs(5),
    };
    let rx = Communicator::init_with("socket_rx|zero,timeout|*:39192", timeouts).unwrap();
    let mut tx =
        Communicator::init_with("socket_tx|zero,timeout|127.0.0.1:39192", timeouts).unwrap();

    // Small frames fit the socket buffers, so no receive is needed.
    for i in 0..5u8 {
        tx.send(&Bytes::from(vec![i; 64])).into_result().unwrap();
    }
    assert_eq!(context::unclaimed(), 5);

    tx.deinit();
    rx.deinit();
    assert_eq!(context::unclaimed(), 0);
}

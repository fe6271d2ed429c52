//! The zero-copy context is torn down only once no link uses it.
//!
//! Kept in its own test binary: releasing the context is process-wide.

use icom::{context, Communicator, IcomError};

#[test]
fn release_waits_for_the_last_zero_copy_link() {
    let comm = Communicator::init("socket_rx|zero|127.0.0.1:39190").unwrap();
    assert!(context::is_active());
    assert_eq!(context::live_leases(), 1);
    assert!(matches!(context::release(), Err(IcomError::InvalidArgument(_))));

    comm.deinit();
    assert_eq!(context::live_leases(), 0);
    context::release().unwrap();
    assert!(!context::is_active());

    // Releasing twice is harmless.
    context::release().unwrap();
}

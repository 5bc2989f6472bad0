//! Basic smoke test to verify crate compiles.

#[test]
fn crate_compiles() {
    // If this test runs, the crate skeleton is valid.
    let _ = std::any::type_name::<leasepool::LeasepoolConfig>();
    let _ = std::any::type_name::<leasepool::LeasepoolError>();
    let _ = std::any::type_name::<leasepool::LeaseManager>();
}

#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Process-wide instance lookup. Kept in its own binary so no other test
//! creates runtimes concurrently.

use {
    skiff_runtime::{Runtime, RuntimeOptions, instance},
    std::sync::Arc,
};

#[test]
fn current_is_the_single_live_runtime() {
    assert_eq!(instance::live_count(), 0);
    assert!(instance::current().is_none());

    let first = Runtime::new(RuntimeOptions::default());
    assert_eq!(instance::live_count(), 1);
    assert!(Arc::ptr_eq(&instance::current().unwrap(), &first));

    let second = Runtime::new(RuntimeOptions::default());
    assert_eq!(instance::live_count(), 2);
    assert!(instance::current().is_none());

    drop(first);
    assert_eq!(instance::live_count(), 1);
    assert!(Arc::ptr_eq(&instance::current().unwrap(), &second));

    drop(second);
    assert!(instance::current().is_none());
}

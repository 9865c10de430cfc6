//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::{Duration, Instant};

/// Upper bound for waiting on the reader thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Poll `condition` until it holds or [`test_timeout`] passes
pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

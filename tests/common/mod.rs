mod fixtures;
pub use fixtures::*;

use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` elapses. Returns whether it held.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

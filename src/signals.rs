//! Signal Handling for Graceful Shutdown
//!
//! The watched process runs in its own process group, so Ctrl+C in the
//! terminal only reaches the harness. The handler sets a flag; the runner
//! notices it, stops the script and tears the child down on its normal
//! cleanup path.
//!
//! The signal thread is a daemon and dies with the main thread.

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Global flag to signal shutdown was requested
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// How often `wait_for_shutdown` polls the flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Install SIGINT/SIGTERM/SIGQUIT handlers that request shutdown
pub fn install_signal_handlers() -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            warn!("received signal {}, shutting down...", sig);
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

/// Check if shutdown was requested
#[inline]
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Resolve once shutdown has been requested
pub async fn wait_for_shutdown() {
    while !shutdown_requested() {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_flag() {
        assert!(!shutdown_requested());

        let waiter = tokio::spawn(wait_for_shutdown());
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        assert!(shutdown_requested());
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();

        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    }
}

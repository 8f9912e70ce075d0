//! SIGINT handling for graceful capture shutdown.
//!
//! The handler itself only sets a static flag. A small poll thread moves
//! that flag onto the pipeline's [`ShutdownToken`], so the workers never
//! see anything but the token.

use hwts_pipeline::ShutdownToken;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the bridge thread checks the signal flag.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Set from the signal handler; async-signal-safe.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn sigint_handler(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Installed SIGINT handler bound to one shutdown token.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    token: ShutdownToken,
    signal_count: Arc<AtomicU32>,
}

impl SignalHandler {
    /// Register the SIGINT handler and start the bridge thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the handler cannot be registered or the
    /// bridge thread cannot be spawned.
    pub fn install(token: ShutdownToken) -> io::Result<Self> {
        let handler = Self {
            token,
            signal_count: Arc::new(AtomicU32::new(0)),
        };

        #[cfg(unix)]
        {
            // SAFETY: the handler only stores to an atomic
            let previous =
                unsafe { libc::signal(libc::SIGINT, sigint_handler as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
        }

        let bridge = handler.clone();
        std::thread::Builder::new()
            .name("hwts-signal".into())
            .spawn(move || bridge.poll_loop())?;

        debug!("SIGINT handler registered");
        Ok(handler)
    }

    fn poll_loop(&self) {
        loop {
            if INTERRUPTED.swap(false, Ordering::Relaxed) {
                self.signal_count.fetch_add(1, Ordering::Relaxed);
                if self.token.cancel() {
                    info!("SIGINT received, stopping capture");
                } else {
                    warn!("SIGINT received, shutdown already in progress");
                }
            }
            if !self.token.is_running() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Number of SIGINTs seen by the bridge thread.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

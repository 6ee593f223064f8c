//! Ctrl+C / SIGTERM handling for the long-running jobs.
//!
//! The first signal cancels the job token. Engines finish the item or
//! pipeline step in hand, save its checkpoint and return. A second signal
//! exits at once with status 130; the next run resumes from the last saved
//! checkpoint.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// Exit status of a forced stop, as for a shell-interrupted process.
const FORCED_EXIT_STATUS: i32 = 130;

/// What a received signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Drain,
    ForceExit,
}

/// Tracks how many stop signals arrived for one job.
#[derive(Debug, Default)]
struct StopRequests {
    received: AtomicU32,
}

impl StopRequests {
    /// Register one signal and cancel `token` on the first.
    fn record(&self, token: &CancellationToken) -> SignalAction {
        if self.received.fetch_add(1, Ordering::SeqCst) == 0 {
            token.cancel();
            SignalAction::Drain
        } else {
            SignalAction::ForceExit
        }
    }
}

#[cfg(unix)]
async fn next_signal(sigterm: &mut Option<tokio::signal::unix::Signal>) -> std::io::Result<()> {
    let term = async {
        match sigterm.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = term => Ok(()),
    }
}

/// Spawn the signal listener and return the token it cancels.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let job_token = token.clone();

    tokio::spawn(async move {
        let requests = StopRequests::default();

        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate())
                .map_err(|e| tracing::warn!("SIGTERM not handled: {}", e))
                .ok()
        };

        loop {
            #[cfg(unix)]
            let received = next_signal(&mut sigterm).await;
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await;

            if let Err(e) = received {
                tracing::warn!("Signal listener stopped: {}", e);
                return;
            }

            match requests.record(&job_token) {
                SignalAction::Drain => {
                    tracing::info!("Stopping after the current item; its checkpoint is kept");
                    tracing::info!("Interrupt again to quit immediately");
                }
                SignalAction::ForceExit => {
                    tracing::warn!("Quitting without waiting for the current item");
                    std::process::exit(FORCED_EXIT_STATUS);
                }
            }
        }
    });

    token
}

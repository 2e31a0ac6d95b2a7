//! Shutdown signal handling

use std::fmt;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process signal that asked hubsrv to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_signal() -> ShutdownSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| warn!("SIGTERM handler unavailable, only Ctrl+C stops hubsrv: {}", e))
            .ok();
        let terminated = async {
            match terminate.as_mut() {
                Some(sig) => {
                    sig.recv().await;
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
            _ = terminated => ShutdownSignal::Terminate,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownSignal::Interrupt
    }
}

/// Cancel `token` on the first shutdown signal
///
/// The task also ends when `token` is cancelled elsewhere, so one-shot
/// commands do not leave it behind.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {},
            signal = wait_for_signal() => {
                info!("{} received, stopping hubsrv", signal);
                token.cancel();
            },
        }
    })
}

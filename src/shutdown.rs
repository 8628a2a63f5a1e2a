//! Termination signal handling.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on the first SIGTERM or Ctrl+C.
///
/// The SIGTERM handler is registered before this returns, so a signal sent
/// right after start-up is not lost. A handler that cannot be installed is
/// logged and ignored. Must be called from within a Tokio runtime.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    #[cfg(unix)]
    let sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            None
        }
    };

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received interrupt"),
            _ = terminate => info!("received SIGTERM"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_exits_when_token_is_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let listener = cancel_on_signal(token.clone());

        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), listener)
            .await
            .expect("listener should stop")
            .unwrap();
    }
}

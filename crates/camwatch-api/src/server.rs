//! HTTP server task with a bounded graceful shutdown.

use std::io;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// Axum server running on its own task.
///
/// Open connections are allowed to finish during shutdown, but only for
/// the grace period; after that the server task is aborted.
pub struct HttpServer {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl HttpServer {
    pub fn spawn(listener: TcpListener, app: Router) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        });
        let task = tokio::spawn(async move { serve.await });

        Self {
            stop_tx,
            task: Some(task),
        }
    }

    /// Resolves when the server exits on its own.
    pub async fn stopped(&mut self) {
        match self.task.as_mut() {
            Some(task) => {
                log_exit(task.await);
                self.task = None;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Stop accepting connections and wait up to `grace` for open ones.
    ///
    /// Returns false if the server had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let _ = self.stop_tx.send(true);
        let Some(mut task) = self.task.take() else {
            return true;
        };

        match tokio::time::timeout(grace, &mut task).await {
            Ok(result) => {
                log_exit(result);
                true
            }
            Err(_) => {
                warn!(
                    "HTTP connections still open after {:.1}s, aborting server",
                    grace.as_secs_f64()
                );
                task.abort();
                false
            }
        }
    }
}

fn log_exit(result: Result<io::Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => warn!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }
}

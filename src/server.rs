//! Liveness HTTP surface. Kept outside the export pipeline on purpose: the
//! agent stays alive (and reports so) even when every cycle is failing.

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;

pub fn router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz() -> &'static str {
    "Ok"
}

/// Serves the health endpoint until the token is cancelled.
pub async fn serve(port: u16, token: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health server listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_answers_ok() {
        assert_eq!(healthz().await, "Ok");
    }

    #[tokio::test]
    async fn test_serve_shuts_down_on_cancellation() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve(0, token.clone()));

        token.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("shutdown in time")
            .expect("join");
        assert!(result.is_ok());
    }
}

//! Minimal HTTP endpoint so free-tier hosts see the process as alive.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::KeepAliveConfig;

const ALIVE: &str = "Bot is alive!";

fn router() -> Router {
    Router::new().route("/", get(alive))
}

async fn alive() -> &'static str {
    ALIVE
}

pub async fn bind(config: &KeepAliveConfig) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind keep-alive server to {addr}"))
}

/// Serve the liveness route until the process exits.
pub async fn serve(listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Keep-alive server listening on http://{}", addr);
    }
    axum::serve(listener, router())
        .await
        .context("Keep-alive server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn get(path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_root_reports_alive() {
        let (status, body) = get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ALIVE);
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let (status, _) = get("/admin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_reports_local_address() {
        let listener = bind(&KeepAliveConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..KeepAliveConfig::default()
        })
        .await
        .unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}

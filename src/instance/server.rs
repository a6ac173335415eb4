//! Loopback endpoint that receives argument lists from later launches
//!
//! # Routes
//!
//! - `POST /second-instance` - Forward an argument list (body: `{"argv": [...]}`)

use crate::events::{BridgeEvent, EventSender};
use crate::{BridgeError, Result};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Body of a forwarding request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedArgs {
    pub argv: Vec<String>,
}

/// The running endpoint; stops when dropped
pub struct ForwardingServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ForwardingServer {
    /// Bind `127.0.0.1` on an ephemeral port and start serving
    pub async fn start(events: EventSender) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| BridgeError::Instance(format!("Failed to bind forwarding endpoint: {}", e)))?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router(events))
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::warn!(error = %e, "Forwarding endpoint stopped");
            }
        });

        tracing::debug!(addr = %addr, "Forwarding endpoint listening");
        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for in-flight requests
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ForwardingServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn router(events: EventSender) -> Router {
    Router::new()
        .route("/second-instance", post(second_instance))
        .with_state(events)
}

async fn second_instance(
    State(events): State<EventSender>,
    Json(args): Json<ForwardedArgs>,
) -> StatusCode {
    tracing::info!(argc = args.argv.len(), "Received arguments from another launch");
    match events.send(BridgeEvent::SecondInstance(args.argv)) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Post `argv` to a primary instance listening on `addr`
pub async fn forward(client: &reqwest::Client, addr: SocketAddr, argv: &[String]) -> Result<()> {
    client
        .post(format!("http://{}/second-instance", addr))
        .json(&ForwardedArgs {
            argv: argv.to_vec(),
        })
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_route_queues_event() {
        let (tx, mut rx) = events::channel();
        let body = serde_json::json!({ "argv": ["app", "outlookbridge://x?email=a@b.com"] });

        let response = router(tx)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/second-instance")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::SecondInstance(vec![
                "app".to_string(),
                "outlookbridge://x?email=a@b.com".to_string()
            ])
        );
    }

    #[tokio::test]
    async fn test_route_rejects_when_loop_is_gone() {
        let (tx, rx) = events::channel();
        drop(rx);

        let response = router(tx)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/second-instance")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"argv":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_forward_over_loopback() {
        let (tx, mut rx) = events::channel();
        let server = ForwardingServer::start(tx).await.unwrap();

        let argv = vec!["outlookbridge://x?email=a@b.com".to_string()];
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        forward(&client, server.addr(), &argv)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), BridgeEvent::SecondInstance(argv));
        server.shutdown().await;
    }
}

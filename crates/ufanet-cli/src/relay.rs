use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use ufanet_core::{Error, UfanetClient};

/// One client per process; the mutex serializes handlers so a token
/// refresh in one request cannot race another.
pub type SharedClient = Arc<Mutex<UfanetClient>>;

pub fn create_router(client: SharedClient) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/intercoms/open", get(open_intercoms))
        .with_state(client)
}

pub async fn serve(client: UfanetClient, bind: SocketAddr) -> Result<()> {
    let shared: SharedClient = Arc::new(Mutex::new(client));
    let app = create_router(shared.clone());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shared.lock().await.close();
    info!("relay stopped");
    Ok(())
}

/// Lists every intercom on the contract and opens each in turn. Stops at
/// the first error.
pub async fn open_all(client: &mut UfanetClient) -> ufanet_core::Result<Vec<(i64, bool)>> {
    let intercoms = client.list_intercoms().await?;
    let mut outcomes = Vec::with_capacity(intercoms.len());
    for intercom in intercoms {
        let opened = client.open_intercom(intercom.id).await?;
        if !opened {
            warn!(intercom_id = intercom.id, "server refused to open intercom");
        }
        outcomes.push((intercom.id, opened));
    }
    Ok(outcomes)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn open_intercoms(State(client): State<SharedClient>) -> Result<Json<Value>, RelayError> {
    let mut client = client.lock().await;
    let outcomes = open_all(&mut client).await?;
    info!(count = outcomes.len(), "intercoms opened");
    Ok(Json(json!({ "success": true })))
}

struct RelayError(Error);

impl From<Error> for RelayError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::ClientConnector(_) | Error::Unknown { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::InvalidConfig(_) | Error::Closed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = self.0.kind(), status = status.as_u16(), "open intercoms failed: {}", self.0);
        let body = Json(json!({ "success": false, "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

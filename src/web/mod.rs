pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tracing::error;

use crate::comments::CommentPaginator;
use crate::config::Config;
use crate::sources::ExtractionBackend;
use crate::store::InteractionStore;

/// Estado compartido del servidor, inyectado en cada handler.
///
/// Una instancia por proceso; nada de singletons globales, así los tests
/// arman estados frescos y aislados.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<InteractionStore>,
    pub backend: Arc<dyn ExtractionBackend>,
    pub comments: Arc<CommentPaginator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/results", get(handlers::results))
        .route("/search", get(handlers::search))
        .route("/preview", get(handlers::preview))
        .route("/watch", get(handlers::watch))
        .route("/comments", get(handlers::comments))
        .with_state(state)
}

/// Error de aplicación: envuelve `anyhow` y responde JSON.
///
/// Los fallos del backend de extracción se propagan sin reintentos hasta
/// acá; el cliente recibe el motivo y decide si reintenta.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("❌ Error atendiendo request: {:#}", self.0);

        (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

use std::{future::Future, path::Path, sync::Arc};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use canvas::{CanvasError, SnapshotSource};
use log::error;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::services::ServeDir;

type Source = Arc<dyn SnapshotSource>;

/// Live canvas at `/place`, record at `/place/record`, static files for everything else.
pub fn router(source: Source, root: &Path, max_connections: usize) -> Router {
    Router::new()
        .route("/place", get(canvas_png))
        .route("/place/record", get(record_png))
        .fallback_service(ServeDir::new(root))
        .layer(GlobalConcurrencyLimitLayer::new(max_connections))
        .with_state(source)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn canvas_png(State(source): State<Source>) -> Response {
    png_response(source.canvas_snapshot())
}

async fn record_png(State(source): State<Source>) -> Response {
    match source.record_snapshot() {
        Some(snapshot) => png_response(snapshot),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn png_response(snapshot: Result<Vec<u8>, CanvasError>) -> Response {
    match snapshot {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(err) => {
            error!("could not encode snapshot: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

//! HTTP surface: landmark extraction and prediction endpoints.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anthropo_vision::LandmarkSource;
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::inference::{landmarks_to_json, InferenceAdapter};

pub type SharedSource = Arc<Mutex<Box<dyn LandmarkSource + Send>>>;
pub type SharedAdapter = Arc<Mutex<InferenceAdapter>>;

type Reply = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    pub source: SharedSource,
    pub adapter: SharedAdapter,
}

impl AppState {
    pub fn new(source: Box<dyn LandmarkSource + Send>, adapter: InferenceAdapter) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            adapter: Arc::new(Mutex::new(adapter)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/extract-face-mesh", post(extract_face_mesh))
        .route("/predict-autism", post(predict_autism))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn failure(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(json!({ "success": false, "message": message.into() })))
}

fn error_reply(e: &Error) -> Reply {
    if e.is_client_error() {
        log::warn!("rejected request: {}", e);
        failure(StatusCode::BAD_REQUEST, e.to_string())
    } else {
        log::error!("request failed: {}", e);
        failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

fn poisoned() -> Error {
    Error::Model("worker state poisoned by an earlier panic".into())
}

pub async fn extract_face_mesh(State(state): State<AppState>, mut multipart: Multipart) -> Reply {
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("image") => match field.bytes().await {
                Ok(bytes) => {
                    upload = Some(bytes);
                    break;
                }
                Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
        }
    }

    let Some(bytes) = upload else {
        return failure(StatusCode::BAD_REQUEST, "No image provided");
    };
    let source = state.source.clone();
    blocking(move || extract_reply(&source, &bytes)).await
}

/// Run model inference on the blocking pool so async workers stay free.
async fn blocking<F>(f: F) -> Reply
where
    F: FnOnce() -> Reply + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(reply) => reply,
        Err(e) => error_reply(&Error::Model(format!("inference task failed: {}", e))),
    }
}

/// Decode an uploaded image and run the shared landmark source on it.
pub fn extract_reply(source: &SharedSource, bytes: &[u8]) -> Reply {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => return error_reply(&Error::MalformedPayload(format!("undecodable image: {}", e))),
    };

    let detected = match source.lock() {
        Ok(mut source) => source.detect(&img).map_err(Error::from),
        Err(_) => Err(poisoned()),
    };

    match detected {
        Ok(faces) => match faces.first() {
            Some(face) => (
                StatusCode::OK,
                Json(json!({ "success": true, "faceMesh": landmarks_to_json(face) })),
            ),
            None => failure(StatusCode::OK, Error::DetectionEmpty.to_string()),
        },
        Err(e) => error_reply(&e),
    }
}

pub async fn predict_autism(State(state): State<AppState>, body: Bytes) -> Reply {
    let adapter = state.adapter.clone();
    blocking(move || predict_reply(&adapter, &body)).await
}

pub fn predict_reply(adapter: &SharedAdapter, body: &[u8]) -> Reply {
    let result = match adapter.lock() {
        Ok(mut adapter) => adapter.predict_json(body),
        Err(_) => Err(poisoned()),
    };

    match result {
        Ok(p) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "prediction": p.prediction,
                "confidence": p.confidence,
            })),
        ),
        Err(e) => error_reply(&e),
    }
}

use axum::{
    body::Body,
    extract::State,
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info, warn };
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{ Any, CorsLayer };

use super::upstream::{ replay_frames, simulated_frames, UpstreamClient, UpstreamError };
use crate::config::prompt::SubjectPrompts;
use crate::models::chat::ChatRequest;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
pub struct RelayState {
    pub upstream: Arc<UpstreamClient>,
    pub prompts: Arc<SubjectPrompts>,
    pub simulate_streaming: bool,
    pub simulated_pause: Duration,
}

pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(State(state): State<RelayState>, Json(req): Json<ChatRequest>) -> Response {
    if req.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "La conversation est vide.");
    }
    let system_prompt = state.prompts.for_subject(&req.subject);
    info!("Relaying {} turns for subject '{}'", req.messages.len(), req.subject);

    if state.simulate_streaming {
        return match state.upstream.complete(system_prompt, &req.messages).await {
            Ok(answer) => {
                let frames = simulated_frames(&answer);
                info!("Simulating stream with {} frames", frames.len());
                sse_response(Body::from_stream(replay_frames(frames, state.simulated_pause)))
            }
            Err(e) => upstream_failure(e),
        };
    }

    match state.upstream.stream(system_prompt, &req.messages).await {
        Ok(body) => sse_response(Body::from_stream(body)),
        Err(e) => upstream_failure(e),
    }
}

fn sse_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    ).into_response()
}

fn upstream_failure(err: UpstreamError) -> Response {
    match err {
        UpstreamError::Status { status: 402, .. } => {
            warn!("Upstream reports exhausted credits");
            error_response(StatusCode::PAYMENT_REQUIRED, "Crédits insuffisants.")
        }
        UpstreamError::Status { status: 429, .. } => {
            warn!("Upstream rate limit hit");
            error_response(StatusCode::TOO_MANY_REQUESTS, "Limite de requêtes atteinte.")
        }
        other => {
            error!("Upstream failure: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

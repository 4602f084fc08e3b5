use crate::upstream::Upstream;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{middleware, HttpResponse};
use protocol::Envelope;
use std::sync::Arc;

pub mod protocol;
pub mod routes;

/// Every way a relay request can fail. Each variant becomes an error
/// envelope; nothing escapes the handler.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("image_base64 required")]
    MissingImage,

    /// The upstream answered with a non-success status. `body` is its raw
    /// response text
    #[error("{body}")]
    Upstream { status: u16, body: String },

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Unexpected(#[from] anyhow::Error),
}

impl actix_web::error::ResponseError for RelayError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(Envelope::failure(self.to_string()))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingImage => StatusCode::BAD_REQUEST,
            RelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Shared handler state: the upstream client and what to ask it for
pub struct Relay {
    pub upstream: Arc<dyn Upstream>,
    pub model: String,
    pub max_output_tokens: u32,
}

impl Relay {
    pub fn new(upstream: Arc<dyn Upstream>, model: String, max_output_tokens: u32) -> Self {
        Relay {
            upstream,
            model,
            max_output_tokens,
        }
    }
}

/// Attaches the CORS headers to every response, including ones actix
/// generates itself (404, 405, payload errors)
pub fn cors() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
        .add(("Access-Control-Allow-Methods", "POST, OPTIONS"))
}

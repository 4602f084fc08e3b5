//! The user-facing JSON endpoint. A POST carries an ECG image; the handler
//! builds the prompt, makes one upstream call and answers with an envelope.

use super::protocol::Envelope;
use super::{Relay, RelayError};
use crate::interpret::{normalize, output_text};
use crate::prompt::{EcgRequest, UpstreamPayload};
use actix_web::http::header::ContentType;
use actix_web::{get, options, post, web, HttpResponse};
use anyhow::anyhow;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, RelayError>;

/// Register the relay's routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(preflight).service(interpret_ecg).service(health);
}

/// CORS pre-flight. The headers come from the `cors` middleware
#[options("/ecg")]
pub async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

#[post("/ecg")]
pub async fn interpret_ecg(
    body: std::result::Result<web::Bytes, actix_web::Error>,
    state: web::Data<Relay>,
) -> Result<HttpResponse> {
    match relay(body, &state).await {
        Ok(envelope) => Ok(HttpResponse::Ok()
            .content_type(ContentType::json())
            .json(envelope)),
        Err(err) => {
            warn!(error = %err, "ECG request failed");
            Err(err)
        }
    }
}

async fn relay(body: std::result::Result<web::Bytes, actix_web::Error>, state: &Relay) -> Result<Envelope> {
    let body = body.map_err(|e| anyhow!("could not read request body: {e}"))?;

    // Parse the input request
    let request = EcgRequest::from_body(&body)?;
    let payload = UpstreamPayload::new(&state.model, state.max_output_tokens, &request)?;
    debug!("forwarding {request:?} to {}", state.model);

    let reply = state.upstream.respond(&payload).await?;
    if reply.is_null() {
        return Err(anyhow!("upstream reply is null").into());
    }
    let interpretation = normalize(&output_text(&reply));

    match interpretation.report() {
        Some(report) => info!(
            red_flags = report.red_flags.len(),
            "finished serving interpretation request"
        ),
        None => info!("finished serving interpretation request (unstructured reply)"),
    }

    Ok(Envelope::success(interpretation))
}

/// Liveness probe. Does not touch the upstream
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(Envelope::alive())
}

//! Handlers for the PescaLead API

use crate::common::error::{Error, ErrorResponse};
use crate::rate_limit::RateLimited;

use std::convert::Infallible;
use tracing::{debug, error};
use warp::{http::StatusCode, reply::Response, Rejection, Reply};

/// Campaign queue handlers.
pub mod campaign;
/// Company registry handlers.
pub mod cnpj;
/// Column handlers.
pub mod column;
/// Follow-up queue handlers.
pub mod follow_up;
/// Funnel handlers.
pub mod funnel;
/// Health handlers.
pub mod health;
/// Lead handlers.
pub mod lead;
/// AI message sender handlers.
pub mod messaging;
/// AI pipeline handlers.
pub mod pipeline;
/// Funnel statistics handlers.
pub mod stats;

fn error_reply(message: impl Into<String>, status: StatusCode) -> Response {
    let json = warp::reply::json(&ErrorResponse { error: message.into() });
    warp::reply::with_status(json, status).into_response()
}

/// Central error handler for Warp rejections, converting them to appropriate HTTP responses.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply("Route not found", StatusCode::NOT_FOUND));
    }

    if let Some(RateLimited(decision)) = err.find::<RateLimited>() {
        debug!(retry_after = ?decision.retry_after_secs, "rate limited");
        return Ok(decision.too_many_requests());
    }

    if let Some(e) = err.find::<Error>() {
        return Ok(error_reply(e.error_message(), e.status_code()));
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        debug!(%e, "invalid body");
        return Ok(error_reply("Invalid JSON body", StatusCode::BAD_REQUEST));
    }

    if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        debug!(%e, "cors preflight refused");
        return Ok(error_reply(e.to_string(), StatusCode::FORBIDDEN));
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply("Method not allowed", StatusCode::METHOD_NOT_ALLOWED));
    }

    if err.find::<warp::reject::InvalidQuery>().is_some() {
        return Ok(error_reply("Invalid query string", StatusCode::BAD_REQUEST));
    }

    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply("Payload too large", StatusCode::PAYLOAD_TOO_LARGE));
    }

    error!("Unhandled error: {:?}", err);
    Ok(error_reply(
        "Internal server error",
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn reply_for(rejection: Rejection) -> (StatusCode, serde_json::Value) {
        let response = handle_rejection(rejection).await.unwrap();
        let status = response.status();
        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (status, body) = reply_for(warp::reject::not_found()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");
    }

    #[tokio::test]
    async fn custom_errors_keep_their_status() {
        let rejection = warp::reject::custom(Error::Forbidden("nope".to_string()));
        let (status, body) = reply_for(rejection).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "nope");
    }
}

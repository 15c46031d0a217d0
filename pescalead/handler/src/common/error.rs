//! Top-level error type for the PescaLead handlers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use warp::{reject::Reject, reply::Reply};

/// Errors from the internal API logic.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A request failed with a status chosen by the handler and a message
    /// that is forwarded to the caller as is.
    #[error("HTTP request failed with status code {0}: {1}")]
    HttpRequest(StatusCode, String),

    /// The request was unacceptable, usually a missing or malformed field.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Mismatch between the expected response data model and what an
    /// upstream API returned.
    #[error("Invalid API response structure")]
    InvalidApiResponse,

    /// An upstream body could not be decoded into the expected type.
    #[error("Upstream decode error: {0}")]
    UpstreamDecode(String),

    /// A configured base URL cannot address an upstream endpoint.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but has no access to the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The endpoint exists but not for this method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The managed database rejected a REST or RPC call.
    #[error("Database error ({code:?}): {message}")]
    Database {
        /// Postgres or PostgREST error code, e.g. `42501` or `PGRST116`.
        code: Option<String>,
        /// Human readable message from the database.
        message: String,
    },

    /// The direct Postgres connection failed.
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A WhatsApp provider answered with a failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Internal error
    #[error("Internal server error")]
    InternalServer,

    /// Server may be unavailable or not ready to handle the request
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Error implementation.
impl Error {
    /// Provides the status code that corresponds to the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::HttpRequest(code, _) => *code,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::InvalidApiResponse => StatusCode::BAD_GATEWAY,
            Error::UpstreamDecode(_) => StatusCode::BAD_GATEWAY,
            Error::InvalidEndpoint(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Provides the error message that corresponds to the error.
    pub fn error_message(&self) -> String {
        match self {
            Error::HttpRequest(_, msg) => msg.clone(),
            Error::BadRequest(msg) => msg.clone(),
            Error::Network(err) => format!("Network error: {err}"),
            Error::Serialization(msg) => format!("Error in processing the data: {msg}"),
            Error::InvalidApiResponse => "Invalid API response structure".to_string(),
            Error::UpstreamDecode(msg) => format!("Invalid upstream response: {msg}"),
            Error::InvalidEndpoint(_) => "Internal server error".to_string(),
            Error::Unauthorized(msg) => msg.clone(),
            Error::Forbidden(msg) => msg.clone(),
            Error::NotFound(msg) => msg.clone(),
            Error::MethodNotAllowed => "Method not allowed".to_string(),
            Error::Database { message, .. } => message.clone(),
            Error::Sqlx(_) => "Service temporarily unavailable".to_string(),
            Error::Provider(msg) => msg.clone(),
            Error::Config(err) => format!("Configuration error: {err}"),
            Error::InternalServer => "Internal server error".to_string(),
            Error::ServiceUnavailable(msg) => msg.clone(),
        }
    }

    /// Returns the database error code when the error came from the managed
    /// database.
    pub fn database_code(&self) -> Option<&str> {
        match self {
            Error::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl Error {
    /// Wraps a failure to decode a body returned by an upstream service.
    pub fn upstream_decode(err: serde_json::Error) -> Self {
        Error::UpstreamDecode(err.to_string())
    }
}

/// Decoding errors on request bodies; upstream bodies go through
/// [`Error::upstream_decode`].
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Structure representing an error response.
/// This is used to serialize error messages in HTTP responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// The error message.
    pub error: String,
}

/// Implement reject for error.
impl Reject for Error {}

/// Implement reply for internal error representation so that the error can be
/// provided directly from Warp as a reply.
impl Reply for Error {
    /// Convert self into a warp response.
    fn into_response(self) -> warp::reply::Response {
        warp::reply::with_status(
            warp::reply::json(&ErrorResponse { error: self.error_message() }),
            self.status_code(),
        )
        .into_response()
    }
}

//! HTTP handlers for the referrer and referrer type resources.
//!
//! Every handler follows the same order: the `AuthUser` argument authenticates,
//! the role check runs first in the body, then the existence check, then body
//! decoding and validation, then the store call. Wrong verbs never reach a
//! handler: the routers answer them with `method_not_allowed`.

use axum::{body::Bytes, extract::rejection::BytesRejection};
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::{error::ApiError, repository::RepoError};

pub mod referrer_types;
pub mod referrers;

/// Request body as handed to the handlers. A failed read (size limit, broken
/// stream) is only reported once the handler reaches `decode_body`.
pub type RawBody = Result<Bytes, BytesRejection>;

/// decode_body
///
/// Decodes a JSON request body. The raw bytes are taken instead of `Json<T>` so
/// the existence check can run first and so parser errors use the envelope.
///
/// Syntax errors keep the parser message behind "Invalid JSON: ". Well-formed
/// JSON with a wrongly typed field reports the field message alone.
pub fn decode_body<T: DeserializeOwned>(body: RawBody) -> Result<T, ApiError> {
    let body = body?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("No data provided".to_string()));
    }

    serde_json::from_slice(&body).map_err(|e| match e.classify() {
        Category::Data => ApiError::BadRequest(without_position(&e)),
        _ => ApiError::BadRequest(format!("Invalid JSON: {}", e)),
    })
}

fn without_position(err: &serde_json::Error) -> String {
    let message = err.to_string();
    let suffix = format!(" at line {} column {}", err.line(), err.column());
    match message.strip_suffix(&suffix) {
        Some(stripped) => stripped.to_string(),
        None => message,
    }
}

/// parse_id
///
/// Path ids that are not integers cannot name a row, so they are reported as
/// not found rather than as a routing error.
pub fn parse_id(raw: &str, not_found: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::NotFound(not_found.to_string()))
}

/// store_failure
///
/// Logs an unexpected store error and hides it behind `message`.
pub fn store_failure(message: &str, err: RepoError) -> ApiError {
    tracing::error!(error = %err, "{}", message);
    ApiError::Internal(message.to_string())
}

/// Fallback for a known path requested with an unsupported verb.
pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Fallback for paths no router knows.
pub async fn endpoint_not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}

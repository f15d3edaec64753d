use crate::models::ErrorResponse;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};

/// Error taxonomy for the whole backend. Provider failures that can be
/// degraded (search -> empty list, transcript -> none) are absorbed at the
/// adapter layer and never reach a handler; everything here maps onto a
/// structured JSON response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("no summary tokens remaining")]
    OutOfTokens,

    #[error("missing configuration: {0}")]
    Config(String),

    #[error("no transcripts available to summarize")]
    NoTranscriptsAvailable,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] elasticsearch::Error),
}

impl ApiError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ApiError::ProviderTimeout(_) => "provider_timeout",
            ApiError::Provider(_) => "provider_error",
            ApiError::Validation(_) => "validation_error",
            ApiError::Authorization(_) => "authorization_error",
            ApiError::OutOfTokens => "out_of_tokens",
            ApiError::Config(_) => "config_error",
            ApiError::NoTranscriptsAvailable => "no_transcripts",
            ApiError::NotFound(_) => "not_found",
            ApiError::HttpRequest(_) => "http_error",
            ApiError::SerdeJson(_) => "serde_error",
            ApiError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation(_) | ApiError::Config(_) | ApiError::NoTranscriptsAvailable => {
                Status::BadRequest
            }
            ApiError::Authorization(_) | ApiError::OutOfTokens => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            _ => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        // Handlers never leak internals beyond the error message itself.
        ErrorResponse {
            status: self.status(),
            success: false,
            error: self.code_str().to_string(),
            message: self.to_string(),
        }
        .respond_to(request)
    }
}

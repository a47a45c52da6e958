//! Admission review codec
//!
//! The codec is constructed once at startup and handed to the gateway. It
//! owns every wire concern: content negotiation, envelope decoding, patch
//! conversion and response encoding.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use thiserror::Error;
use warden_core::Patch;

/// Default upper bound for a review body
pub const DEFAULT_MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

/// Errors raised before any rule runs
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported content type '{0}', expected application/json")]
    UnsupportedMediaType(String),

    #[error("request body of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("malformed admission review: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    #[error("failed to encode admission review: {0}")]
    Encode(String),
}

impl IntoResponse for CodecError {
    fn into_response(self) -> Response {
        let status = match &self {
            CodecError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CodecError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CodecError::Malformed(_) | CodecError::InvalidReview(_) => StatusCode::BAD_REQUEST,
            CodecError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Encoder and decoder for admission reviews
#[derive(Debug, Clone)]
pub struct ReviewCodec {
    max_body_bytes: usize,
}

impl Default for ReviewCodec {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ReviewCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Require `application/json`; parameters such as `charset` are ignored
    pub fn check_content_type(&self, headers: &HeaderMap) -> Result<(), CodecError> {
        let value = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let media_type = value.split(';').next().unwrap_or_default().trim();

        if media_type.eq_ignore_ascii_case("application/json") {
            Ok(())
        } else {
            Err(CodecError::UnsupportedMediaType(value.to_string()))
        }
    }

    /// Decode a review body into its request
    pub fn decode(&self, body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, CodecError> {
        if body.len() > self.max_body_bytes {
            return Err(CodecError::TooLarge {
                size: body.len(),
                max: self.max_body_bytes,
            });
        }

        let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body)?;
        review
            .try_into()
            .map_err(|e: kube::core::admission::ConvertAdmissionReviewError| {
                CodecError::InvalidReview(e.to_string())
            })
    }

    /// Convert a patch into the representation carried by responses
    pub fn patch(&self, patch: &Patch) -> Result<json_patch::Patch, CodecError> {
        let value = serde_json::to_value(patch).map_err(|e| CodecError::Encode(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn encode(&self, review: &AdmissionReview<DynamicObject>) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(review).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

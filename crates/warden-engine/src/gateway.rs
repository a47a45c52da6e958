//! Webhook gateway
//!
//! Decodes admission reviews, dispatches them to the handler registered for
//! the resource kind and encodes the answer. Both webhooks fail closed:
//! unknown kinds, missing handlers and internal errors all deny the request.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, error, info, warn};
use warden_kube::AdmissionError;

use crate::codec::{CodecError, ReviewCodec};
use crate::env::Env;
use crate::registry::Registry;
use crate::request::ReviewRequest;

/// Everything a webhook request needs
pub struct Gateway {
    registry: Registry,
    codec: ReviewCodec,
    env: Env,
}

impl Gateway {
    pub fn new(registry: Registry, codec: ReviewCodec, env: Env) -> Self {
        Self {
            registry,
            codec,
            env,
        }
    }

    pub fn codec(&self) -> &ReviewCodec {
        &self.codec
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the mutation handler for a decoded request
    pub async fn admit_mutation(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let response = AdmissionResponse::from(request);
        let review = match ReviewRequest::from_admission(request) {
            Ok(review) => review,
            Err(e) => return deny(response, &request.uid, "mutate", &e),
        };
        let Some(mutator) = self.registry.mutator(review.kind) else {
            warn!(uid = %review.uid, kind = %review.kind, "no mutation handler registered");
            return response.deny(format!("no mutation handler registered for {}", review.kind));
        };

        let patch = match mutator.mutate(&review, &self.env).await {
            Ok(patch) => patch,
            Err(e) => return deny(response, &review.uid, "mutate", &e),
        };

        info!(
            uid = %review.uid,
            kind = %review.kind,
            operation = %review.operation,
            patch_operations = patch.len(),
            "mutation admitted"
        );
        if patch.is_empty() {
            return response;
        }

        let result = self
            .codec
            .patch(&patch)
            .map_err(|e| e.to_string())
            .and_then(|patch| response.clone().with_patch(patch).map_err(|e| e.to_string()));
        match result {
            Ok(response) => response,
            Err(e) => {
                error!(uid = %review.uid, error = %e, "failed to serialize patch");
                response.deny(warden_kube::INTERNAL_ERROR_MESSAGE)
            }
        }
    }

    /// Run the validation handler for a decoded request
    pub async fn admit_validation(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> AdmissionResponse {
        let response = AdmissionResponse::from(request);
        let review = match ReviewRequest::from_admission(request) {
            Ok(review) => review,
            Err(e) => return deny(response, &request.uid, "validate", &e),
        };
        let Some(validator) = self.registry.validator(review.kind) else {
            warn!(uid = %review.uid, kind = %review.kind, "no validation handler registered");
            return response.deny(format!("no validation handler registered for {}", review.kind));
        };

        match validator.validate(&review, &self.env).await {
            Ok(decision) => {
                info!(
                    uid = %review.uid,
                    kind = %review.kind,
                    operation = %review.operation,
                    allowed = decision.allowed,
                    "validation finished"
                );
                match decision.reason {
                    Some(reason) if !decision.allowed => response.deny(reason),
                    _ => response,
                }
            }
            Err(e) => deny(response, &review.uid, "validate", &e),
        }
    }
}

/// Deny with the message the caller may see, logging internal failures
fn deny(response: AdmissionResponse, uid: &str, webhook: &str, e: &AdmissionError) -> AdmissionResponse {
    if e.is_user_facing() {
        info!(%uid, webhook, reason = %e, "request denied");
    } else {
        error!(%uid, webhook, error = %e, "admission failed");
    }
    response.deny(e.public_message())
}

/// Router serving both webhooks and the liveness probe
pub fn router(gateway: Arc<Gateway>) -> Router {
    let limit = gateway.codec.max_body_bytes();
    Router::new()
        .route("/mutate", post(mutate))
        .route("/validate", post(validate))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(gateway)
}

async fn mutate(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, CodecError> {
    let request = decode(&gateway, &headers, &body)?;
    let response = gateway.admit_mutation(&request).await;
    encode(&gateway, response)
}

async fn validate(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, CodecError> {
    let request = decode(&gateway, &headers, &body)?;
    let response = gateway.admit_validation(&request).await;
    encode(&gateway, response)
}

async fn healthz() -> &'static str {
    "ok"
}

fn decode(
    gateway: &Gateway,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<AdmissionRequest<DynamicObject>, CodecError> {
    let codec = gateway.codec();
    codec
        .check_content_type(headers)
        .and_then(|()| codec.decode(body))
        .inspect(|request| debug!(uid = %request.uid, "decoded admission review"))
        .inspect_err(|e| warn!(error = %e, "rejecting admission review"))
}

fn encode(gateway: &Gateway, response: AdmissionResponse) -> Result<Response, CodecError> {
    let body = gateway.codec().encode(&response.into_review())?;
    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}

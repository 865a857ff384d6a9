// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON envelope for the control plane.
//!
//! Every response carries `error: bool`. Failures stay on the envelope
//! (HTTP 200 with `error: true` and a human-readable message); internal
//! traces are logged, never returned.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

pub struct ApiError(pub String);

impl ApiError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<cabnet::FleetError> for ApiError {
    fn from(e: cabnet::FleetError) -> Self {
        Self(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(message = %self.0, "request failed");
        Json(json!({ "error": true, "message": self.0 })).into_response()
    }
}

pub type ApiResult = Result<Json<Value>, ApiError>;

/// Wrap a payload object in the success envelope.
pub fn ok(mut payload: Value) -> Json<Value> {
    if let Some(object) = payload.as_object_mut() {
        object.insert("error".to_owned(), Value::Bool(false));
    }
    Json(payload)
}

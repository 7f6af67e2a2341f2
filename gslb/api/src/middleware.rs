// Copyright 2026 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Request middleware: bearer-token authorization and request logging.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use gslb_tokens::AuthError;

use crate::{ApiState, error::ApiError};

/// Validates the bearer token against the request method and route.
pub async fn require_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let route = request.uri().path().to_string();

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ApiError::Unauthorized("missing bearer token".to_string()).into_response();
    };

    match state.validator.validate(token, &method, &route) {
        Ok(claims) => {
            tracing::debug!(role = %claims.name, method, route, "authorized request");
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(method, route, error = %err, "token validation failed");
            match err {
                AuthError::Unauthorized(msg) => ApiError::Unauthorized(msg).into_response(),
                AuthError::Forbidden(msg) => ApiError::Forbidden(msg).into_response(),
            }
        }
    }
}

/// Tags every request with an id and logs it on the way in and out.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::now_v7();
    let method = request.method().clone();
    let route = request.uri().path().to_string();

    tracing::info!(
        %request_id,
        %method,
        route,
        "incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        %request_id,
        %method,
        route,
        status = response.status().as_u16(),
        "request served"
    );
    response
}

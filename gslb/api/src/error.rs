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
//! Admin API error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gslb_core::ManagerError;
use gslb_models::RepoError;
use serde::{Deserialize, Serialize};

/// JSON error body shared with API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Stable machine-readable error title.
    pub title: String,
    /// Human-readable context.
    pub details: String,
}

/// Errors surfaced by admin API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request is malformed or conflicts with current state.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal operation failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// The request carries no acceptable token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The token does not grant the route.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            title: self.title().to_string(),
            details: match &self {
                ApiError::Internal(_) => String::new(),
                other => other.to_string(),
            },
        };
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "internal error serving admin request");
        }
        (status, Json(body)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(member_of) => {
                ApiError::NotFound(format!("no spoof stored for {member_of:?}"))
            }
            RepoError::AlreadyOverridden(member_of) => {
                ApiError::InvalidInput(format!("{member_of:?} already has an active override"))
            }
            RepoError::NoOverride(member_of) => {
                ApiError::NotFound(format!("{member_of:?} has no active override"))
            }
            RepoError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::GroupNotFound(fqdn) => {
                ApiError::NotFound(format!("no registered service group for {fqdn:?}"))
            }
            ManagerError::ServiceNotFound(id) => {
                ApiError::NotFound(format!("service not found: {id}"))
            }
            other => ApiError::InvalidInput(other.to_string()),
        }
    }
}

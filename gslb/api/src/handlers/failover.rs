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
//! Operator-triggered failover endpoint.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gslb_models::Failover;

use crate::{ApiState, error::ApiError};

/// `POST /failover/{fqdn}`: promote the member in the requested
/// datacenter, provided it is healthy.
pub async fn failover(
    State(state): State<ApiState>,
    Path(fqdn): Path<String>,
    Json(request): Json<Failover>,
) -> Result<StatusCode, ApiError> {
    state.manager.failover(&fqdn, &request)?;
    tracing::warn!(%fqdn, datacenter = %request.datacenter, "operator failover executed");
    Ok(StatusCode::OK)
}

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
//! Spoof read endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use gslb_models::{Page, PageParams, Spoof};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

/// Response of `GET /spoofs/hash`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HashResponse {
    /// Lowercase hex SHA-256 of the sorted spoof set.
    pub hash: String,
}

/// `GET /spoofs`: the installed spoof set, paginated and sorted by fqdn.
pub async fn list(
    State(state): State<ApiState>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Spoof>>, ApiError> {
    let mut spoofs = state
        .repo
        .all()
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    spoofs.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));

    Ok(Json(Page::paginate(spoofs, &params)))
}

/// `GET /spoofs/hash`: stable digest of the spoof set, for cross-process
/// configuration validation.
pub async fn hash(State(state): State<ApiState>) -> Result<Json<HashResponse>, ApiError> {
    let hash = state
        .repo
        .hash()
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(HashResponse { hash }))
}

/// `GET /spoofs/{fqdn}`: the spoof installed for one group.
pub async fn get_one(
    State(state): State<ApiState>,
    Path(fqdn): Path<String>,
) -> Result<Json<Spoof>, ApiError> {
    if fqdn.is_empty() {
        return Err(ApiError::InvalidInput("empty fqdn is not valid".to_string()));
    }

    state
        .repo
        .get(&fqdn)
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no spoof stored for {fqdn:?}")))
}

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
//! Spoof override endpoints.
//!
//! Overrides pin a group's answer to a manually chosen address and
//! suppress every automated update until cleared. They exist for
//! emergencies; the graceful alternative is a failover.

use std::net::IpAddr;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gslb_models::{OverrideRequest, SpoofRecord};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

/// Body of `DELETE /spoofs/override`.
#[derive(Debug, Deserialize)]
pub struct ClearOverrideRequest {
    /// The group to unpin.
    #[serde(rename = "memberOf", alias = "fqdn")]
    pub member_of: String,
}

/// Body of `PUT /spoofs/override/{member_of}`.
#[derive(Debug, Deserialize)]
pub struct UpdateOverrideRequest {
    /// The new pinned address.
    pub ip: IpAddr,
}

/// `GET /spoofs/override/{member_of}`: the active override, or 404.
pub async fn get_one(
    State(state): State<ApiState>,
    Path(member_of): Path<String>,
) -> Result<Json<SpoofRecord>, ApiError> {
    let record = state
        .repo
        .get_record(&member_of)
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no spoof stored for {member_of:?}")))?;

    if !record.has_override {
        return Err(ApiError::NotFound(format!(
            "{member_of:?} has no active override"
        )));
    }
    Ok(Json(record))
}

/// `POST /spoofs/override`: pin a group to an address.
pub async fn create(
    State(state): State<ApiState>,
    Json(request): Json<OverrideRequest>,
) -> Result<StatusCode, ApiError> {
    state.repo.create_override(&request.member_of, request.ip)?;
    tracing::warn!(member_of = %request.member_of, ip = %request.ip, "spoof override created");
    Ok(StatusCode::CREATED)
}

/// `PUT /spoofs/override/{member_of}`: re-pin to a new address.
pub async fn update(
    State(state): State<ApiState>,
    Path(member_of): Path<String>,
    Json(request): Json<UpdateOverrideRequest>,
) -> Result<StatusCode, ApiError> {
    state.repo.update_override(&member_of, request.ip)?;
    tracing::warn!(%member_of, ip = %request.ip, "spoof override updated");
    Ok(StatusCode::CREATED)
}

/// `DELETE /spoofs/override`: unpin a group.
///
/// The automated answer is restored immediately from the registry's
/// current active member; subsequent promotions flow through again.
pub async fn clear(
    State(state): State<ApiState>,
    Json(request): Json<ClearOverrideRequest>,
) -> Result<StatusCode, ApiError> {
    state.repo.clear_override(&request.member_of)?;

    if let Some(active) = state.manager.active_for(&request.member_of) {
        state
            .repo
            .upsert(&request.member_of, active.spoof())
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }

    tracing::warn!(member_of = %request.member_of, "spoof override removed");
    Ok(StatusCode::NO_CONTENT)
}

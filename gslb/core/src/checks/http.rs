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
//! HTTP(S) probe.

use reqwest::StatusCode;

use crate::checks::{CheckError, MAX_BODY_SIZE, lua::LuaValidator};

/// Runs one HTTP(S) check.
///
/// A 503 is a failure regardless of any configured script: the server is
/// reachable but has taken itself out of rotation. With a script, the
/// script decides; without one, every other answer counts as up.
pub(crate) async fn check(
    client: &reqwest::Client,
    url: &str,
    validator: Option<&LuaValidator>,
) -> Result<(), CheckError> {
    let response = client.get(url).send().await?;
    let status = response.status();

    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(CheckError::Status(status.as_u16()));
    }

    let Some(validator) = validator else {
        return Ok(());
    };

    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = read_capped(response).await?;
    validator.validate(status.as_u16(), &headers, &body).await?;

    Ok(())
}

/// Reads the response body up to [MAX_BODY_SIZE]; longer bodies fail the
/// check instead of buffering unbounded data from an unhealthy backend.
async fn read_capped(mut response: reqwest::Response) -> Result<String, CheckError> {
    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > MAX_BODY_SIZE {
            return Err(CheckError::BodyTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

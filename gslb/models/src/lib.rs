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
//! Shared data models for the GSLB control plane.
//!
//! Contains the wire form of zone-provisioned service configuration, the
//! spoof contract shared with the downstream DNS rewriter, the admin API
//! request/response models, and the spoof repository.

pub mod config;
pub mod failover;
pub mod pagination;
pub mod repo;
pub mod spoof;

pub use config::{
    CheckKind, ConfigError, DEFAULT_FAILURE_THRESHOLD, MAX_CHECK_INTERVAL, MIN_CHECK_INTERVAL,
    ServiceConfig,
};
pub use failover::Failover;
pub use pagination::{Page, PageParams};
pub use repo::{RepoError, SpoofRepository};
pub use spoof::{OverrideRequest, Spoof, SpoofRecord, spoof_set_hash};

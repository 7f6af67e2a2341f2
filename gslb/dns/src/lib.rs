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
//! DNS plumbing of the GSLB control plane.
//!
//! [poller::ZonePoller] pulls the configuration zone over AXFR and emits
//! full snapshots; [handler::ZoneHandler] reconciles snapshots into the
//! service registry and forwards health transitions to
//! [updater::DnsUpdater], which drives the downstream DNS rewriter over
//! its REST interface.

pub mod handler;
pub mod poller;
pub mod updater;

pub use handler::ZoneHandler;
pub use poller::{PollError, ZonePoller, ZoneRecord};
pub use updater::{DnsUpdater, UpdateError};

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
//! Core health-checking and arbitration engine of the GSLB control plane.
//!
//! The registry owns every live [service::Service]. Each service belongs to
//! one [group::ServiceGroup] (keyed by the group FQDN it answers for) and
//! one [scheduler::Scheduler] bucket (keyed by its current check interval).
//! Schedulers emit ticks into the [pool::WorkerPool], workers run probes,
//! probe outcomes drive the per-service health state machine, health flips
//! drive group arbitration, and arbitration emits promotion events that the
//! [manager::ServiceManager] turns into interval moves and DNS updates.
//!
//! ```text
//! scheduler tick ─▶ worker pool ─▶ probe ─▶ service state machine
//!                                                    │ health flip
//!                                                    ▼
//!              DNS update ◀─ manager ◀─ promotion ◀─ group arbiter
//! ```

pub mod checks;
pub mod group;
pub mod manager;
pub mod pool;
pub mod roundtrip;
pub mod scheduler;
pub mod service;

pub use manager::{ManagerError, ManagerOptions, QueryManager, ServiceManager};
pub use service::Service;

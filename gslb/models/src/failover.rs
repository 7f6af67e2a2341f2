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
//! Operator-triggered failover request.

use serde::{Deserialize, Serialize};

/// Request to promote a specific datacenter's member for a group.
///
/// Unlike an override this is a graceful action: the target member must be
/// healthy, and automated arbitration continues afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failover {
    /// The datacenter whose member should become active.
    pub datacenter: String,
}

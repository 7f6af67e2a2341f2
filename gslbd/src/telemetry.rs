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
//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter honours `RUST_LOG`; without it, `info` is the default. Dev
/// mode uses the human-friendly pretty format, production the compact one.
pub fn init(dev_mode: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if dev_mode {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

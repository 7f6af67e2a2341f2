// Copyright 2025 Anapaya Systems
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
//! Backoff utility functions.

use std::time::Duration;

/// Configuration for [ExponentialBackoff].
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// The minimum delay in seconds, used for attempt 0.
    pub minimum_delay_secs: f32,
    /// The maximum delay in seconds. Delays are clamped to this value.
    pub maximum_delay_secs: f32,
    /// The factor to multiply the delay by for each attempt.
    pub factor: f32,
    /// The jitter to add to the delay.
    pub jitter_secs: f32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            minimum_delay_secs: 0.5,
            maximum_delay_secs: 30.0,
            factor: 2.0,
            jitter_secs: 0.5,
        }
    }
}

/// Exponential backoff delay calculator.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
}

impl ExponentialBackoff {
    /// Creates a new ExponentialBackoff from the given configuration.
    pub fn new_from_config(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Returns the delay for the given attempt. Attempt 0 yields the
    /// minimum delay plus jitter.
    pub fn duration(&self, attempt: u32) -> Duration {
        let backoff = self.config.minimum_delay_secs * self.config.factor.powi(attempt as i32);
        let backoff = backoff + rand::random::<f32>() * self.config.jitter_secs;
        Duration::from_secs_f32(backoff.min(self.config.maximum_delay_secs))
    }
}

/// Returns a function that implements exponential backoff.
///
/// # Arguments
///
/// * `minimum_delay` - The minimum delay in seconds.
/// * `maximum_delay` - The maximum delay in seconds.
/// * `factor` - The factor to multiply the delay by.
/// * `jitter` - The jitter to add to the delay.
///
/// # Returns
/// A function that takes the current attempt and returns the appropriate
/// delay. If attempt is 0, the minimum delay is used.
pub fn exponential_backoff(
    minimum_delay_secs: f32,
    maximum_delay_secs: f32,
    factor: f32,
    jitter_secs: f32,
) -> impl Fn(i32) -> Duration + Send + Sync {
    move |attempt: i32| {
        let backoff = minimum_delay_secs * factor.powi(attempt);
        let backoff = backoff + rand::random::<f32>() * jitter_secs;
        Duration::from_secs_f32(backoff.min(maximum_delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_is_clamped() {
        let backoff = ExponentialBackoff::new_from_config(BackoffConfig {
            minimum_delay_secs: 1.0,
            maximum_delay_secs: 8.0,
            factor: 2.0,
            jitter_secs: 0.0,
        });

        assert_eq!(backoff.duration(0), Duration::from_secs(1));
        assert_eq!(backoff.duration(1), Duration::from_secs(2));
        assert_eq!(backoff.duration(2), Duration::from_secs(4));
        // Clamped at the maximum delay.
        assert_eq!(backoff.duration(5), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_in_range() {
        let backoff = exponential_backoff(1.0, 60.0, 2.0, 1.0);
        for _ in 0..100 {
            let d = backoff(0);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_secs(2));
        }
    }
}

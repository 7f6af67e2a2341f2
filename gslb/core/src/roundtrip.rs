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
//! Rolling roundtrip samples per service.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const SAMPLE_CAPACITY: usize = 20;

#[derive(Debug)]
struct Samples {
    trip_start: Option<Instant>,
    trips: [Duration; SAMPLE_CAPACITY],
    idx: usize,
    count: usize,
}

/// Records the duration of the last [SAMPLE_CAPACITY] health checks.
///
/// The average feeds the group member ordering: between members of equal
/// priority and datacenter affinity, the faster one sorts first.
#[derive(Debug)]
pub struct Roundtripper {
    samples: Mutex<Samples>,
}

impl Default for Roundtripper {
    fn default() -> Self {
        Self::new()
    }
}

impl Roundtripper {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(Samples {
                trip_start: None,
                trips: [Duration::ZERO; SAMPLE_CAPACITY],
                idx: 0,
                count: 0,
            }),
        }
    }

    /// Stamps the start of a check.
    pub fn start_record(&self) {
        self.samples.lock().trip_start = Some(Instant::now());
    }

    /// Records the elapsed time since the matching [Self::start_record].
    ///
    /// Without a pending start stamp the call is ignored.
    pub fn end_record(&self) {
        let mut samples = self.samples.lock();
        let Some(start) = samples.trip_start.take() else {
            return;
        };

        let idx = samples.idx;
        samples.trips[idx] = start.elapsed();
        samples.idx = (idx + 1) % SAMPLE_CAPACITY;
        if samples.count < SAMPLE_CAPACITY {
            samples.count += 1;
        }
    }

    /// The average of the recorded samples, or `None` before the first
    /// completed check.
    pub fn average(&self) -> Option<Duration> {
        let samples = self.samples.lock();
        if samples.count == 0 {
            return None;
        }

        let sum: Duration = samples.trips[..samples.count.min(SAMPLE_CAPACITY)]
            .iter()
            .sum();
        Some(sum / samples.count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_yields_none() {
        assert_eq!(Roundtripper::new().average(), None);
    }

    #[test]
    fn records_and_averages() {
        let rt = Roundtripper::new();
        rt.start_record();
        rt.end_record();
        let avg = rt.average().unwrap();
        assert!(avg < Duration::from_millis(100));
    }

    #[test]
    fn end_without_start_is_ignored() {
        let rt = Roundtripper::new();
        rt.end_record();
        assert_eq!(rt.average(), None);
    }

    #[test]
    fn ring_wraps_at_capacity() {
        let rt = Roundtripper::new();
        for _ in 0..(SAMPLE_CAPACITY * 2 + 3) {
            rt.start_record();
            rt.end_record();
        }
        // Count saturates at capacity; averaging still works.
        assert!(rt.average().is_some());
        assert_eq!(rt.samples.lock().count, SAMPLE_CAPACITY);
    }
}

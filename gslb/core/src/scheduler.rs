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
//! Per-interval health check scheduling.
//!
//! One scheduler exists per base interval. Services are kept on a min-heap
//! ordered by their next check time; a loop task sleeps until the top entry
//! is due, emits the tick, and re-pushes the entry with a freshly jittered
//! interval.
//!
//! Two mechanisms spread checks out instead of firing them in lockstep:
//! initial schedule times are staggered across 0.5 s offset slots, and
//! every interval is jittered by ±10 % (rounded to 0.1 s). Successive ticks
//! for one service therefore land within `[0.9·I, 1.1·I]`.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use tokio::{sync::Notify, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::service::Service;

/// Width of one offset slot.
const OFFSET: Duration = Duration::from_millis(500);

/// Callback invoked when a service is due for a check.
pub type TickFn = Arc<dyn Fn(Arc<Service>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Entry {
    at: Instant,
    seq: u64,
    service: Arc<Service>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

struct SchedulerInner {
    heap: BinaryHeap<Reverse<Entry>>,
    // Entries marked for discard are dropped when they surface instead of
    // being re-scheduled. Removing the heap root this way leaves the loop's
    // in-flight wait undisturbed.
    discard: HashSet<String>,
    next_offset: u64,
    seq: u64,
    live: usize,
    loop_running: bool,
}

/// Schedules health checks for all services sharing one base interval.
pub struct Scheduler {
    interval: Duration,
    jitter_range: Duration,
    max_offsets: u64,
    on_tick: TickFn,
    notify: Notify,
    cancel: CancellationToken,
    tracker: TaskTracker,
    inner: Mutex<SchedulerInner>,
}

impl Scheduler {
    /// Creates a scheduler for `interval`. The loop task starts with the
    /// first scheduled service.
    pub fn new(interval: Duration, on_tick: TickFn) -> Arc<Self> {
        Arc::new(Scheduler {
            interval,
            jitter_range: interval / 10,
            max_offsets: (interval.as_secs() * 2).max(1),
            on_tick,
            notify: Notify::new(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            inner: Mutex::new(SchedulerInner {
                heap: BinaryHeap::new(),
                discard: HashSet::new(),
                next_offset: 0,
                seq: 0,
                live: 0,
                loop_running: false,
            }),
        })
    }

    /// The base interval this scheduler runs on.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of scheduled services.
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    /// Whether no services are scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schedules a service for recurring checks.
    ///
    /// The first check fires after `offset·0.5 s + I ± jitter`, where the
    /// offset slot rotates per scheduled service to spread initial checks
    /// out. Starts the loop task on the empty→non-empty transition.
    pub fn schedule_service(self: &Arc<Self>, service: Arc<Service>) {
        let start_loop = {
            let mut inner = self.inner.lock();
            let offset = OFFSET * inner.next_offset as u32;
            inner.next_offset = (inner.next_offset + 1) % self.max_offsets;

            let at = Instant::now() + offset + self.jittered_interval();
            let seq = inner.seq;
            inner.seq += 1;
            inner.heap.push(Reverse(Entry { at, seq, service }));
            inner.live += 1;

            let start = !inner.loop_running;
            inner.loop_running = true;
            start
        };

        if start_loop {
            self.spawn_loop();
        } else {
            // Wake the loop in case the new entry is the earliest.
            self.notify.notify_one();
        }
    }

    /// Removes a service by identity.
    ///
    /// Returns `true` when this removal emptied the scheduler, signaling
    /// the registry to garbage-collect it.
    pub fn remove_service(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.discard.contains(id) {
            return inner.live == 0;
        }

        let at_root = inner
            .heap
            .peek()
            .is_some_and(|Reverse(top)| top.service.id() == id);

        if at_root {
            inner.discard.insert(id.to_string());
            inner.live -= 1;
        } else {
            let before = inner.heap.len();
            let entries = std::mem::take(&mut inner.heap);
            inner.heap = entries
                .into_iter()
                .filter(|Reverse(e)| e.service.id() != id)
                .collect();

            if inner.heap.len() < before {
                inner.live -= 1;
            } else {
                // The service is mid-check; its entry re-appears on the
                // re-push, where the discard marker drops it.
                inner.discard.insert(id.to_string());
                inner.live = inner.live.saturating_sub(1);
            }
        }

        inner.live == 0
    }

    /// Cancels the loop task without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the loop task and waits for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn spawn_loop(self: &Arc<Self>) {
        let scheduler = self.clone();
        self.tracker.spawn(async move { scheduler.run_loop().await });
    }

    async fn run_loop(self: Arc<Self>) {
        tracing::debug!(interval = ?self.interval, "scheduler loop started");
        loop {
            let next_at = {
                let mut inner = self.inner.lock();

                // Drop discarded entries that surfaced at the root.
                while let Some(Reverse(top)) = inner.heap.peek() {
                    let id = top.service.id().to_string();
                    if !inner.discard.contains(&id) {
                        break;
                    }
                    inner.heap.pop();
                    inner.discard.remove(&id);
                }

                match inner.heap.peek() {
                    Some(Reverse(top)) => top.at,
                    None => {
                        inner.loop_running = false;
                        tracing::debug!(interval = ?self.interval, "scheduler loop exiting");
                        return;
                    }
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.inner.lock().loop_running = false;
                    return;
                }
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep_until(next_at) => {}
            }

            // Fire everything that is due, re-pushing each entry.
            loop {
                let due = {
                    let mut inner = self.inner.lock();
                    let is_due = inner
                        .heap
                        .peek()
                        .is_some_and(|Reverse(top)| top.at <= Instant::now());
                    if !is_due {
                        break;
                    }

                    let Reverse(entry) = inner.heap.pop().expect("due entry was just peeked");
                    let id = entry.service.id().to_string();
                    if inner.discard.remove(&id) {
                        None
                    } else {
                        Some(entry.service)
                    }
                };

                if let Some(service) = due {
                    (self.on_tick)(service.clone()).await;
                    self.reschedule(service);
                }
            }
        }
    }

    /// Re-pushes a ticked service with a fresh jittered interval.
    fn reschedule(&self, service: Arc<Service>) {
        let mut inner = self.inner.lock();
        if inner.discard.remove(service.id()) {
            // Removed while its check was in flight.
            return;
        }

        let at = Instant::now() + self.jittered_interval();
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(Reverse(Entry { at, seq, service }));
    }

    /// The base interval plus uniform jitter in ±10 %, rounded to 0.1 s.
    fn jittered_interval(&self) -> Duration {
        let jitter_secs = self.jitter_range.as_secs_f64();
        let jitter = if jitter_secs > 0.0 {
            rand::rng().random_range(-jitter_secs..=jitter_secs)
        } else {
            0.0
        };
        let secs = (self.interval.as_secs_f64() + jitter).max(0.0);
        Duration::from_secs_f64((secs * 10.0).round() / 10.0)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("scheduled", &self.len())
            .finish_non_exhaustive()
    }
}

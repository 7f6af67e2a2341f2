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
//! End-to-end lifecycle: zone discovery, health-driven promotion,
//! priority failover, zone removal, and total outage.

use std::time::Duration;

use integration_tests::{Backend, RewriterCall, TestStack, member_record};
use test_log::test;

/// Generous bound for health transitions: checks run on a 1 s interval and
/// the thresholds used here need three consecutive outcomes.
const TRANSITION: Duration = Duration::from_secs(15);

/// Window in which no rewriter traffic is expected.
const QUIET: Duration = Duration::from_secs(4);

#[test(tokio::test)]
#[ignore = "slow end-to-end scenario, run with --ignored"]
async fn zone_to_rewriter_lifecycle() {
    let backend_a = Backend::spawn().await;
    let mut backend_b = Backend::spawn().await;

    // Two members answering for x.example: A is the dc1 primary, B the
    // dc2 backup.
    let record_a = member_record("a", "x.example", "dc1", backend_a.addr, 1, 3);
    let record_b = member_record("b", "x.example", "dc2", backend_b.addr, 2, 3);

    let mut stack = TestStack::start(vec![record_a.clone(), record_b.clone()]).await;

    // S1/S2: both members come up, but only the primary reaches DNS. A
    // polls at 1 s and proves itself first; B is demoted to 3 s at
    // registration and its later health flip must not emit anything.
    let call = stack.next_call(TRANSITION).await;
    let RewriterCall::Upsert(spoof) = call else {
        panic!("expected initial upsert, got {call:?}");
    };
    assert_eq!(spoof.fqdn, "x.example");
    assert_eq!(spoof.datacenter, "dc1");

    let service_b = stack.manager.service("b").unwrap();
    assert_eq!(service_b.scheduled_interval(), Duration::from_secs(3));

    // Wait out B's climb to healthy; the single-record policy keeps DNS
    // quiet.
    tokio::time::timeout(TRANSITION, async {
        while !stack.manager.service("b").unwrap().is_healthy() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("backup never became healthy");
    stack.expect_quiet(QUIET).await;

    // S2: the primary dies. Expect the delete for dc1 followed by the
    // upsert for dc2, and the members to swap scheduling slots.
    drop(backend_a);

    assert_eq!(
        stack.next_call(TRANSITION).await,
        RewriterCall::Delete("x.example:dc1".to_string())
    );
    let call = stack.next_call(TRANSITION).await;
    let RewriterCall::Upsert(spoof) = call else {
        panic!("expected failover upsert, got {call:?}");
    };
    assert_eq!(spoof.datacenter, "dc2");

    let service_a = stack.manager.service("a").unwrap();
    let service_b = stack.manager.service("b").unwrap();
    assert_eq!(service_a.scheduled_interval(), Duration::from_secs(3));
    assert_eq!(service_b.scheduled_interval(), Duration::from_secs(1));

    // S3: the next snapshot no longer contains A. It disappears without
    // any rewriter traffic, B stays active.
    stack.set_zone(vec![record_b]);
    tokio::time::timeout(TRANSITION, async {
        while stack.manager.service("a").is_some() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("removed service lingered");
    stack.expect_quiet(QUIET).await;
    assert_eq!(stack.manager.service_ids(), vec!["b".to_string()]);

    // S5: the last member dies. Exactly one delete, then silence.
    backend_b.kill();
    assert_eq!(
        stack.next_call(TRANSITION).await,
        RewriterCall::Delete("x.example:dc2".to_string())
    );
    stack.expect_quiet(QUIET).await;
}

/*
 * Copyright (c) 2023 Stalwart Labs Ltd.
 *
 * This file is part of the Stalwart Mail Warmer.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * You can be released from the requirements of the AGPLv3 license by
 * purchasing a commercial license. Please contact licensing@stalw.art
 * for more details.
*/

use store::now;

use super::{memory_queue, new_test_core, push_message, request_json};

#[tokio::test]
async fn malformed_body_is_deleted() {
    let core = new_test_core().await;
    push_message(&core, "{ this is not json").await;
    push_message(&core, "{\"to\": \"b@y.org\"}").await;

    core.ingest_tick().await;

    assert!(memory_queue(&core).is_empty());
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_requests_coalesce_within_the_hour() {
    let core = new_test_core().await;
    push_message(&core, &request_json("dedup-a@x.org", "b@y.org")).await;
    push_message(&core, &request_json("dedup-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;

    // One entry owns its envelope, the duplicate was dropped from the queue
    let senders = core.lookup.read_bucket().await.unwrap();
    assert_eq!(senders.get("dedup-a@x.org").map(|entries| entries.len()), Some(1));
    assert_eq!(memory_queue(&core).len(), 1);
}

#[tokio::test]
async fn distinct_recipients_are_not_coalesced() {
    let core = new_test_core().await;
    push_message(&core, &request_json("fanout-a@x.org", "b@y.org")).await;
    push_message(&core, &request_json("fanout-a@x.org", "c@y.org")).await;

    core.ingest_tick().await;

    let senders = core.lookup.read_bucket().await.unwrap();
    assert_eq!(senders.get("fanout-a@x.org").map(|entries| entries.len()), Some(2));
    assert_eq!(memory_queue(&core).len(), 2);
}

#[tokio::test]
async fn future_scheduled_requests_are_requeued_with_bounded_delay() {
    let core = new_test_core().await;
    let mut request: serde_json::Value =
        serde_json::from_str(&request_json("sched-a@x.org", "b@y.org")).unwrap();
    request["scheduledFor"] = ((now() + 20 * 60) * 1000).into();
    push_message(&core, &request.to_string()).await;

    core.ingest_tick().await;

    // The original envelope is gone, the copy waits out the maximum delay
    let queue = memory_queue(&core);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.visible_len(), 0);
    let visible_at = queue.hidden_until()[0];
    assert!(
        (visible_at as i64 - (now() + 900) as i64).abs() <= 2,
        "unexpected delay: {visible_at}"
    );
    assert!(queue.bodies()[0].contains("scheduledFor"));
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
}

#[tokio::test]
async fn past_scheduled_requests_proceed_to_the_bucket() {
    let core = new_test_core().await;
    let mut request: serde_json::Value =
        serde_json::from_str(&request_json("overdue-a@x.org", "b@y.org")).unwrap();
    request["scheduledFor"] = ((now() - 60) * 1000).into();
    push_message(&core, &request.to_string()).await;

    core.ingest_tick().await;

    let senders = core.lookup.read_bucket().await.unwrap();
    assert!(senders.contains_key("overdue-a@x.org"));
    assert_eq!(memory_queue(&core).len(), 1);
}

#[tokio::test]
async fn cooldown_parks_then_drops_redeliveries() {
    let core = new_test_core().await;
    core.lookup.mark_cooldown("cool-a@x.org").await.unwrap();
    push_message(&core, &request_json("cool-a@x.org", "b@y.org")).await;

    // First receive: parked for twelve hours
    core.ingest_tick().await;
    let queue = memory_queue(&core);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.visible_len(), 0);
    let visible_at = queue.hidden_until()[0];
    assert!(
        (visible_at as i64 - (now() + 43_200) as i64).abs() <= 2,
        "unexpected park window: {visible_at}"
    );
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());

    // Second receive while still cooling down: dropped for good
    queue.make_all_visible();
    core.ingest_tick().await;
    assert!(memory_queue(&core).is_empty());
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
}

#[tokio::test]
async fn schedule_future_rewrites_the_payload() {
    let core = new_test_core().await;
    let request =
        warmup::queue::WarmupRequest::parse(&request_json("resched-a@x.org", "b@y.org")).unwrap();
    let timestamp = (now() + 30 * 60) * 1000;

    core.queue.schedule_future(&request, timestamp).await.unwrap();

    let queue = memory_queue(&core);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.visible_len(), 0);
    let requeued: serde_json::Value = serde_json::from_str(&queue.bodies()[0]).unwrap();
    assert_eq!(requeued["scheduledFor"], serde_json::json!(timestamp));
    assert_eq!(requeued["replyFrom"], serde_json::json!("resched-a@x.org"));
}

#[tokio::test]
async fn blocked_senders_are_dropped_at_admission() {
    let core = new_test_core().await;
    core.lookup.mark_blocked("blocked-a@x.org").await.unwrap();
    push_message(&core, &request_json("blocked-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;

    assert!(memory_queue(&core).is_empty());
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
}

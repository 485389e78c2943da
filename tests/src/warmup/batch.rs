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

use mail_parser::MessageParser;
use store::now;
use warmup::{
    dispatch::{stub, DeliveryStatus},
    rescue,
};

use super::{log_statuses, memory_queue, new_test_core, push_message, request_json};

#[tokio::test]
async fn happy_path_replies_and_releases_the_envelope() {
    let core = new_test_core().await;
    stub::script_rescue("happy-a@x.org", [Ok(0)]);
    stub::script_delivery("happy-a@x.org", [DeliveryStatus::Completed]);
    push_message(&core, &request_json("happy-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert!(memory_queue(&core).is_empty());
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
    assert_eq!(log_statuses(&core, "b@y.org").await, vec!["REPLIED"]);

    // The reply is threaded into the original conversation
    let sent = stub::sent_by("happy-a@x.org");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "b@y.org");
    let message = MessageParser::new().parse(&sent[0].raw).unwrap();
    assert_eq!(message.subject(), Some("Re: Quick question"));
    let in_reply_to = message.header("In-Reply-To").unwrap();
    let in_reply_to = in_reply_to
        .as_text_list()
        .map(|list| list.join(" "))
        .or_else(|| in_reply_to.as_text().map(|text| text.to_string()))
        .unwrap();
    assert!(in_reply_to.contains("msg-1@x.org"), "{in_reply_to}");
}

#[tokio::test]
async fn coalesced_duplicates_produce_one_reply() {
    let core = new_test_core().await;
    stub::script_rescue("dup-batch-a@x.org", [Ok(0)]);
    stub::script_delivery("dup-batch-a@x.org", [DeliveryStatus::Completed]);
    push_message(&core, &request_json("dup-batch-a@x.org", "b@y.org")).await;
    push_message(&core, &request_json("dup-batch-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert!(memory_queue(&core).is_empty());
    assert_eq!(log_statuses(&core, "b@y.org").await, vec!["REPLIED"]);
    assert_eq!(stub::sent_by("dup-batch-a@x.org").len(), 1);
}

#[tokio::test]
async fn auth_failure_sets_both_tiers_and_parks_the_envelope() {
    let core = new_test_core().await;
    stub::script_rescue("auth-a@x.org", [Ok(0)]);
    stub::script_delivery(
        "auth-a@x.org",
        [DeliveryStatus::AuthFailure(
            "535 5.7.8 Username and Password not accepted".to_string(),
        )],
    );
    push_message(&core, &request_json("auth-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert!(core.lookup.is_blocked("auth-a@x.org").await.unwrap());
    assert!(core.lookup.is_in_cooldown("auth-a@x.org").await.unwrap());
    assert!(log_statuses(&core, "b@y.org").await.is_empty());

    // First receive: parked twelve hours rather than deleted
    let queue = memory_queue(&core);
    assert_eq!(queue.len(), 1);
    let visible_at = queue.hidden_until()[0];
    assert!(
        (visible_at as i64 - (now() + 43_200) as i64).abs() <= 2,
        "unexpected park window: {visible_at}"
    );
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());

    // Redelivery while cooling down: dropped at admission
    queue.make_all_visible();
    core.ingest_tick().await;
    assert!(memory_queue(&core).is_empty());
}

#[tokio::test]
async fn auth_failure_aborts_remaining_entries_of_the_sender() {
    let core = new_test_core().await;
    stub::script_rescue("contagion-a@x.org", [Ok(0)]);
    stub::script_delivery(
        "contagion-a@x.org",
        [DeliveryStatus::AuthFailure("login failed".to_string())],
    );
    push_message(&core, &request_json("contagion-a@x.org", "b@y.org")).await;
    push_message(&core, &request_json("contagion-a@x.org", "c@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    // No reply went out, both tiers set, the second envelope was left alone
    assert!(stub::sent_by("contagion-a@x.org").is_empty());
    assert!(core.lookup.is_blocked("contagion-a@x.org").await.unwrap());
    assert!(core.lookup.is_in_cooldown("contagion-a@x.org").await.unwrap());
    assert_eq!(memory_queue(&core).len(), 2);
    assert!(log_statuses(&core, "b@y.org").await.is_empty());
    assert!(log_statuses(&core, "c@y.org").await.is_empty());
}

#[tokio::test]
async fn transient_failure_leaves_the_envelope_for_redelivery() {
    let core = new_test_core().await;
    stub::script_rescue("transient-a@x.org", [Ok(0)]);
    stub::script_delivery(
        "transient-a@x.org",
        [DeliveryStatus::TemporaryFailure("connection reset".to_string())],
    );
    push_message(&core, &request_json("transient-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert_eq!(memory_queue(&core).len(), 1);
    assert!(log_statuses(&core, "b@y.org").await.is_empty());
    assert!(!core.lookup.is_blocked("transient-a@x.org").await.unwrap());
    assert!(!core.lookup.is_in_cooldown("transient-a@x.org").await.unwrap());
    // The bucket entry is gone either way, redelivery re-admits it
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
}

#[tokio::test]
async fn no_reply_entries_release_their_envelopes_silently() {
    let core = new_test_core().await;
    stub::script_rescue("silent-a@x.org", [Ok(0)]);
    let mut request: serde_json::Value =
        serde_json::from_str(&request_json("silent-a@x.org", "b@y.org")).unwrap();
    request["shouldReply"] = false.into();
    push_message(&core, &request.to_string()).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert!(memory_queue(&core).is_empty());
    assert!(log_statuses(&core, "b@y.org").await.is_empty());
    assert!(stub::sent_by("silent-a@x.org").is_empty());
}

#[tokio::test]
async fn successful_rescue_logs_and_still_replies() {
    let core = new_test_core().await;
    stub::script_rescue("rescue-a@x.org", [Ok(1)]);
    stub::script_delivery("rescue-a@x.org", [DeliveryStatus::Completed]);
    push_message(&core, &request_json("rescue-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert_eq!(stub::rescued_by("rescue-a@x.org"), vec!["TAG42"]);
    assert_eq!(log_statuses(&core, "rescue-a@x.org").await, vec!["IN_SPAM"]);
    assert_eq!(log_statuses(&core, "b@y.org").await, vec!["REPLIED"]);
    assert!(memory_queue(&core).is_empty());
}

#[tokio::test]
async fn failed_rescue_does_not_prevent_the_reply() {
    let core = new_test_core().await;
    stub::script_rescue(
        "rescue-err-a@x.org",
        [Err(rescue::Error::Protocol("SELECT failed".to_string()))],
    );
    stub::script_delivery("rescue-err-a@x.org", [DeliveryStatus::Completed]);
    push_message(&core, &request_json("rescue-err-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert_eq!(log_statuses(&core, "b@y.org").await, vec!["REPLIED"]);
    assert!(memory_queue(&core).is_empty());
}

#[tokio::test]
async fn rescue_auth_failure_quarantines_without_replying() {
    let core = new_test_core().await;
    stub::script_rescue(
        "rescue-auth-a@x.org",
        [Err(rescue::Error::Auth("invalid credentials".to_string()))],
    );
    stub::script_delivery("rescue-auth-a@x.org", [DeliveryStatus::Completed]);
    push_message(&core, &request_json("rescue-auth-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.batch_tick().await;

    assert!(stub::sent_by("rescue-auth-a@x.org").is_empty());
    assert!(core.lookup.is_blocked("rescue-auth-a@x.org").await.unwrap());
    assert!(core
        .lookup
        .is_in_cooldown("rescue-auth-a@x.org")
        .await
        .unwrap());
    assert!(log_statuses(&core, "b@y.org").await.is_empty());
    assert_eq!(memory_queue(&core).len(), 1);
}

#[tokio::test]
async fn send_reply_returns_the_transport_status() {
    let core = new_test_core().await;
    stub::script_delivery(
        "single-a@x.org",
        [
            DeliveryStatus::Completed,
            DeliveryStatus::TemporaryFailure("greylisted".to_string()),
        ],
    );
    let request =
        warmup::queue::WarmupRequest::parse(&request_json("single-a@x.org", "b@y.org")).unwrap();
    let entry = warmup::queue::BatchEntry {
        request,
        receipt_handle: "rh-test".to_string(),
        added_at: now(),
        receive_count: 1,
    };

    assert_eq!(core.send_reply(&entry).await, DeliveryStatus::Completed);
    assert_eq!(
        core.send_reply(&entry).await,
        DeliveryStatus::TemporaryFailure("greylisted".to_string())
    );
}

#[tokio::test]
async fn senders_blocked_after_admission_are_dropped_at_batch_time() {
    let core = new_test_core().await;
    stub::script_rescue("late-block-a@x.org", [Ok(0)]);
    stub::script_delivery("late-block-a@x.org", [DeliveryStatus::Completed]);
    push_message(&core, &request_json("late-block-a@x.org", "b@y.org")).await;

    core.ingest_tick().await;
    core.lookup.mark_blocked("late-block-a@x.org").await.unwrap();
    core.batch_tick().await;

    assert!(memory_queue(&core).is_empty());
    assert!(stub::sent_by("late-block-a@x.org").is_empty());
    assert!(log_statuses(&core, "b@y.org").await.is_empty());
    assert!(core.lookup.read_bucket().await.unwrap().is_empty());
}

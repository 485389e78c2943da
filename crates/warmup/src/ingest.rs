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

use std::{sync::Arc, time::Instant};

use store::{now, now_millis};
use tokio::{sync::mpsc, task::JoinSet};

use crate::{
    core::Warmer,
    queue::{BatchEntry, Error, QueueEnvelope, WarmupRequest, MAX_DELAY_SECONDS, MAX_RECEIVES, PARK_SECONDS},
    reporting::PRIORITY_HIGH,
    Event,
};

pub struct IngestLoop {
    pub core: Arc<Warmer>,
    pub rx: mpsc::Receiver<Event>,
}

pub trait SpawnIngest {
    fn spawn(self, core: Arc<Warmer>);
}

impl SpawnIngest for mpsc::Receiver<Event> {
    fn spawn(self, core: Arc<Warmer>) {
        tokio::spawn(async move {
            IngestLoop { core, rx: self }.start().await;
        });
    }
}

impl IngestLoop {
    pub async fn start(&mut self) {
        let mut next_wake_up = Instant::now();

        loop {
            match tokio::time::timeout(
                next_wake_up.saturating_duration_since(Instant::now()),
                self.rx.recv(),
            )
            .await
            {
                Ok(Some(Event::Refresh)) | Err(_) => (),
                Ok(Some(Event::Stop)) | Ok(None) => break,
            }

            self.core.ingest_tick().await;
            next_wake_up = Instant::now() + self.core.settings.ingest_interval;
        }
    }
}

impl Warmer {
    // One ingest pass: drain the queue, fan out the admission of every
    // envelope and wait for all outcomes before returning.
    pub async fn ingest_tick(self: &Arc<Self>) {
        let envelopes = match self.queue.receive().await {
            Ok(envelopes) => envelopes,
            Err(err) => {
                tracing::warn!(
                    context = "ingest",
                    event = "error",
                    "Failed to receive from queue: {}",
                    err
                );
                return;
            }
        };

        if envelopes.is_empty() {
            return;
        }

        tracing::debug!(
            context = "ingest",
            event = "received",
            total = envelopes.len(),
            "Received warmup requests."
        );

        let mut handlers = JoinSet::new();
        for envelope in envelopes {
            let core = self.clone();
            handlers.spawn(async move { core.ingest_envelope(envelope).await });
        }
        while let Some(result) = handlers.join_next().await {
            if let Err(err) = result {
                self.report_issue(
                    "Ingest handler failed",
                    &format!("Envelope handler aborted: {err}"),
                    PRIORITY_HIGH,
                    &["panic in ingest handler"],
                    "ingest",
                )
                .await;
            }
        }
    }

    pub async fn ingest_envelope(&self, envelope: QueueEnvelope) {
        let request = match WarmupRequest::parse(&envelope.body) {
            Ok(request) => request,
            Err(err) => {
                // Malformed payloads must not loop through the queue
                tracing::error!(
                    context = "ingest",
                    event = "malformed",
                    receive_count = envelope.receive_count,
                    "Discarding unparseable envelope: {}",
                    err
                );
                self.delete_envelope(&envelope.receipt_handle).await;
                return;
            }
        };

        // Deferred requests go back to the queue with a bounded delay; the
        // next dequeue re-checks the timestamp.
        let now_ms = now_millis();
        if let Some(scheduled_for) = request.scheduled_for.filter(|&ts| ts > now_ms) {
            let delay = ((scheduled_for - now_ms) / 1000).min(MAX_DELAY_SECONDS);
            match self.queue.delay_requeue(&envelope.body, delay).await {
                Ok(_) => {
                    tracing::debug!(
                        context = "ingest",
                        event = "deferred",
                        sender = request.reply_from.as_str(),
                        delay = delay,
                        "Requeued future-scheduled request."
                    );
                    self.delete_envelope(&envelope.receipt_handle).await;
                }
                Err(err) => {
                    tracing::warn!(
                        context = "ingest",
                        event = "error",
                        "Failed to requeue scheduled request: {}",
                        err
                    );
                }
            }
            return;
        }

        match self.lookup.is_in_cooldown(&request.reply_from).await {
            Ok(true) => {
                if envelope.receive_count >= MAX_RECEIVES {
                    tracing::info!(
                        context = "ingest",
                        event = "dropped",
                        sender = request.reply_from.as_str(),
                        "Sender in cooldown, dropping redelivered request."
                    );
                    self.delete_envelope(&envelope.receipt_handle).await;
                } else {
                    tracing::info!(
                        context = "ingest",
                        event = "parked",
                        sender = request.reply_from.as_str(),
                        "Sender in cooldown, parking request."
                    );
                    self.hide_envelope(&envelope.receipt_handle, PARK_SECONDS)
                        .await;
                }
                return;
            }
            Ok(false) => (),
            Err(err) => {
                // Leave the envelope alone so the visibility timeout retries it
                tracing::warn!(
                    context = "ingest",
                    event = "error",
                    "Cooldown lookup failed: {}",
                    err
                );
                return;
            }
        }

        match self.lookup.is_blocked(&request.reply_from).await {
            Ok(true) => {
                tracing::info!(
                    context = "ingest",
                    event = "dropped",
                    sender = request.reply_from.as_str(),
                    "Sender blocked after authentication failure, dropping request."
                );
                self.delete_envelope(&envelope.receipt_handle).await;
                return;
            }
            Ok(false) => (),
            Err(err) => {
                tracing::warn!(
                    context = "ingest",
                    event = "error",
                    "Block lookup failed: {}",
                    err
                );
                return;
            }
        }

        let entry = BatchEntry {
            receipt_handle: envelope.receipt_handle.clone(),
            added_at: now(),
            receive_count: envelope.receive_count,
            request,
        };
        match self
            .lookup
            .add_to_bucket(&entry.request.reply_from, &entry.request.to, &entry.serialize())
            .await
        {
            Ok(true) => {
                // The envelope is now owned by the bucket entry; its handle
                // is released by the batch processor once the reply is
                // confirmed or the entry is discarded.
                tracing::debug!(
                    context = "ingest",
                    event = "batched",
                    sender = entry.request.reply_from.as_str(),
                    recipient = entry.request.to.as_str(),
                    "Queued reply for batch processing."
                );
            }
            Ok(false) => {
                // Coalesced into an existing entry for this hour
                tracing::debug!(
                    context = "ingest",
                    event = "deduplicated",
                    sender = entry.request.reply_from.as_str(),
                    recipient = entry.request.to.as_str(),
                    "Duplicate request for this hour, dropping."
                );
                self.delete_envelope(&envelope.receipt_handle).await;
            }
            Err(err) => {
                // Keeping the envelope lets the visibility timeout retry it
                tracing::warn!(
                    context = "ingest",
                    event = "error",
                    "Bucket insert failed: {}",
                    err
                );
            }
        }
    }

    pub(crate) async fn delete_envelope(&self, receipt_handle: &str) {
        if let Err(err) = self.queue.delete(receipt_handle).await {
            if !matches!(err, Error::Permanent(_)) {
                tracing::warn!(
                    context = "queue",
                    event = "error",
                    "Failed to delete envelope: {}",
                    err
                );
            }
        }
    }

    pub(crate) async fn hide_envelope(&self, receipt_handle: &str, seconds: u64) {
        if let Err(err) = self.queue.hide(receipt_handle, seconds).await {
            tracing::warn!(
                context = "queue",
                event = "error",
                "Failed to extend envelope visibility: {}",
                err
            );
        }
    }
}

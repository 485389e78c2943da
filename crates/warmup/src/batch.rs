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

use tokio::{sync::mpsc, task::JoinSet};

use crate::{
    core::Warmer,
    dispatch::DeliveryStatus,
    queue::{BatchEntry, MAX_RECEIVES, PARK_SECONDS},
    reporting::{PRIORITY_HIGH, STATUS_IN_SPAM, STATUS_REPLIED},
    Event,
};

pub struct BatchLoop {
    pub core: Arc<Warmer>,
    pub rx: mpsc::Receiver<Event>,
}

pub trait SpawnBatch {
    fn spawn(self, core: Arc<Warmer>);
}

impl SpawnBatch for mpsc::Receiver<Event> {
    fn spawn(self, core: Arc<Warmer>) {
        tokio::spawn(async move {
            BatchLoop { core, rx: self }.start().await;
        });
    }
}

impl BatchLoop {
    pub async fn start(&mut self) {
        let mut next_wake_up = Instant::now() + self.core.settings.batch_interval;

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

            self.core.batch_tick().await;
            next_wake_up = Instant::now() + self.core.settings.batch_interval;
        }
    }
}

impl Warmer {
    // One batch pass over the current hour: senders proceed concurrently,
    // the entries of one sender sequentially.
    pub async fn batch_tick(self: &Arc<Self>) {
        let senders = match self.lookup.read_bucket().await {
            Ok(senders) => senders,
            Err(err) => {
                tracing::warn!(
                    context = "batch",
                    event = "error",
                    "Failed to read hour bucket: {}",
                    err
                );
                return;
            }
        };

        if senders.is_empty() {
            tracing::debug!(
                context = "batch",
                event = "idle",
                "No warmup replies pending for this hour."
            );
            return;
        }

        tracing::info!(
            context = "batch",
            event = "start",
            senders = senders.len(),
            "Processing warmup reply batch."
        );

        let mut handlers = JoinSet::new();
        for (reply_from, values) in senders {
            let core = self.clone();
            handlers.spawn(async move {
                core.process_sender(&reply_from, values).await;
                reply_from
            });
        }

        let mut processed = Vec::new();
        while let Some(result) = handlers.join_next().await {
            match result {
                Ok(reply_from) => processed.push(reply_from),
                Err(err) => {
                    self.report_issue(
                        "Batch handler failed",
                        &format!("Sender handler aborted: {err}"),
                        PRIORITY_HIGH,
                        &["panic in batch handler"],
                        "batch",
                    )
                    .await;
                }
            }
        }

        if let Err(err) = self.lookup.remove_senders(&processed).await {
            tracing::warn!(
                context = "batch",
                event = "error",
                "Failed to clear processed senders from bucket: {}",
                err
            );
        }
    }

    pub async fn process_sender(&self, reply_from: &str, values: Vec<String>) {
        let entries = values
            .iter()
            .filter_map(|value| match BatchEntry::parse(value) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::error!(
                        context = "batch",
                        event = "error",
                        sender = reply_from,
                        "Discarding undecodable bucket entry: {}",
                        err
                    );
                    None
                }
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return;
        }

        // Senders that failed authentication since admission are dropped
        match self.lookup.is_blocked(reply_from).await {
            Ok(true) => {
                tracing::info!(
                    context = "batch",
                    event = "skipped",
                    sender = reply_from,
                    total = entries.len(),
                    "Sender blocked, dropping pending replies."
                );
                for entry in &entries {
                    self.delete_envelope(&entry.receipt_handle).await;
                }
                return;
            }
            Ok(false) => (),
            Err(err) => {
                tracing::warn!(
                    context = "batch",
                    event = "error",
                    sender = reply_from,
                    "Block lookup failed: {}",
                    err
                );
            }
        }

        // One spam rescue per sender and hour is enough
        let first = &entries[0];
        match self
            .rescue(&first.request.custom_mail_id, reply_from)
            .await
        {
            Ok(0) => (),
            Ok(rescued) => {
                tracing::info!(
                    context = "batch",
                    event = "rescued",
                    sender = reply_from,
                    total = rescued,
                    "Moved warmup mail out of the spam folder."
                );
                self.log_warmup(&first.request.warmup_id, reply_from, STATUS_IN_SPAM)
                    .await;
            }
            Err(err) if err.is_auth() => {
                tracing::error!(
                    context = "batch",
                    event = "auth-failed",
                    sender = reply_from,
                    "Mailbox authentication failed during rescue: {}",
                    err
                );
                self.quarantine_sender(reply_from).await;
                for entry in &entries {
                    self.park_or_delete(entry).await;
                }
                return;
            }
            Err(err) => {
                // A failed rescue must never prevent the reply
                tracing::warn!(
                    context = "batch",
                    event = "error",
                    sender = reply_from,
                    "Spam rescue failed: {}",
                    err
                );
            }
        }

        let reply_entries = entries
            .iter()
            .filter(|entry| entry.request.should_reply)
            .cloned()
            .collect::<Vec<_>>();
        let statuses = self.send_batch(reply_from, &reply_entries).await;

        let mut aborted = false;
        for (entry, status) in reply_entries.iter().zip(statuses) {
            match status {
                DeliveryStatus::Completed => {
                    tracing::info!(
                        context = "batch",
                        event = "replied",
                        sender = reply_from,
                        recipient = entry.request.to.as_str(),
                        "Warmup reply sent."
                    );
                    self.log_warmup(&entry.request.warmup_id, &entry.request.to, STATUS_REPLIED)
                        .await;
                    self.delete_envelope(&entry.receipt_handle).await;
                }
                DeliveryStatus::AuthFailure(reason) => {
                    tracing::error!(
                        context = "batch",
                        event = "auth-failed",
                        sender = reply_from,
                        "Sender authentication failed: {}",
                        reason
                    );
                    self.quarantine_sender(reply_from).await;
                    self.park_or_delete(entry).await;
                    aborted = true;
                    break;
                }
                DeliveryStatus::TemporaryFailure(reason) => {
                    // The envelope stays visible to the queue for retry
                    tracing::warn!(
                        context = "batch",
                        event = "deferred",
                        sender = reply_from,
                        recipient = entry.request.to.as_str(),
                        "Warmup reply failed temporarily: {}",
                        reason
                    );
                }
            }
        }

        if !aborted {
            for entry in entries.iter().filter(|entry| !entry.request.should_reply) {
                self.delete_envelope(&entry.receipt_handle).await;
            }
        }
    }

    // Both lockout tiers run in parallel: the block expires within the day,
    // the cooldown quarantines the sender for longer.
    pub async fn quarantine_sender(&self, reply_from: &str) {
        if let Err(err) = self.lookup.mark_cooldown(reply_from).await {
            tracing::warn!(
                context = "batch",
                event = "error",
                sender = reply_from,
                "Failed to set cooldown flag: {}",
                err
            );
        }
        if let Err(err) = self.lookup.mark_blocked(reply_from).await {
            tracing::warn!(
                context = "batch",
                event = "error",
                sender = reply_from,
                "Failed to set block flag: {}",
                err
            );
        }
    }

    async fn park_or_delete(&self, entry: &BatchEntry) {
        if entry.receive_count >= MAX_RECEIVES {
            self.delete_envelope(&entry.receipt_handle).await;
        } else {
            self.hide_envelope(&entry.receipt_handle, PARK_SECONDS).await;
        }
    }
}

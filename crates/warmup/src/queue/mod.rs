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

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub mod memory;
pub mod sqs;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

// Delivery delay ceiling imposed by the queue service.
pub const MAX_DELAY_SECONDS: u64 = 900;
// Visibility extension used to park an envelope out of rotation.
pub const PARK_SECONDS: u64 = 43_200;
// Receive count at which a parked envelope is dropped instead of retried.
pub const MAX_RECEIVES: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupRequest {
    pub to: String,
    pub original_subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub warmup_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    pub reply_from: String,
    pub custom_mail_id: String,
    #[serde(default = "default_true")]
    pub should_reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct QueueEnvelope {
    pub body: String,
    pub receipt_handle: String,
    pub receive_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    #[serde(flatten)]
    pub request: WarmupRequest,
    pub receipt_handle: String,
    pub added_at: u64,
    pub receive_count: u32,
}

#[derive(Debug)]
pub enum Error {
    Malformed(String),
    MissingField(&'static str),
    Transient(String),
    Permanent(String),
}

impl WarmupRequest {
    pub fn parse(body: &str) -> Result<Self, Error> {
        let request: WarmupRequest =
            serde_json::from_str(body).map_err(|err| Error::Malformed(err.to_string()))?;
        for (field, value) in [
            ("to", &request.to),
            ("originalSubject", &request.original_subject),
            ("body", &request.body),
            ("warmupId", &request.warmup_id),
            ("replyFrom", &request.reply_from),
            ("customMailId", &request.custom_mail_id),
        ] {
            if value.is_empty() {
                return Err(Error::MissingField(field));
            }
        }
        Ok(request)
    }
}

impl BatchEntry {
    pub fn parse(value: &str) -> Result<Self, Error> {
        serde_json::from_str(value).map_err(|err| Error::Malformed(err.to_string()))
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub enum MessageQueue {
    Sqs(SqsQueue),
    Memory(MemoryQueue),
}

impl MessageQueue {
    pub async fn receive(&self) -> Result<Vec<QueueEnvelope>, Error> {
        match self {
            MessageQueue::Sqs(queue) => queue.receive().await,
            MessageQueue::Memory(queue) => queue.receive().await,
        }
    }

    pub async fn delete(&self, receipt_handle: &str) -> Result<(), Error> {
        match self {
            MessageQueue::Sqs(queue) => queue.delete(receipt_handle).await,
            MessageQueue::Memory(queue) => queue.delete(receipt_handle).await,
        }
    }

    pub async fn delay_requeue(&self, body: &str, delay_seconds: u64) -> Result<(), Error> {
        let delay = std::cmp::min(delay_seconds, MAX_DELAY_SECONDS);
        match self {
            MessageQueue::Sqs(queue) => queue.send(body, delay).await,
            MessageQueue::Memory(queue) => queue.send(body, delay).await,
        }
    }

    pub async fn hide(&self, receipt_handle: &str, seconds: u64) -> Result<(), Error> {
        match self {
            MessageQueue::Sqs(queue) => queue.hide(receipt_handle, seconds).await,
            MessageQueue::Memory(queue) => queue.hide(receipt_handle, seconds).await,
        }
    }

    // Rewrites the scheduled timestamp into the payload and requeues with the
    // maximum delivery delay; the next dequeue re-checks the timestamp.
    pub async fn schedule_future(
        &self,
        request: &WarmupRequest,
        timestamp_millis: u64,
    ) -> Result<(), Error> {
        let mut request = request.clone();
        request.scheduled_for = Some(timestamp_millis);
        let body =
            serde_json::to_string(&request).map_err(|err| Error::Permanent(err.to_string()))?;
        self.delay_requeue(&body, MAX_DELAY_SECONDS).await
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(err) => write!(f, "Malformed payload: {err}"),
            Error::MissingField(field) => write!(f, "Missing required field {field:?}"),
            Error::Transient(err) => write!(f, "Queue unavailable: {err}"),
            Error::Permanent(err) => write!(f, "Queue rejected request: {err}"),
        }
    }
}

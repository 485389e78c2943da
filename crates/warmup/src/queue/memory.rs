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

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use store::now;

use super::{Error, QueueEnvelope};

// In-process queue with SQS visibility semantics, used by the test suite.
pub struct MemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
    handle_seq: AtomicU64,
    visibility: u64,
}

struct StoredMessage {
    body: String,
    receipt_handle: String,
    receive_count: u32,
    visible_at: u64,
}

const DEFAULT_VISIBILITY: u64 = 300;

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        MemoryQueue {
            messages: Mutex::new(Vec::new()),
            handle_seq: AtomicU64::new(0),
            visibility: DEFAULT_VISIBILITY,
        }
    }

    pub async fn receive(&self) -> Result<Vec<QueueEnvelope>, Error> {
        let now = now();
        let mut messages = self.messages.lock();
        let mut envelopes = Vec::new();
        for message in messages.iter_mut() {
            if message.visible_at <= now && envelopes.len() < 10 {
                message.receive_count += 1;
                message.visible_at = now + self.visibility;
                message.receipt_handle =
                    format!("rh-{}", self.handle_seq.fetch_add(1, Ordering::Relaxed));
                envelopes.push(QueueEnvelope {
                    body: message.body.clone(),
                    receipt_handle: message.receipt_handle.clone(),
                    receive_count: message.receive_count,
                });
            }
        }
        Ok(envelopes)
    }

    pub async fn delete(&self, receipt_handle: &str) -> Result<(), Error> {
        self.messages
            .lock()
            .retain(|message| message.receipt_handle != receipt_handle);
        Ok(())
    }

    pub async fn send(&self, body: &str, delay_seconds: u64) -> Result<(), Error> {
        self.messages.lock().push(StoredMessage {
            body: body.to_string(),
            receipt_handle: format!("rh-{}", self.handle_seq.fetch_add(1, Ordering::Relaxed)),
            receive_count: 0,
            visible_at: now() + delay_seconds,
        });
        Ok(())
    }

    pub async fn hide(&self, receipt_handle: &str, seconds: u64) -> Result<(), Error> {
        if let Some(message) = self
            .messages
            .lock()
            .iter_mut()
            .find(|message| message.receipt_handle == receipt_handle)
        {
            message.visible_at = now() + seconds;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn visible_len(&self) -> usize {
        let now = now();
        self.messages
            .lock()
            .iter()
            .filter(|message| message.visible_at <= now)
            .count()
    }

    // Test hooks: force delivery regardless of pending delays and read back
    // the delay a message was queued or hidden with.
    #[cfg(feature = "test_mode")]
    pub fn make_all_visible(&self) {
        let now = now();
        for message in self.messages.lock().iter_mut() {
            message.visible_at = now;
        }
    }

    #[cfg(feature = "test_mode")]
    pub fn hidden_until(&self) -> Vec<u64> {
        self.messages
            .lock()
            .iter()
            .map(|message| message.visible_at)
            .collect()
    }

    #[cfg(feature = "test_mode")]
    pub fn bodies(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .map(|message| message.body.clone())
            .collect()
    }
}

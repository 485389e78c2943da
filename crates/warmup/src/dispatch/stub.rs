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

// Scripted transport used by the integration tests: per-sender result
// scripts keep concurrently running tests from interfering with each other.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::queue::BatchEntry;
use crate::rescue;

use super::DeliveryStatus;

pub static DELIVERY_SCRIPTS: Mutex<Vec<(String, VecDeque<DeliveryStatus>)>> =
    Mutex::new(Vec::new());
pub static SENT_MESSAGES: Mutex<Vec<SentMessage>> = Mutex::new(Vec::new());
pub static RESCUE_SCRIPTS: Mutex<Vec<(String, VecDeque<Result<usize, rescue::Error>>)>> =
    Mutex::new(Vec::new());
pub static RESCUED: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub reply_from: String,
    pub to: String,
    pub raw: Vec<u8>,
}

pub fn script_delivery(reply_from: &str, statuses: impl IntoIterator<Item = DeliveryStatus>) {
    let mut scripts = DELIVERY_SCRIPTS.lock();
    let statuses = statuses.into_iter().collect();
    if let Some((_, script)) = scripts.iter_mut().find(|(addr, _)| addr == reply_from) {
        *script = statuses;
    } else {
        scripts.push((reply_from.to_string(), statuses));
    }
}

pub fn script_rescue(
    sender: &str,
    results: impl IntoIterator<Item = Result<usize, rescue::Error>>,
) {
    let mut scripts = RESCUE_SCRIPTS.lock();
    let results = results.into_iter().collect();
    if let Some((_, script)) = scripts.iter_mut().find(|(addr, _)| addr == sender) {
        *script = results;
    } else {
        scripts.push((sender.to_string(), results));
    }
}

pub fn is_scripted(reply_from: &str) -> bool {
    DELIVERY_SCRIPTS
        .lock()
        .iter()
        .any(|(addr, _)| addr == reply_from)
}

pub fn is_rescue_scripted(sender: &str) -> bool {
    RESCUE_SCRIPTS.lock().iter().any(|(addr, _)| addr == sender)
}

pub fn send_batch(reply_from: &str, entries: &[BatchEntry]) -> Vec<DeliveryStatus> {
    let mut statuses = Vec::with_capacity(entries.len());
    for entry in entries {
        let status = DELIVERY_SCRIPTS
            .lock()
            .iter_mut()
            .find(|(addr, _)| addr == reply_from)
            .and_then(|(_, script)| script.pop_front())
            .unwrap_or(DeliveryStatus::Completed);
        if !status.is_auth_failure() {
            SENT_MESSAGES.lock().push(SentMessage {
                reply_from: reply_from.to_string(),
                to: entry.request.to.clone(),
                raw: super::build_reply(&entry.request),
            });
        }
        let is_auth_failure = status.is_auth_failure();
        statuses.push(status);
        if is_auth_failure {
            break;
        }
    }
    statuses
}

pub fn rescue(sender: &str, tag: &str) -> Result<usize, rescue::Error> {
    let result = RESCUE_SCRIPTS
        .lock()
        .iter_mut()
        .find(|(addr, _)| addr == sender)
        .and_then(|(_, script)| script.pop_front())
        .unwrap_or(Ok(0));
    if result.is_ok() {
        RESCUED.lock().push((sender.to_string(), tag.to_string()));
    }
    result
}

pub fn sent_by(reply_from: &str) -> Vec<SentMessage> {
    SENT_MESSAGES
        .lock()
        .iter()
        .filter(|message| message.reply_from == reply_from)
        .cloned()
        .collect()
}

pub fn rescued_by(sender: &str) -> Vec<String> {
    RESCUED
        .lock()
        .iter()
        .filter(|(addr, _)| addr == sender)
        .map(|(_, tag)| tag.clone())
        .collect()
}

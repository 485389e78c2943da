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

use crate::{core::Warmer, dispatch::gmail::GmailClient};

use super::Error;

pub(super) async fn rescue(
    warmer: &Warmer,
    sender: &str,
    access_token: String,
    refresh_token: String,
    tag: &str,
) -> Result<usize, Error> {
    let mut client = GmailClient::new(warmer, sender, access_token, refresh_token);

    let query = build_query(tag);
    let list = client.list_messages(&query).await.map_err(Error::from)?;

    // The search is fuzzy; keep only messages whose subject carries the tag
    // verbatim before relabeling.
    let mut ids = Vec::with_capacity(list.messages.len());
    for message in &list.messages {
        match client.get_subject(&message.id).await {
            Ok(Some(subject)) if subject.contains(tag) => ids.push(message.id.clone()),
            Ok(_) => (),
            Err(status) => return Err(Error::from(status)),
        }
    }

    if ids.is_empty() {
        return Ok(0);
    }

    client
        .batch_modify(&ids, &["INBOX"], &["SPAM", "UNREAD"])
        .await
        .map_err(Error::from)?;

    Ok(ids.len())
}

pub fn build_query(tag: &str) -> String {
    format!("in:spam subject:\"{tag}\"")
}

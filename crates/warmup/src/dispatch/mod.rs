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

use mail_builder::{headers::HeaderType, MessageBuilder};

use crate::{
    core::{provider::Provider, Warmer},
    credentials::MailboxCredentials,
    queue::{BatchEntry, WarmupRequest},
};

pub mod gmail;
pub mod smtp;

#[cfg(feature = "test_mode")]
pub mod stub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Completed,
    AuthFailure(String),
    TemporaryFailure(String),
}

// The transport is a tagged variant over credential presence, not a
// configuration switch: OAuth tokens select the vendor API, a password
// selects SMTP.
pub enum DeliveryRoute {
    Gmail {
        access_token: String,
        refresh_token: String,
    },
    Smtp {
        provider: Provider,
        password: String,
    },
}

impl DeliveryStatus {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DeliveryStatus::AuthFailure(_))
    }
}

const AUTH_MARKERS: [&str; 6] = [
    "authentication",
    "auth",
    "invalid credentials",
    "login failed",
    "535",
    "534",
];

pub fn classify_failure(reason: impl Into<String>) -> DeliveryStatus {
    let reason = reason.into();
    let lower = reason.to_lowercase();
    if AUTH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        DeliveryStatus::AuthFailure(reason)
    } else {
        DeliveryStatus::TemporaryFailure(reason)
    }
}

pub fn reply_builder(request: &WarmupRequest) -> MessageBuilder<'_> {
    let mut builder = MessageBuilder::new()
        .from(request.reply_from.as_str())
        .to(request.to.as_str())
        .subject(format!("Re: {}", request.original_subject))
        .text_body(request.body.as_str());
    if let Some(in_reply_to) = request.in_reply_to.as_deref().filter(|v| !v.is_empty()) {
        builder = builder.header("In-Reply-To", HeaderType::Text(in_reply_to.into()));
    }
    if let Some(reference_id) = request.reference_id.as_deref().filter(|v| !v.is_empty()) {
        builder = builder.header("References", HeaderType::Text(reference_id.into()));
    }
    builder
}

pub fn build_reply(request: &WarmupRequest) -> Vec<u8> {
    reply_builder(request).write_to_vec().unwrap_or_default()
}

impl Warmer {
    pub fn resolve_route(&self, credentials: &MailboxCredentials) -> Option<DeliveryRoute> {
        if credentials.service.eq_ignore_ascii_case("gmail") && self.settings.oauth.is_some() {
            if let (Some(access_token), Some(refresh_token)) = (
                credentials.oauth_access.clone(),
                credentials.oauth_refresh.clone(),
            ) {
                return Some(DeliveryRoute::Gmail {
                    access_token,
                    refresh_token,
                });
            }
        }
        credentials
            .smtp_password
            .clone()
            .map(|password| DeliveryRoute::Smtp {
                provider: Provider::lookup(&credentials.service),
                password,
            })
    }

    pub async fn send_reply(&self, entry: &BatchEntry) -> DeliveryStatus {
        self.send_batch(&entry.request.reply_from, std::slice::from_ref(entry))
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                DeliveryStatus::TemporaryFailure("Dispatch produced no result".to_string())
            })
    }

    // Sends the replies of one sender over a shared transport. Returns one
    // status per attempted entry, in order; an authentication failure aborts
    // the remaining entries, so the result may be shorter than the input.
    pub async fn send_batch(&self, reply_from: &str, entries: &[BatchEntry]) -> Vec<DeliveryStatus> {
        if entries.is_empty() {
            return Vec::new();
        }

        #[cfg(feature = "test_mode")]
        if stub::is_scripted(reply_from) {
            return stub::send_batch(reply_from, entries);
        }

        let Some(credentials) = self.get_credentials(reply_from).await else {
            return vec![DeliveryStatus::AuthFailure(
                "No mailbox credentials on file".to_string(),
            )];
        };

        match self.resolve_route(&credentials) {
            Some(DeliveryRoute::Gmail {
                access_token,
                refresh_token,
            }) => {
                let mut statuses = Vec::with_capacity(entries.len());
                let mut client =
                    gmail::GmailClient::new(self, reply_from, access_token, refresh_token);
                for entry in entries {
                    let status = client.send_reply(&entry.request).await;
                    let is_auth_failure = status.is_auth_failure();
                    statuses.push(status);
                    if is_auth_failure {
                        break;
                    }
                }
                statuses
            }
            Some(DeliveryRoute::Smtp { provider, password }) => {
                smtp::send_batch(self, &provider, reply_from, &password, entries).await
            }
            None => vec![DeliveryStatus::AuthFailure(
                "No usable credentials for transport".to_string(),
            )],
        }
    }
}

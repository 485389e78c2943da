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

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

use crate::{core::Warmer, queue::WarmupRequest};

use super::{build_reply, classify_failure, DeliveryStatus};

pub const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USER_AGENT: &str = concat!("StalwartMailWarmer/", env!("CARGO_PKG_VERSION"));

pub struct GmailClient<'x> {
    warmer: &'x Warmer,
    account: &'x str,
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl<'x> GmailClient<'x> {
    pub fn new(
        warmer: &'x Warmer,
        account: &'x str,
        access_token: String,
        refresh_token: String,
    ) -> Self {
        GmailClient {
            warmer,
            account,
            access_token,
            refresh_token,
        }
    }

    pub async fn send_reply(&mut self, request: &WarmupRequest) -> DeliveryStatus {
        // Resolve the thread id so the reply lands in the same conversation;
        // failures here are not fatal, the reply goes out unthreaded.
        let thread_id = if let Some(message_id) = request
            .in_reply_to
            .as_deref()
            .or(request.reference_id.as_deref())
            .filter(|v| !v.is_empty())
        {
            match self.find_thread_id(message_id).await {
                Ok(thread_id) => thread_id,
                Err(status) if status.is_auth_failure() => return status,
                Err(_) => None,
            }
        } else {
            None
        };

        let raw = URL_SAFE_NO_PAD.encode(build_reply(request));
        let mut payload = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = thread_id {
            payload["threadId"] = thread_id.into();
        }

        match self
            .request_with_refresh(|client, token| {
                client
                    .post(format!("{API_BASE}/messages/send"))
                    .bearer_auth(token)
                    .json(&payload)
            })
            .await
        {
            Ok(_) => DeliveryStatus::Completed,
            Err(status) => status,
        }
    }

    pub async fn find_thread_id(&mut self, message_id: &str) -> Result<Option<String>, DeliveryStatus> {
        let message_id = message_id.trim_matches(&['<', '>'][..]);
        let query = format!("rfc822msgid:{message_id}");
        let body = self
            .request_with_refresh(|client, token| {
                client
                    .get(format!("{API_BASE}/messages"))
                    .query(&[("q", query.as_str()), ("maxResults", "1")])
                    .bearer_auth(token)
            })
            .await?;
        let list: MessageList = serde_json::from_str(&body)
            .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))?;
        Ok(list
            .messages
            .into_iter()
            .next()
            .and_then(|message| message.thread_id))
    }

    pub async fn list_messages(&mut self, query: &str) -> Result<MessageList, DeliveryStatus> {
        let body = self
            .request_with_refresh(|client, token| {
                client
                    .get(format!("{API_BASE}/messages"))
                    .query(&[("q", query)])
                    .bearer_auth(token)
            })
            .await?;
        serde_json::from_str(&body).map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))
    }

    pub async fn get_subject(&mut self, message_id: &str) -> Result<Option<String>, DeliveryStatus> {
        let body = self
            .request_with_refresh(|client, token| {
                client
                    .get(format!("{API_BASE}/messages/{message_id}"))
                    .query(&[
                        ("format", "metadata"),
                        ("metadataHeaders", "Subject"),
                    ])
                    .bearer_auth(token)
            })
            .await?;
        #[derive(Deserialize)]
        struct Metadata {
            payload: Option<Payload>,
        }
        #[derive(Deserialize)]
        struct Payload {
            #[serde(default)]
            headers: Vec<Header>,
        }
        #[derive(Deserialize)]
        struct Header {
            name: String,
            value: String,
        }
        let metadata: Metadata = serde_json::from_str(&body)
            .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))?;
        Ok(metadata.payload.and_then(|payload| {
            payload
                .headers
                .into_iter()
                .find(|header| header.name.eq_ignore_ascii_case("subject"))
                .map(|header| header.value)
        }))
    }

    pub async fn batch_modify(
        &mut self,
        ids: &[String],
        add_labels: &[&str],
        remove_labels: &[&str],
    ) -> Result<(), DeliveryStatus> {
        if ids.is_empty() {
            return Ok(());
        }
        let payload = serde_json::json!({
            "ids": ids,
            "addLabelIds": add_labels,
            "removeLabelIds": remove_labels,
        });
        self.request_with_refresh(|client, token| {
            client
                .post(format!("{API_BASE}/messages/batchModify"))
                .bearer_auth(token)
                .json(&payload)
        })
        .await
        .map(|_| ())
    }

    // Runs a request with the current access token, refreshing it once on
    // an authorization rejection.
    async fn request_with_refresh(
        &mut self,
        build: impl Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    ) -> Result<String, DeliveryStatus> {
        let mut refreshed = false;
        loop {
            let client = self.http_client()?;
            let response = build(&client, &self.access_token)
                .send()
                .await
                .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return response
                    .text()
                    .await
                    .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()));
            }
            let body = response.text().await.unwrap_or_default();
            if (status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN)
                && !refreshed
            {
                refreshed = true;
                self.refresh_access_token().await?;
                continue;
            }
            return Err(if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                DeliveryStatus::AuthFailure(format!("Gmail API rejected token: {status} {body}"))
            } else {
                classify_failure(format!("Gmail API error: {status} {body}"))
            });
        }
    }

    async fn refresh_access_token(&mut self) -> Result<(), DeliveryStatus> {
        let Some(oauth) = self.warmer.settings.oauth.as_ref() else {
            return Err(DeliveryStatus::AuthFailure(
                "OAuth client is not configured".to_string(),
            ));
        };
        let client = self.http_client()?;
        let response = client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("client_id", oauth.client_id.as_str()),
                ("client_secret", oauth.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryStatus::AuthFailure(format!(
                "OAuth token refresh failed: {status} {body}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))?;
        self.access_token = token.access_token;
        self.warmer
            .persist_refreshed_access(self.account, &self.access_token)
            .await;
        Ok(())
    }

    fn http_client(&self) -> Result<reqwest::Client, DeliveryStatus> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.warmer.settings.mail_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| DeliveryStatus::TemporaryFailure(err.to_string()))
    }
}

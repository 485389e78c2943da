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

use aws_sdk_sqs::{
    config::{Credentials, Region},
    types::MessageSystemAttributeName,
};
use utils::config::Config;

use super::{Error, QueueEnvelope};

pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    url: String,
}

const RECEIVE_BATCH_SIZE: i32 = 10;
const RECEIVE_WAIT_SECONDS: i32 = 20;

impl SqsQueue {
    pub async fn open(config: &Config) -> Result<Self, String> {
        let url = config.value_require("queue.url")?.to_string();
        let region = config.value_require("queue.region")?.to_string();
        let access_key = config.value_require("queue.access-key")?;
        let secret_key = config.value_require("queue.secret-key")?;

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "config",
            ))
            .load()
            .await;

        Ok(SqsQueue {
            client: aws_sdk_sqs::Client::new(&sdk_config),
            url,
        })
    }

    pub async fn receive(&self) -> Result<Vec<QueueEnvelope>, Error> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(RECEIVE_BATCH_SIZE)
            .wait_time_seconds(RECEIVE_WAIT_SECONDS)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|err| Error::Transient(err.to_string()))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let receive_count = message
                    .attributes
                    .as_ref()
                    .and_then(|attributes| {
                        attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount)
                    })
                    .and_then(|count| count.parse().ok())
                    .unwrap_or(1);
                match (message.body, message.receipt_handle) {
                    (Some(body), Some(receipt_handle)) => Some(QueueEnvelope {
                        body,
                        receipt_handle,
                        receive_count,
                    }),
                    _ => None,
                }
            })
            .collect())
    }

    pub async fn delete(&self, receipt_handle: &str) -> Result<(), Error> {
        self.client
            .delete_message()
            .queue_url(&self.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| Error::Transient(err.to_string()))
    }

    pub async fn send(&self, body: &str, delay_seconds: u64) -> Result<(), Error> {
        self.client
            .send_message()
            .queue_url(&self.url)
            .message_body(body)
            .delay_seconds(delay_seconds as i32)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| Error::Transient(err.to_string()))
    }

    pub async fn hide(&self, receipt_handle: &str, seconds: u64) -> Result<(), Error> {
        self.client
            .change_message_visibility()
            .queue_url(&self.url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds as i32)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| Error::Transient(err.to_string()))
    }
}

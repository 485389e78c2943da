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

use std::time::Duration;

use mail_send::{SmtpClient, SmtpClientBuilder};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::core::{provider::Provider, Warmer};
use crate::queue::BatchEntry;

use super::{classify_failure, reply_builder, DeliveryStatus};

const RETRY_DELAY: Duration = Duration::from_secs(2);

pub(super) async fn send_batch(
    warmer: &Warmer,
    provider: &Provider,
    reply_from: &str,
    password: &str,
    entries: &[BatchEntry],
) -> Vec<DeliveryStatus> {
    let mut statuses = Vec::with_capacity(entries.len());
    let mut client: Option<SmtpClient<TlsStream<TcpStream>>> = None;

    'entries: for entry in entries {
        // One retry after a short pause on transient errors, reconnecting
        // in between since the transport state is unknown after a failure.
        let mut last_status = None;
        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY).await;
            }

            if client.is_none() {
                match connect(warmer, provider, reply_from, password).await {
                    Ok(transport) => {
                        client = Some(transport);
                    }
                    Err(err) => {
                        let status = classify_failure(err.to_string());
                        if status.is_auth_failure() {
                            statuses.push(status);
                            break 'entries;
                        }
                        last_status = Some(status);
                        continue;
                    }
                }
            }
            let Some(transport) = client.as_mut() else {
                continue;
            };

            match transport.send(reply_builder(&entry.request)).await {
                Ok(_) => {
                    last_status = Some(DeliveryStatus::Completed);
                    break;
                }
                Err(err) => {
                    client = None;
                    let status = classify_failure(err.to_string());
                    if status.is_auth_failure() {
                        statuses.push(status);
                        break 'entries;
                    }
                    last_status = Some(status);
                }
            }
        }

        statuses.push(last_status.unwrap_or_else(|| {
            DeliveryStatus::TemporaryFailure("SMTP delivery not attempted".to_string())
        }));
    }

    if let Some(transport) = client {
        transport.quit().await.ok();
    }

    statuses
}

async fn connect(
    warmer: &Warmer,
    provider: &Provider,
    reply_from: &str,
    password: &str,
) -> Result<SmtpClient<TlsStream<TcpStream>>, mail_send::Error> {
    SmtpClientBuilder::new(provider.smtp_host.to_string(), provider.smtp_port)
        .implicit_tls(provider.smtp_tls_implicit())
        .credentials((reply_from.to_string(), password.to_string()))
        .timeout(warmer.settings.mail_timeout)
        .connect()
        .await
}

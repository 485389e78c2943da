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

use crate::core::Warmer;

const CREDENTIALS_QUERY: &str = concat!(
    "SELECT service, password, access_token, refresh_token ",
    "FROM warmup_email_service_email_credential WHERE email_id = $1"
);
const UPDATE_ACCESS_TOKEN: &str = concat!(
    "UPDATE warmup_email_service_email_credential ",
    "SET access_token = $1 WHERE email_id = $2"
);

#[derive(Debug, Clone, Default)]
pub struct MailboxCredentials {
    pub service: String,
    pub smtp_password: Option<String>,
    pub oauth_access: Option<String>,
    pub oauth_refresh: Option<String>,
}

impl Warmer {
    pub async fn get_credentials(&self, addr: &str) -> Option<MailboxCredentials> {
        let row = match self.sql.fetch_row(CREDENTIALS_QUERY, &[addr]).await {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(
                    context = "credentials",
                    event = "error",
                    sender = addr,
                    "Failed to fetch credentials: {}",
                    err
                );
                return None;
            }
        };

        let mut columns = row.into_iter();
        let service = columns.next().flatten().unwrap_or_default();
        let smtp_password = self.open_field(addr, "password", columns.next().flatten());
        let oauth_access = self.open_field(addr, "access_token", columns.next().flatten());
        let oauth_refresh = self.open_field(addr, "refresh_token", columns.next().flatten());

        Some(MailboxCredentials {
            service,
            smtp_password,
            oauth_access,
            oauth_refresh,
        })
    }

    pub async fn persist_refreshed_access(&self, addr: &str, token: &str) {
        let sealed = self.crypto.seal(token);
        if let Err(err) = self
            .sql
            .execute(UPDATE_ACCESS_TOKEN, &[sealed.as_str(), addr])
            .await
        {
            // Non-fatal, the refreshed token stays usable in-process
            tracing::warn!(
                context = "credentials",
                event = "error",
                sender = addr,
                "Failed to persist refreshed access token: {}",
                err
            );
        }
    }

    // A field that fails to decrypt is treated as absent rather than fatal
    fn open_field(&self, addr: &str, field: &str, sealed: Option<String>) -> Option<String> {
        let sealed = sealed?;
        if sealed.is_empty() {
            return None;
        }
        match self.crypto.open(&sealed) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    context = "credentials",
                    event = "decrypt-failed",
                    sender = addr,
                    field = field,
                    "Failed to decrypt credential field: {}",
                    err
                );
                None
            }
        }
    }
}

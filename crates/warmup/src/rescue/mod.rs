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

use crate::{
    core::Warmer,
    dispatch::{DeliveryRoute, DeliveryStatus},
};

pub mod gmail;
pub mod imap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Auth(String),
    Protocol(String),
    Io(String),
    Timeout,
}

impl Error {
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

impl Warmer {
    // Locates warmup mail in the sender's own spam folder by subject tag,
    // moves it to the inbox and marks it read. Returns the number of
    // messages rescued.
    pub async fn rescue(&self, custom_mail_id: &str, sender: &str) -> Result<usize, Error> {
        #[cfg(feature = "test_mode")]
        if crate::dispatch::stub::is_rescue_scripted(sender) {
            return crate::dispatch::stub::rescue(sender, custom_mail_id);
        }

        let Some(credentials) = self.get_credentials(sender).await else {
            return Err(Error::Auth("No mailbox credentials on file".to_string()));
        };

        match self.resolve_route(&credentials) {
            Some(DeliveryRoute::Gmail {
                access_token,
                refresh_token,
            }) => gmail::rescue(self, sender, access_token, refresh_token, custom_mail_id).await,
            Some(DeliveryRoute::Smtp { provider, password }) => {
                imap::rescue(self, &provider, sender, &password, custom_mail_id).await
            }
            None => Err(Error::Auth(
                "No usable credentials for mailbox access".to_string(),
            )),
        }
    }
}

impl From<DeliveryStatus> for Error {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::AuthFailure(reason) => Error::Auth(reason),
            DeliveryStatus::TemporaryFailure(reason) => Error::Protocol(reason),
            DeliveryStatus::Completed => Error::Protocol("Unexpected status".to_string()),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Auth(reason) => write!(f, "Authentication failed: {reason}"),
            Error::Protocol(reason) => write!(f, "Protocol error: {reason}"),
            Error::Io(reason) => write!(f, "I/O error: {reason}"),
            Error::Timeout => f.write_str("Connection time-out"),
        }
    }
}

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

use store::{LookupStore, SqlStore};
use utils::{codec::crypt::SymmetricKey, config::Config};

use crate::queue::MessageQueue;

pub mod provider;

pub struct Warmer {
    pub queue: MessageQueue,
    pub lookup: LookupStore,
    pub sql: SqlStore,
    pub crypto: SymmetricKey,
    pub settings: Settings,
}

pub struct Settings {
    pub ingest_interval: Duration,
    pub batch_interval: Duration,
    pub mail_timeout: Duration,
    pub oauth: Option<OAuthConfig>,
}

#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Settings {
    pub fn parse(config: &Config) -> utils::config::Result<Self> {
        let oauth = if config.contains_key("oauth.client-id") {
            Some(OAuthConfig {
                client_id: config.value_require("oauth.client-id")?.to_string(),
                client_secret: config.value_require("oauth.client-secret")?.to_string(),
                redirect_uri: config.value_require("oauth.redirect-uri")?.to_string(),
            })
        } else {
            None
        };

        Ok(Settings {
            ingest_interval: config
                .property_or_static::<Duration>("schedule.ingest-interval", "2m")?,
            batch_interval: config
                .property_or_static::<Duration>("schedule.batch-interval", "60m")?,
            mail_timeout: config.property_or_static::<Duration>("mail.timeout", "30s")?,
            oauth,
        })
    }
}

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

pub mod utils;

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub keys: BTreeMap<String, String>,
}

pub type Result<T> = std::result::Result<T, String>;

// Environment variables recognized at boot and their configuration keys.
const ENV_KEYS: &[(&str, &str)] = &[
    ("QUEUE_URL", "queue.url"),
    ("QUEUE_REGION", "queue.region"),
    ("QUEUE_ACCESS_KEY", "queue.access-key"),
    ("QUEUE_SECRET_KEY", "queue.secret-key"),
    ("REDIS_URL", "store.redis.url"),
    ("REDIS_TIMEOUT", "store.redis.timeout"),
    ("REDIS_MAX_CONNECTIONS", "store.redis.pool.max-connections"),
    ("DATABASE_URL", "store.db.address"),
    ("DATABASE_MAX_CONNECTIONS", "store.db.max-connections"),
    ("DATABASE_TLS_BUNDLE", "store.db.tls-bundle"),
    ("ENCRYPTION_SECRET", "crypto.secret"),
    ("OAUTH_CLIENT_ID", "oauth.client-id"),
    ("OAUTH_CLIENT_SECRET", "oauth.client-secret"),
    ("OAUTH_REDIRECT_URI", "oauth.redirect-uri"),
    ("INGEST_INTERVAL", "schedule.ingest-interval"),
    ("BATCH_INTERVAL", "schedule.batch-interval"),
    ("MAIL_TIMEOUT", "mail.timeout"),
    ("LOG_LEVEL", "global.tracing.level"),
    ("LOG_METHOD", "global.tracing.method"),
    ("LOG_PATH", "global.tracing.path"),
    ("LOG_PREFIX", "global.tracing.prefix"),
    ("LOG_ROTATE", "global.tracing.rotate"),
];

impl Config {
    pub fn parse_env() -> Self {
        let mut keys = BTreeMap::new();
        for (name, key) in ENV_KEYS {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    keys.insert(key.to_string(), value);
                }
            }
        }
        Config { keys }
    }

    pub fn value(&self, key: impl utils::AsKey) -> Option<&str> {
        self.keys.get(&key.as_key()).map(|v| v.as_str())
    }

    pub fn value_require(&self, key: impl utils::AsKey) -> Result<&str> {
        let key = key.as_key();
        self.keys
            .get(&key)
            .map(|v| v.as_str())
            .ok_or_else(|| format!("Missing configuration key {key:?}."))
    }

    pub fn contains_key(&self, key: impl utils::AsKey) -> bool {
        self.keys.contains_key(&key.as_key())
    }

    pub fn set(&mut self, key: impl utils::AsKey, value: impl Into<String>) {
        self.keys.insert(key.as_key(), value.into());
    }
}

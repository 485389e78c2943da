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

use ahash::AHashMap;

use crate::{now, now_millis, MemoryStore, RedisStore};

pub const AUTH_FAIL_PREFIX: &str = "auth_fail:";
pub const COOLDOWN_PREFIX: &str = "warmup_cooldown:";
pub const BUCKET_PREFIX: &str = "email_batch:";
pub const BUCKET_FIELD_SEPARATOR: &str = "->";

pub const AUTH_FAIL_TTL: u64 = 8 * 60 * 60;
pub const COOLDOWN_TTL: u64 = 2 * 24 * 60 * 60;
pub const BUCKET_TTL: u64 = 2 * 60 * 60;

pub enum LookupStore {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl LookupStore {
    pub async fn key_set(&self, key: &str, value: &str, expires: Option<u64>) -> crate::Result<()> {
        match self {
            LookupStore::Redis(store) => store.key_set(key, value, expires).await,
            LookupStore::Memory(store) => store.key_set(key, value, expires).await,
        }
    }

    pub async fn key_exists(&self, key: &str) -> crate::Result<bool> {
        match self {
            LookupStore::Redis(store) => store.key_exists(key).await,
            LookupStore::Memory(store) => store.key_exists(key).await,
        }
    }

    pub async fn key_delete(&self, key: &str) -> crate::Result<()> {
        match self {
            LookupStore::Redis(store) => store.key_delete(key).await,
            LookupStore::Memory(store) => store.key_delete(key).await,
        }
    }

    pub async fn mark_blocked(&self, addr: &str) -> crate::Result<()> {
        self.key_set(
            &format!("{AUTH_FAIL_PREFIX}{addr}"),
            &now().to_string(),
            AUTH_FAIL_TTL.into(),
        )
        .await
    }

    pub async fn is_blocked(&self, addr: &str) -> crate::Result<bool> {
        self.key_exists(&format!("{AUTH_FAIL_PREFIX}{addr}")).await
    }

    pub async fn clear_blocked(&self, addr: &str) -> crate::Result<()> {
        self.key_delete(&format!("{AUTH_FAIL_PREFIX}{addr}")).await
    }

    pub async fn mark_cooldown(&self, addr: &str) -> crate::Result<()> {
        self.key_set(
            &format!("{COOLDOWN_PREFIX}{addr}"),
            &now().to_string(),
            COOLDOWN_TTL.into(),
        )
        .await
    }

    pub async fn is_in_cooldown(&self, addr: &str) -> crate::Result<bool> {
        self.key_exists(&format!("{COOLDOWN_PREFIX}{addr}")).await
    }

    pub async fn clear_cooldown(&self, addr: &str) -> crate::Result<()> {
        self.key_delete(&format!("{COOLDOWN_PREFIX}{addr}")).await
    }

    // Coalescing insert: one field per (sender, recipient) pair for the
    // current hour. Every insert refreshes the bucket TTL.
    pub async fn add_to_bucket(
        &self,
        reply_from: &str,
        to: &str,
        value: &str,
    ) -> crate::Result<bool> {
        let key = current_bucket_key();
        let field = format!("{reply_from}{BUCKET_FIELD_SEPARATOR}{to}");
        match self {
            LookupStore::Redis(store) => store.hash_set_nx(&key, &field, value, BUCKET_TTL).await,
            LookupStore::Memory(store) => store.hash_set_nx(&key, &field, value, BUCKET_TTL).await,
        }
    }

    pub async fn read_bucket(&self) -> crate::Result<AHashMap<String, Vec<String>>> {
        let key = current_bucket_key();
        let fields = match self {
            LookupStore::Redis(store) => store.hash_get_all(&key).await?,
            LookupStore::Memory(store) => store.hash_get_all(&key).await?,
        };
        let mut senders: AHashMap<String, Vec<String>> = AHashMap::new();
        for (field, value) in fields {
            if let Some((reply_from, _)) = field.split_once(BUCKET_FIELD_SEPARATOR) {
                senders
                    .entry(reply_from.to_string())
                    .or_default()
                    .push(value);
            }
        }
        Ok(senders)
    }

    pub async fn remove_senders(&self, senders: &[String]) -> crate::Result<()> {
        let key = current_bucket_key();
        let fields = match self {
            LookupStore::Redis(store) => store.hash_keys(&key).await?,
            LookupStore::Memory(store) => store.hash_keys(&key).await?,
        };
        let fields = fields
            .into_iter()
            .filter(|field| {
                field
                    .split_once(BUCKET_FIELD_SEPARATOR)
                    .is_some_and(|(reply_from, _)| senders.iter().any(|s| s == reply_from))
            })
            .collect::<Vec<_>>();
        match self {
            LookupStore::Redis(store) => store.hash_delete(&key, &fields).await,
            LookupStore::Memory(store) => store.hash_delete(&key, &fields).await,
        }
    }
}

pub fn current_bucket_key() -> String {
    format!("{BUCKET_PREFIX}{}", now_millis() / 3_600_000)
}

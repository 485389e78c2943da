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
use parking_lot::Mutex;

use crate::now;

// TTL-honoring in-process backend, used by the test suite and local runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    keys: AHashMap<String, ExpiringValue<String>>,
    hashes: AHashMap<String, ExpiringValue<AHashMap<String, String>>>,
}

struct ExpiringValue<T> {
    value: T,
    expires: Option<u64>,
}

impl<T> ExpiringValue<T> {
    fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= now())
    }
}

impl MemoryStore {
    pub async fn key_set(&self, key: &str, value: &str, expires: Option<u64>) -> crate::Result<()> {
        self.inner.lock().keys.insert(
            key.to_string(),
            ExpiringValue {
                value: value.to_string(),
                expires: expires.map(|secs| now() + secs),
            },
        );
        Ok(())
    }

    pub async fn key_get(&self, key: &str) -> crate::Result<Option<String>> {
        let mut inner = self.inner.lock();
        match inner.keys.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.keys.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn key_exists(&self, key: &str) -> crate::Result<bool> {
        self.key_get(key).await.map(|value| value.is_some())
    }

    pub async fn key_delete(&self, key: &str) -> crate::Result<()> {
        self.inner.lock().keys.remove(key);
        Ok(())
    }

    pub async fn hash_set_nx(
        &self,
        key: &str,
        field: &str,
        value: &str,
        expires: u64,
    ) -> crate::Result<bool> {
        let mut inner = self.inner.lock();
        let entry = inner
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| ExpiringValue {
                value: AHashMap::new(),
                expires: None,
            });
        if entry.is_expired() {
            entry.value.clear();
        }
        entry.expires = Some(now() + expires);
        if entry.value.contains_key(field) {
            Ok(false)
        } else {
            entry.value.insert(field.to_string(), value.to_string());
            Ok(true)
        }
    }

    pub async fn hash_get_all(&self, key: &str) -> crate::Result<Vec<(String, String)>> {
        let mut inner = self.inner.lock();
        match inner.hashes.get(key) {
            Some(entry) if !entry.is_expired() => Ok(entry
                .value
                .iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()),
            Some(_) => {
                inner.hashes.remove(key);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn hash_keys(&self, key: &str) -> crate::Result<Vec<String>> {
        self.hash_get_all(key)
            .await
            .map(|fields| fields.into_iter().map(|(field, _)| field).collect())
    }

    pub async fn hash_delete(&self, key: &str, fields: &[String]) -> crate::Result<()> {
        if let Some(entry) = self.inner.lock().hashes.get_mut(key) {
            for field in fields {
                entry.value.remove(field);
            }
        }
        Ok(())
    }

    #[cfg(feature = "test_mode")]
    pub fn expire_now(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.keys.get_mut(key) {
            entry.expires = Some(0);
        }
        if let Some(entry) = inner.hashes.get_mut(key) {
            entry.expires = Some(0);
        }
    }
}

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

use redis::AsyncCommands;

use super::{RedisPool, RedisStore};

impl RedisStore {
    pub async fn key_set(&self, key: &str, value: &str, expires: Option<u64>) -> crate::Result<()> {
        match &self.pool {
            RedisPool::Single(pool) => {
                self.key_set_(pool.get().await?.as_mut(), key, value, expires)
                    .await
            }
            RedisPool::Cluster(pool) => {
                self.key_set_(pool.get().await?.as_mut(), key, value, expires)
                    .await
            }
        }
    }

    pub async fn key_get(&self, key: &str) -> crate::Result<Option<String>> {
        match &self.pool {
            RedisPool::Single(pool) => self.key_get_(pool.get().await?.as_mut(), key).await,
            RedisPool::Cluster(pool) => self.key_get_(pool.get().await?.as_mut(), key).await,
        }
    }

    pub async fn key_exists(&self, key: &str) -> crate::Result<bool> {
        match &self.pool {
            RedisPool::Single(pool) => self.key_exists_(pool.get().await?.as_mut(), key).await,
            RedisPool::Cluster(pool) => self.key_exists_(pool.get().await?.as_mut(), key).await,
        }
    }

    pub async fn key_delete(&self, key: &str) -> crate::Result<()> {
        match &self.pool {
            RedisPool::Single(pool) => self.key_delete_(pool.get().await?.as_mut(), key).await,
            RedisPool::Cluster(pool) => self.key_delete_(pool.get().await?.as_mut(), key).await,
        }
    }

    pub async fn hash_set_nx(
        &self,
        key: &str,
        field: &str,
        value: &str,
        expires: u64,
    ) -> crate::Result<bool> {
        match &self.pool {
            RedisPool::Single(pool) => {
                self.hash_set_nx_(pool.get().await?.as_mut(), key, field, value, expires)
                    .await
            }
            RedisPool::Cluster(pool) => {
                self.hash_set_nx_(pool.get().await?.as_mut(), key, field, value, expires)
                    .await
            }
        }
    }

    pub async fn hash_get_all(&self, key: &str) -> crate::Result<Vec<(String, String)>> {
        match &self.pool {
            RedisPool::Single(pool) => self.hash_get_all_(pool.get().await?.as_mut(), key).await,
            RedisPool::Cluster(pool) => self.hash_get_all_(pool.get().await?.as_mut(), key).await,
        }
    }

    pub async fn hash_keys(&self, key: &str) -> crate::Result<Vec<String>> {
        match &self.pool {
            RedisPool::Single(pool) => self.hash_keys_(pool.get().await?.as_mut(), key).await,
            RedisPool::Cluster(pool) => self.hash_keys_(pool.get().await?.as_mut(), key).await,
        }
    }

    pub async fn hash_delete(&self, key: &str, fields: &[String]) -> crate::Result<()> {
        match &self.pool {
            RedisPool::Single(pool) => {
                self.hash_delete_(pool.get().await?.as_mut(), key, fields)
                    .await
            }
            RedisPool::Cluster(pool) => {
                self.hash_delete_(pool.get().await?.as_mut(), key, fields)
                    .await
            }
        }
    }

    async fn key_set_(
        &self,
        conn: &mut impl AsyncCommands,
        key: &str,
        value: &str,
        expires: Option<u64>,
    ) -> crate::Result<()> {
        if let Some(expires) = expires {
            conn.set_ex(key, value, expires).await.map_err(Into::into)
        } else {
            conn.set(key, value).await.map_err(Into::into)
        }
    }

    async fn key_get_(
        &self,
        conn: &mut impl AsyncCommands,
        key: &str,
    ) -> crate::Result<Option<String>> {
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(conn)
            .await
            .map_err(Into::into)
    }

    async fn key_exists_(&self, conn: &mut impl AsyncCommands, key: &str) -> crate::Result<bool> {
        conn.exists(key).await.map_err(Into::into)
    }

    async fn key_delete_(&self, conn: &mut impl AsyncCommands, key: &str) -> crate::Result<()> {
        conn.del(key).await.map_err(Into::into)
    }

    async fn hash_set_nx_(
        &self,
        conn: &mut impl AsyncCommands,
        key: &str,
        field: &str,
        value: &str,
        expires: u64,
    ) -> crate::Result<bool> {
        redis::pipe()
            .atomic()
            .hset_nx(key, field, value)
            .expire(key, expires as i64)
            .ignore()
            .query_async::<Vec<i64>>(conn)
            .await
            .map_err(crate::Error::from)
            .map(|v| v.first().copied().unwrap_or(0) == 1)
    }

    async fn hash_get_all_(
        &self,
        conn: &mut impl AsyncCommands,
        key: &str,
    ) -> crate::Result<Vec<(String, String)>> {
        redis::cmd("HGETALL")
            .arg(key)
            .query_async::<Vec<(String, String)>>(conn)
            .await
            .map_err(Into::into)
    }

    async fn hash_keys_(
        &self,
        conn: &mut impl AsyncCommands,
        key: &str,
    ) -> crate::Result<Vec<String>> {
        conn.hkeys(key).await.map_err(Into::into)
    }

    async fn hash_delete_(
        &self,
        conn: &mut impl AsyncCommands,
        key: &str,
        fields: &[String],
    ) -> crate::Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        conn.hdel(key, fields).await.map_err(Into::into)
    }
}

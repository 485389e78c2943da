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

use deadpool::{
    managed::{Manager, Pool, PoolError},
    Runtime,
};
use redis::{
    cluster::{ClusterClient, ClusterClientBuilder},
    Client, RedisError,
};
use utils::config::Config;

pub mod lookup;
pub mod pool;

pub struct RedisStore {
    pool: RedisPool,
}

struct RedisConnectionManager {
    client: Client,
    timeout: Duration,
}

struct RedisClusterConnectionManager {
    client: ClusterClient,
    timeout: Duration,
}

enum RedisPool {
    Single(Pool<RedisConnectionManager>),
    Cluster(Pool<RedisClusterConnectionManager>),
}

impl RedisStore {
    pub async fn open(config: &Config) -> crate::Result<Self> {
        let url = config.value_require("store.redis.url")?;
        let timeout = config.property_or_static::<Duration>("store.redis.timeout", "10s")?;

        // Comma-separated URLs select cluster mode
        let db = if !url.contains(',') {
            Self {
                pool: RedisPool::Single(build_pool(
                    config,
                    RedisConnectionManager {
                        client: Client::open(url).map_err(crate::Error::from)?,
                        timeout,
                    },
                )?),
            }
        } else {
            let addresses = url
                .split(',')
                .map(|addr| addr.trim().to_string())
                .filter(|addr| !addr.is_empty())
                .collect::<Vec<_>>();
            if addresses.is_empty() {
                return Err(crate::Error::InternalError(
                    "No Redis cluster URLs specified".to_string(),
                ));
            }
            Self {
                pool: RedisPool::Cluster(build_pool(
                    config,
                    RedisClusterConnectionManager {
                        client: ClusterClientBuilder::new(addresses.into_iter())
                            .build()
                            .map_err(crate::Error::from)?,
                        timeout,
                    },
                )?),
            }
        };

        Ok(db)
    }
}

fn build_pool<M: Manager>(config: &Config, manager: M) -> crate::Result<Pool<M>> {
    Pool::builder(manager)
        .runtime(Runtime::Tokio1)
        .max_size(config.property_or_static("store.redis.pool.max-connections", "10")?)
        .create_timeout(
            config
                .property_or_static::<Duration>("store.redis.pool.create-timeout", "30s")?
                .into(),
        )
        .wait_timeout(
            config
                .property_or_static::<Duration>("store.redis.pool.wait-timeout", "30s")?
                .into(),
        )
        .recycle_timeout(
            config
                .property_or_static::<Duration>("store.redis.pool.recycle-timeout", "30s")?
                .into(),
        )
        .build()
        .map_err(|err| crate::Error::InternalError(format!("Failed to build Redis pool: {err}")))
}

impl From<PoolError<RedisError>> for crate::Error {
    fn from(value: PoolError<RedisError>) -> Self {
        crate::Error::InternalError(format!("Redis pool error: {value}"))
    }
}

impl From<PoolError<crate::Error>> for crate::Error {
    fn from(value: PoolError<crate::Error>) -> Self {
        crate::Error::InternalError(format!("Connection pool {value}"))
    }
}

impl From<RedisError> for crate::Error {
    fn from(value: RedisError) -> Self {
        crate::Error::InternalError(format!("Redis error: {value}"))
    }
}

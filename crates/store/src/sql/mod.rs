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

use sqlx::{postgres::PgPoolOptions, sqlite::SqlitePoolOptions, Row};
use utils::config::Config;

#[derive(Clone)]
pub enum SqlStore {
    Postgres(sqlx::Pool<sqlx::Postgres>),
    SqlLite(sqlx::Pool<sqlx::Sqlite>),
}

impl SqlStore {
    pub async fn open(config: &Config) -> crate::Result<Self> {
        let address = config.value_require("store.db.address")?;
        let max_connections = config.property_or_static::<u32>("store.db.max-connections", "10")?;

        if address.starts_with("postgres:") {
            // A CA bundle upgrades the connection to verified TLS
            let address = match config.value("store.db.tls-bundle") {
                Some(bundle) if !address.contains("sslrootcert") => {
                    let separator = if address.contains('?') { '&' } else { '?' };
                    format!("{address}{separator}sslmode=verify-full&sslrootcert={bundle}")
                }
                _ => address.to_string(),
            };
            Ok(SqlStore::Postgres(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect_lazy(&address)
                    .map_err(|err| {
                        crate::Error::InternalError(format!(
                            "Failed to create connection pool for {address:?}: {err}"
                        ))
                    })?,
            ))
        } else if address.starts_with("sqlite:") {
            Ok(SqlStore::SqlLite(
                SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_lazy(address)
                    .map_err(|err| {
                        crate::Error::InternalError(format!(
                            "Failed to create connection pool for {address:?}: {err}"
                        ))
                    })?,
            ))
        } else {
            Err(crate::Error::InternalError(format!(
                "Invalid database address {address:?}"
            )))
        }
    }

    pub async fn execute(&self, query: &str, params: &[&str]) -> crate::Result<u64> {
        match self {
            SqlStore::Postgres(pool) => {
                let mut q = sqlx::query(query);
                for param in params {
                    q = q.bind(*param);
                }
                q.execute(pool)
                    .await
                    .map(|result| result.rows_affected())
                    .map_err(into_error)
            }
            SqlStore::SqlLite(pool) => {
                let mut q = sqlx::query(query);
                for param in params {
                    q = q.bind(*param);
                }
                q.execute(pool)
                    .await
                    .map(|result| result.rows_affected())
                    .map_err(into_error)
            }
        }
    }

    pub async fn fetch_row(
        &self,
        query: &str,
        params: &[&str],
    ) -> crate::Result<Option<Vec<Option<String>>>> {
        match self {
            SqlStore::Postgres(pool) => {
                let mut q = sqlx::query(query);
                for param in params {
                    q = q.bind(*param);
                }
                q.fetch_optional(pool)
                    .await
                    .map_err(into_error)?
                    .map(|row| {
                        (0..row.columns().len())
                            .map(|idx| row.try_get::<Option<String>, _>(idx).map_err(into_error))
                            .collect::<crate::Result<Vec<_>>>()
                    })
                    .transpose()
            }
            SqlStore::SqlLite(pool) => {
                let mut q = sqlx::query(query);
                for param in params {
                    q = q.bind(*param);
                }
                q.fetch_optional(pool)
                    .await
                    .map_err(into_error)?
                    .map(|row| {
                        (0..row.columns().len())
                            .map(|idx| row.try_get::<Option<String>, _>(idx).map_err(into_error))
                            .collect::<crate::Result<Vec<_>>>()
                    })
                    .transpose()
            }
        }
    }

    pub async fn fetch_rows(
        &self,
        query: &str,
        params: &[&str],
    ) -> crate::Result<Vec<Vec<Option<String>>>> {
        match self {
            SqlStore::Postgres(pool) => {
                let mut q = sqlx::query(query);
                for param in params {
                    q = q.bind(*param);
                }
                q.fetch_all(pool)
                    .await
                    .map_err(into_error)?
                    .into_iter()
                    .map(|row| {
                        (0..row.columns().len())
                            .map(|idx| row.try_get::<Option<String>, _>(idx).map_err(into_error))
                            .collect::<crate::Result<Vec<_>>>()
                    })
                    .collect()
            }
            SqlStore::SqlLite(pool) => {
                let mut q = sqlx::query(query);
                for param in params {
                    q = q.bind(*param);
                }
                q.fetch_all(pool)
                    .await
                    .map_err(into_error)?
                    .into_iter()
                    .map(|row| {
                        (0..row.columns().len())
                            .map(|idx| row.try_get::<Option<String>, _>(idx).map_err(into_error))
                            .collect::<crate::Result<Vec<_>>>()
                    })
                    .collect()
            }
        }
    }
}

fn into_error(err: sqlx::Error) -> crate::Error {
    crate::Error::InternalError(format!("SQL error: {err}"))
}

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

use store::{dispatch::current_bucket_key, LookupStore, MemoryStore, SqlStore};
use utils::config::Config;

#[tokio::test]
async fn expired_buckets_are_empty_on_read() {
    let memory = MemoryStore::default();
    let store = LookupStore::Memory(memory);
    store
        .add_to_bucket("ttl-a@x.org", "b@y.org", "entry")
        .await
        .unwrap();
    assert_eq!(store.read_bucket().await.unwrap().len(), 1);

    // Fast-forward the bucket TTL
    match &store {
        LookupStore::Memory(memory) => memory.expire_now(&current_bucket_key()),
        _ => unreachable!(),
    }
    assert!(store.read_bucket().await.unwrap().is_empty());

    // A fresh insert after expiry starts a new bucket
    assert!(store
        .add_to_bucket("ttl-a@x.org", "b@y.org", "entry")
        .await
        .unwrap());
    assert_eq!(store.read_bucket().await.unwrap().len(), 1);
}

#[tokio::test]
async fn expired_sender_flags_clear_themselves() {
    let memory = MemoryStore::default();
    memory
        .key_set("auth_fail:exp-a@x.org", "now", Some(1))
        .await
        .unwrap();
    memory.expire_now("auth_fail:exp-a@x.org");
    assert!(!memory.key_exists("auth_fail:exp-a@x.org").await.unwrap());
}

#[tokio::test]
async fn sql_store_round_trips_rows() {
    let mut config = Config::default();
    config.set("store.db.address", "sqlite::memory:");
    config.set("store.db.max-connections", "1");
    let sql = SqlStore::open(&config).await.unwrap();

    sql.execute(
        "CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT)",
        &[],
    )
    .await
    .unwrap();
    sql.execute("INSERT INTO kv (key, value) VALUES ($1, $2)", &["k1", "v1"])
        .await
        .unwrap();
    sql.execute("INSERT INTO kv (key, value) VALUES ($1, $2)", &["k2", "v2"])
        .await
        .unwrap();

    let row = sql
        .fetch_row("SELECT value FROM kv WHERE key = $1", &["k1"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row, vec![Some("v1".to_string())]);

    assert!(sql
        .fetch_row("SELECT value FROM kv WHERE key = $1", &["missing"])
        .await
        .unwrap()
        .is_none());

    let rows = sql
        .fetch_rows("SELECT key, value FROM kv ORDER BY key", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec![Some("k1".to_string()), Some("v1".to_string())]);
}

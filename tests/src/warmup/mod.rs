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

pub mod batch;
pub mod credentials;
pub mod ingest;

use std::sync::Arc;

use store::{LookupStore, MemoryStore, SqlStore};
use utils::{codec::crypt::SymmetricKey, config::Config};
use warmup::{
    core::{Settings, Warmer},
    queue::{MemoryQueue, MessageQueue},
};

pub const TEST_SECRET: &str = "6b2d1c8f3e4a5b6c7d8e9f0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c";

const SCHEMA: &[&str] = &[
    concat!(
        "CREATE TABLE IF NOT EXISTS warmup_email_logs (",
        "id INTEGER PRIMARY KEY AUTOINCREMENT, ",
        "warmup_id TEXT NOT NULL, ",
        "recipient_email TEXT NOT NULL, ",
        "status TEXT NOT NULL, ",
        "sent_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS warmup_email_service_email_credential (",
        "email_id TEXT PRIMARY KEY, ",
        "service TEXT NOT NULL, ",
        "password TEXT, ",
        "access_token TEXT, ",
        "refresh_token TEXT)"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS issue (",
        "id INTEGER PRIMARY KEY AUTOINCREMENT, ",
        "title TEXT NOT NULL, ",
        "description TEXT, ",
        "service TEXT, ",
        "priority TEXT, ",
        "probable_cause TEXT, ",
        "context TEXT)"
    ),
];

pub async fn new_test_core() -> Arc<Warmer> {
    let mut config = Config::default();
    config.set("store.db.address", "sqlite::memory:");
    config.set("store.db.max-connections", "1");
    config.set("oauth.client-id", "test-client-id");
    config.set("oauth.client-secret", "test-client-secret");
    config.set("oauth.redirect-uri", "http://localhost/oauth/callback");

    let sql = SqlStore::open(&config).await.unwrap();
    for statement in SCHEMA {
        sql.execute(statement, &[]).await.unwrap();
    }

    Arc::new(Warmer {
        queue: MessageQueue::Memory(MemoryQueue::new()),
        lookup: LookupStore::Memory(MemoryStore::default()),
        sql,
        crypto: SymmetricKey::from_hex(TEST_SECRET).unwrap(),
        settings: Settings::parse(&config).unwrap(),
    })
}

pub fn request_json(reply_from: &str, to: &str) -> String {
    serde_json::json!({
        "to": to,
        "originalSubject": "Quick question",
        "body": "Thanks, sounds good!",
        "keyword": "intro",
        "warmupId": "w-1",
        "inReplyTo": format!("<msg-1@{}>", reply_from.split('@').next_back().unwrap()),
        "referenceId": format!("<ref-1@{}>", reply_from.split('@').next_back().unwrap()),
        "replyFrom": reply_from,
        "customMailId": "TAG42"
    })
    .to_string()
}

pub fn memory_queue(core: &Warmer) -> &MemoryQueue {
    match &core.queue {
        MessageQueue::Memory(queue) => queue,
        _ => unreachable!(),
    }
}

pub async fn push_message(core: &Warmer, body: &str) {
    memory_queue(core).send(body, 0).await.unwrap();
}

pub async fn log_statuses(core: &Warmer, recipient: &str) -> Vec<String> {
    core.sql
        .fetch_rows(
            "SELECT status FROM warmup_email_logs WHERE recipient_email = $1 ORDER BY id",
            &[recipient],
        )
        .await
        .unwrap()
        .into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .collect()
}

pub async fn insert_credential(core: &Warmer, email: &str, service: &str, password: &str) {
    let sealed = core.crypto.seal(password);
    core.sql
        .execute(
            concat!(
                "INSERT INTO warmup_email_service_email_credential ",
                "(email_id, service, password) VALUES ($1, $2, $3)"
            ),
            &[email, service, sealed.as_str()],
        )
        .await
        .unwrap();
}

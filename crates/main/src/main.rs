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

use std::sync::Arc;

use store::{LookupStore, RedisStore, SqlStore};
use tokio::sync::mpsc;
use utils::{
    codec::crypt::SymmetricKey, config::Config, enable_tracing, wait_for_shutdown, UnwrapFailure,
};
use warmup::{
    core::{Settings, Warmer},
    queue::{MessageQueue, SqsQueue},
    Event, SpawnLoops,
};

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config::parse_env();

    // Enable logging
    let _tracing_guard = enable_tracing(&config).failed("Failed to enable tracing");
    tracing::info!(
        "Starting Stalwart Mail Warmer v{}...",
        env!("CARGO_PKG_VERSION")
    );

    // Build shared resources
    let crypto = SymmetricKey::from_hex(
        config
            .value_require("crypto.secret")
            .failed("Invalid configuration"),
    )
    .failed("Invalid encryption secret");
    let lookup = LookupStore::Redis(
        RedisStore::open(&config)
            .await
            .failed("Failed to open Redis store"),
    );
    let sql = SqlStore::open(&config)
        .await
        .failed("Failed to open database");
    let queue = MessageQueue::Sqs(
        SqsQueue::open(&config)
            .await
            .failed("Failed to open work queue"),
    );
    let settings = Settings::parse(&config).failed("Invalid configuration");

    let core = Arc::new(Warmer {
        queue,
        lookup,
        sql,
        crypto,
        settings,
    });

    // Spawn the ingest and batch loops
    let (ingest_tx, ingest_rx) = mpsc::channel(16);
    let (batch_tx, batch_rx) = mpsc::channel(16);
    core.spawn_loops(ingest_rx, batch_rx);

    // Wait for shutdown signal
    wait_for_shutdown().await;
    tracing::info!("Shutting down.");

    // Stop services and let in-flight ticks drain
    ingest_tx.send(Event::Stop).await.ok();
    batch_tx.send(Event::Stop).await.ok();
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    Ok(())
}

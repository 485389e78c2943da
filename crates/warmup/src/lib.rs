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

use tokio::sync::mpsc;

use crate::{batch::SpawnBatch, core::Warmer, ingest::SpawnIngest};

pub mod batch;
pub mod core;
pub mod credentials;
pub mod dispatch;
pub mod ingest;
pub mod queue;
pub mod reporting;
pub mod rescue;

#[derive(Debug)]
pub enum Event {
    Refresh,
    Stop,
}

pub trait SpawnLoops {
    fn spawn_loops(self, ingest_rx: mpsc::Receiver<Event>, batch_rx: mpsc::Receiver<Event>);
}

impl SpawnLoops for Arc<Warmer> {
    fn spawn_loops(self, ingest_rx: mpsc::Receiver<Event>, batch_rx: mpsc::Receiver<Event>) {
        SpawnIngest::spawn(ingest_rx, self.clone());
        SpawnBatch::spawn(batch_rx, self);
    }
}

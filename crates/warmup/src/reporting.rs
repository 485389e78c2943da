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

use crate::core::Warmer;

pub const STATUS_REPLIED: &str = "REPLIED";
pub const STATUS_IN_SPAM: &str = "IN_SPAM";
pub const STATUS_SENT: &str = "SENT";

pub const PRIORITY_LOW: &str = "LOW";
pub const PRIORITY_MEDIUM: &str = "MEDIUM";
pub const PRIORITY_HIGH: &str = "HIGH";

const INSERT_LOG: &str = concat!(
    "INSERT INTO warmup_email_logs (warmup_id, recipient_email, status, sent_at) ",
    "VALUES ($1, $2, $3, CURRENT_TIMESTAMP)"
);
const INSERT_ISSUE: &str = concat!(
    "INSERT INTO issue (title, description, service, priority, probable_cause, context) ",
    "VALUES ($1, $2, $3, $4, $5, $6)"
);

impl Warmer {
    pub async fn log_warmup(&self, warmup_id: &str, recipient: &str, status: &str) {
        if let Err(err) = self
            .sql
            .execute(INSERT_LOG, &[warmup_id, recipient, status])
            .await
        {
            tracing::error!(
                context = "reporting",
                event = "error",
                warmup_id = warmup_id,
                recipient = recipient,
                status = status,
                "Failed to append warmup log: {}",
                err
            );
        }
    }

    pub async fn report_issue(
        &self,
        title: &str,
        description: &str,
        priority: &str,
        probable_cause: &[&str],
        issue_context: &str,
    ) {
        tracing::error!(
            context = "issue",
            event = "report",
            title = title,
            priority = priority,
            "{}",
            description
        );
        let probable_cause = serde_json::to_string(probable_cause).unwrap_or_default();
        if let Err(err) = self
            .sql
            .execute(
                INSERT_ISSUE,
                &[
                    title,
                    description,
                    "warmup-worker",
                    priority,
                    probable_cause.as_str(),
                    issue_context,
                ],
            )
            .await
        {
            tracing::error!(
                context = "reporting",
                event = "error",
                title = title,
                "Failed to insert issue: {}",
                err
            );
        }
    }
}

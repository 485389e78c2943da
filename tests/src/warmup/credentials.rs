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

use warmup::dispatch::DeliveryRoute;

use super::{insert_credential, new_test_core};

#[tokio::test]
async fn credentials_decrypt_and_route_to_smtp() {
    let core = new_test_core().await;
    insert_credential(&core, "cred-a@x.org", "outlook", "hunter2").await;

    let credentials = core.get_credentials("cred-a@x.org").await.unwrap();
    assert_eq!(credentials.service, "outlook");
    assert_eq!(credentials.smtp_password.as_deref(), Some("hunter2"));
    assert_eq!(credentials.oauth_access, None);
    assert_eq!(credentials.oauth_refresh, None);

    match core.resolve_route(&credentials) {
        Some(DeliveryRoute::Smtp { provider, password }) => {
            assert_eq!(provider.name, "outlook");
            assert_eq!(provider.smtp_host, "smtp.office365.com");
            assert_eq!(password, "hunter2");
        }
        _ => panic!("expected the SMTP route"),
    }

    assert!(core.get_credentials("nobody@x.org").await.is_none());
}

#[tokio::test]
async fn oauth_tokens_select_the_vendor_api_route() {
    let core = new_test_core().await;
    let access = core.crypto.seal("ya29.access");
    let refresh = core.crypto.seal("1//refresh");
    let password = core.crypto.seal("hunter2");
    core.sql
        .execute(
            concat!(
                "INSERT INTO warmup_email_service_email_credential ",
                "(email_id, service, password, access_token, refresh_token) ",
                "VALUES ($1, $2, $3, $4, $5)"
            ),
            &[
                "oauth-a@x.org",
                "gmail",
                password.as_str(),
                access.as_str(),
                refresh.as_str(),
            ],
        )
        .await
        .unwrap();

    let credentials = core.get_credentials("oauth-a@x.org").await.unwrap();
    match core.resolve_route(&credentials) {
        Some(DeliveryRoute::Gmail {
            access_token,
            refresh_token,
        }) => {
            assert_eq!(access_token, "ya29.access");
            assert_eq!(refresh_token, "1//refresh");
        }
        _ => panic!("expected the Gmail API route"),
    }
}

#[tokio::test]
async fn undecryptable_fields_are_treated_as_absent() {
    let core = new_test_core().await;
    let password = core.crypto.seal("hunter2");
    core.sql
        .execute(
            concat!(
                "INSERT INTO warmup_email_service_email_credential ",
                "(email_id, service, password, access_token) ",
                "VALUES ($1, $2, $3, $4)"
            ),
            &["garbled-a@x.org", "gmail", password.as_str(), "not:sealed"],
        )
        .await
        .unwrap();

    let credentials = core.get_credentials("garbled-a@x.org").await.unwrap();
    assert_eq!(credentials.smtp_password.as_deref(), Some("hunter2"));
    assert_eq!(credentials.oauth_access, None);

    // Without usable OAuth tokens the password still routes via SMTP
    assert!(matches!(
        core.resolve_route(&credentials),
        Some(DeliveryRoute::Smtp { .. })
    ));
}

#[tokio::test]
async fn refreshed_access_tokens_are_persisted_encrypted() {
    let core = new_test_core().await;
    insert_credential(&core, "refresh-a@x.org", "gmail", "hunter2").await;

    core.persist_refreshed_access("refresh-a@x.org", "ya29.fresh")
        .await;

    let sealed = core
        .sql
        .fetch_row(
            "SELECT access_token FROM warmup_email_service_email_credential WHERE email_id = $1",
            &["refresh-a@x.org"],
        )
        .await
        .unwrap()
        .unwrap()
        .remove(0)
        .unwrap();
    assert_ne!(sealed, "ya29.fresh");
    assert_eq!(core.crypto.open(&sealed).unwrap(), "ya29.fresh");

    let credentials = core.get_credentials("refresh-a@x.org").await.unwrap();
    assert_eq!(credentials.oauth_access.as_deref(), Some("ya29.fresh"));
}

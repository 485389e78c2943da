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

// Mailbox endpoints and folder names per provider. Unknown services are
// treated as Gmail-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provider {
    pub name: &'static str,
    pub smtp_host: &'static str,
    pub smtp_port: u16,
    pub imap_host: &'static str,
    pub imap_port: u16,
    pub spam_folder: &'static str,
    pub inbox_folder: &'static str,
}

pub const GMAIL: Provider = Provider {
    name: "gmail",
    smtp_host: "smtp.gmail.com",
    smtp_port: 587,
    imap_host: "imap.gmail.com",
    imap_port: 993,
    spam_folder: "[Gmail]/Spam",
    inbox_folder: "INBOX",
};

pub const OUTLOOK: Provider = Provider {
    name: "outlook",
    smtp_host: "smtp.office365.com",
    smtp_port: 587,
    imap_host: "outlook.office365.com",
    imap_port: 993,
    spam_folder: "Spam",
    inbox_folder: "Inbox",
};

pub const SKYFUNNEL: Provider = Provider {
    name: "skyfunnel",
    smtp_host: "smtp.skyfunnel.us",
    smtp_port: 465,
    imap_host: "imap.skyfunnel.us",
    imap_port: 993,
    spam_folder: "SPAM",
    inbox_folder: "INBOX",
};

impl Provider {
    pub fn lookup(service: &str) -> Provider {
        match service.to_ascii_lowercase().as_str() {
            "outlook" | "office365" => OUTLOOK,
            "skyfunnel" => SKYFUNNEL,
            _ => GMAIL,
        }
    }

    pub fn smtp_tls_implicit(&self) -> bool {
        self.smtp_port == 465
    }
}

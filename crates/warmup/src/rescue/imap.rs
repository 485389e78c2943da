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

use mail_send::smtp::tls::build_tls_connector;
use rustls_pki_types::ServerName;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::core::{provider::Provider, Warmer};

use super::Error;

const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ImapClient<T: AsyncRead + AsyncWrite> {
    stream: T,
    timeout: Duration,
    tag_seq: usize,
}

pub(super) async fn rescue(
    warmer: &Warmer,
    provider: &Provider,
    sender: &str,
    password: &str,
    tag: &str,
) -> Result<usize, Error> {
    let connector = build_tls_connector(false);
    let mut client = ImapClient::connect(
        format!("{}:{}", provider.imap_host, provider.imap_port),
        warmer.settings.mail_timeout,
        &connector,
        provider.imap_host,
    )
    .await?;

    // The session is closed on every exit path, racing the server against
    // a short watchdog.
    let result = client.rescue_tagged(provider, sender, password, tag).await;
    tokio::time::timeout(LOGOUT_TIMEOUT, client.logout())
        .await
        .ok();
    result
}

impl ImapClient<TlsStream<TcpStream>> {
    pub async fn connect(
        addr: impl ToSocketAddrs,
        timeout: Duration,
        tls_connector: &TlsConnector,
        tls_hostname: &str,
    ) -> Result<Self, Error> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|err| Error::Io(err.to_string()))?;
        let stream = tokio::time::timeout(
            timeout,
            tls_connector.connect(
                ServerName::try_from(tls_hostname.to_string())
                    .map_err(|_| Error::Protocol("Invalid TLS name".to_string()))?,
                stream,
            ),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|err| Error::Io(err.to_string()))?;

        let mut client = ImapClient {
            stream,
            timeout,
            tag_seq: 0,
        };
        client.expect_greeting().await?;
        Ok(client)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> ImapClient<T> {
    async fn rescue_tagged(
        &mut self,
        provider: &Provider,
        sender: &str,
        password: &str,
        tag: &str,
    ) -> Result<usize, Error> {
        self.login(sender, password).await?;
        self.select(provider.spam_folder).await?;

        // Collect every matching UID before issuing any further command;
        // pipelining into a response that is still being read deadlocks the
        // session.
        let uids = self.uid_search_subject_unseen(tag).await?;
        if uids.is_empty() {
            return Ok(0);
        }

        self.uid_store_seen(&uids).await?;
        self.uid_move(&uids, provider.inbox_folder).await?;
        Ok(uids.len())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), Error> {
        match self
            .command(&format!(
                "LOGIN {} {}",
                quote_string(username),
                quote_string(password)
            ))
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::Protocol(reason)) => Err(Error::Auth(reason)),
            Err(err) => Err(err),
        }
    }

    pub async fn select(&mut self, folder: &str) -> Result<(), Error> {
        self.command(&format!("SELECT {}", quote_string(folder)))
            .await
            .map(|_| ())
    }

    pub async fn uid_search_subject_unseen(&mut self, tag: &str) -> Result<Vec<u32>, Error> {
        let lines = self
            .command(&format!(
                "UID SEARCH HEADER Subject {} UNSEEN",
                quote_string(tag)
            ))
            .await?;
        let mut uids = Vec::new();
        for line in &lines {
            uids.extend(parse_search_line(line));
        }
        Ok(uids)
    }

    pub async fn uid_store_seen(&mut self, uids: &[u32]) -> Result<(), Error> {
        self.command(&format!(
            "UID STORE {} +FLAGS (\\Seen)",
            format_uid_set(uids)
        ))
        .await
        .map(|_| ())
    }

    pub async fn uid_move(&mut self, uids: &[u32], folder: &str) -> Result<(), Error> {
        self.command(&format!(
            "UID MOVE {} {}",
            format_uid_set(uids),
            quote_string(folder)
        ))
        .await
        .map(|_| ())
    }

    pub async fn logout(&mut self) -> Result<(), Error> {
        let tag = self.next_tag();
        self.write(format!("{tag} LOGOUT\r\n").as_bytes())
            .await
            .map_err(|err| Error::Io(err.to_string()))
    }

    async fn expect_greeting(&mut self) -> Result<(), Error> {
        tokio::time::timeout(self.timeout, async {
            let line = self.read_chunk().await?;
            if line.starts_with(b"* OK") {
                Ok(())
            } else {
                Err(Error::Protocol(into_string(line)))
            }
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    // Sends one command and drains the complete response: every untagged
    // line is returned once the tagged completion has been read.
    async fn command(&mut self, command: &str) -> Result<Vec<String>, Error> {
        let tag = self.next_tag();
        tokio::time::timeout(self.timeout, async {
            self.write(format!("{tag} {command}\r\n").as_bytes())
                .await
                .map_err(|err| Error::Io(err.to_string()))?;

            let done_ok = format!("{tag} OK");
            let done_no = format!("{tag} NO");
            let done_bad = format!("{tag} BAD");
            let mut lines = Vec::new();
            let mut buffer = Vec::new();
            loop {
                buffer.extend_from_slice(&self.read_chunk().await?);
                while let Some(pos) = buffer.iter().position(|&ch| ch == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line).trim_end().to_string();
                    if line.starts_with(&done_ok) {
                        return Ok(lines);
                    } else if line.starts_with(&done_no) || line.starts_with(&done_bad) {
                        return Err(Error::Protocol(line));
                    } else {
                        lines.push(line);
                    }
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; 1024];
        let br = self
            .stream
            .read(&mut buf)
            .await
            .map_err(|err| Error::Io(err.to_string()))?;
        if br > 0 {
            buf.truncate(br);
            Ok(buf)
        } else {
            Err(Error::Io("Connection disconnected by peer".to_string()))
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), std::io::Error> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    fn next_tag(&mut self) -> String {
        self.tag_seq += 1;
        format!("W{}", self.tag_seq)
    }
}

fn into_string(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}

pub fn parse_search_line(line: &str) -> Vec<u32> {
    line.strip_prefix("* SEARCH")
        .map(|rest| {
            rest.split_ascii_whitespace()
                .filter_map(|uid| uid.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn format_uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

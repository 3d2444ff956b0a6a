/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailwatch, an incremental mailbox synchronizer.
 *
 * Mailwatch is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailwatch is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailwatch.  If not, see <http://www.gnu.org/licenses/>.
 */

//! IMAP store: connects over plain TCP, implicit TLS or STARTTLS, authenticates, and hands
//! out one session per pass. Protocol failures are mapped onto `SyncError` kinds here.

mod client;
#[cfg(test)]
mod test_server;

pub use client::{Completion, FetchData, ImapClient, ImapError, ImapLine, ImapStatus, SelectEvent};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ConnectionConfig;
use crate::net::MailStream;
use crate::store::{MailStore, MailboxStatus, StoreSession, SyncError, Uid};

/// [`MailStore`] backed by a real IMAP server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapStore;

impl ImapStore {
    pub fn new() -> Self {
        Self
    }
}

fn transport_error(host: &str, port: u16, e: impl std::fmt::Display) -> SyncError {
    SyncError::network(format!("{}:{}: {}", host, port, e))
}

#[async_trait]
impl MailStore for ImapStore {
    type Session = ImapSession;

    async fn connect(&self, params: &ConnectionConfig) -> Result<ImapSession, SyncError> {
        let (host, port) = (params.host.as_str(), params.port);
        tracing::debug!(host = %host, port, use_ssl = params.use_ssl, starttls = params.starttls, "connecting");

        let stream = if params.use_ssl {
            MailStream::connect_implicit_tls(host, port).await
        } else {
            MailStream::connect_plain(host, port).await
        }
        .map_err(|e| transport_error(host, port, e))?;

        let mut client = ImapClient::connect(stream)
            .await
            .map_err(|e| transport_error(host, port, e))?;

        if params.starttls {
            if params.use_ssl {
                tracing::warn!("starttls ignored: connection already uses implicit TLS");
            } else {
                client
                    .starttls()
                    .await
                    .map_err(|e| transport_error(host, port, e))?;
                let upgraded = client
                    .into_inner()
                    .upgrade_to_tls(host)
                    .await
                    .map_err(|e| transport_error(host, port, e))?;
                client = ImapClient::resume(upgraded);
                client
                    .refresh_capabilities()
                    .await
                    .map_err(|e| transport_error(host, port, e))?;
            }
        }

        if client.is_preauthenticated() {
            tracing::debug!("server pre-authenticated the connection");
        } else {
            client
                .login(&params.username, &params.password)
                .await
                .map_err(|e| match e {
                    e if e.is_rejection() => SyncError::Auth {
                        username: params.username.clone(),
                        reason: e.to_string(),
                    },
                    e => transport_error(host, port, e),
                })?;
        }
        tracing::info!(host = %host, username = %params.username, "authenticated");
        Ok(ImapSession::new(client))
    }
}

/// Authenticated IMAP session. Generic over the stream so tests can drive it in memory.
pub struct ImapSession<S = MailStream> {
    client: ImapClient<S>,
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(client: ImapClient<S>) -> Self {
        Self { client }
    }

    async fn fetch_body(&mut self, uid: Uid, items: &str) -> Result<Vec<u8>, SyncError> {
        let responses = self
            .client
            .uid_fetch(uid.get(), items)
            .await
            .map_err(|e| match e {
                e if e.is_rejection() => SyncError::fetch(uid, e.to_string()),
                e => SyncError::network(e.to_string()),
            })?;
        responses
            .into_iter()
            .find_map(|f| f.literals.into_iter().next())
            .ok_or_else(|| SyncError::fetch(uid, "response carried no message data"))
    }
}

#[async_trait]
impl<S> StoreSession for ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus, SyncError> {
        let status = self.client.select(mailbox).await.map_err(|e| match e {
            e if e.is_rejection() => SyncError::Mailbox {
                mailbox: mailbox.to_string(),
                reason: e.to_string(),
            },
            e => SyncError::network(e.to_string()),
        })?;
        tracing::debug!(
            mailbox = %mailbox,
            exists = status.exists,
            uid_validity = ?status.uid_validity,
            uid_next = ?status.uid_next,
            "mailbox selected"
        );
        Ok(status)
    }

    async fn uid_search_from(&mut self, first: u64) -> Result<Vec<Uid>, SyncError> {
        let criteria = format!("UID {}:*", first.max(1));
        let uids = self.client.uid_search(&criteria).await.map_err(|e| match e {
            e if e.is_rejection() => SyncError::Query(e.to_string()),
            e => SyncError::network(e.to_string()),
        })?;
        Ok(uids.into_iter().map(Uid).collect())
    }

    async fn fetch_header_fields(&mut self, uid: Uid, fields: &[&str]) -> Result<Vec<u8>, SyncError> {
        let items = format!("(BODY.PEEK[HEADER.FIELDS ({})])", fields.join(" ").to_ascii_uppercase());
        self.fetch_body(uid, &items).await
    }

    async fn fetch_message(&mut self, uid: Uid) -> Result<Vec<u8>, SyncError> {
        self.fetch_body(uid, "(BODY[])").await
    }

    async fn close_mailbox(&mut self) -> Result<(), SyncError> {
        self.client
            .close()
            .await
            .map_err(|e| SyncError::network(e.to_string()))
    }

    async fn logout(&mut self) -> Result<(), SyncError> {
        self.client
            .logout()
            .await
            .map_err(|e| SyncError::network(e.to_string()))
    }
}

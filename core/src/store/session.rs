/*
 * session.rs
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

//! StoreSession trait: one authenticated connection, strictly request/response.

use async_trait::async_trait;

use crate::store::error::SyncError;
use crate::store::message::Uid;

/// Mailbox state reported by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    pub exists: u32,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
}

/// Logical operations of an authenticated session. Each call is a single blocking
/// round trip; no two calls are in flight at once.
#[async_trait]
pub trait StoreSession: Send {
    /// Select a mailbox; search and fetch operate on it afterwards.
    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus, SyncError>;

    /// UIDs in `first:*`, in server order. Servers include the highest UID even
    /// when it is below `first`; callers filter.
    async fn uid_search_from(&mut self, first: u64) -> Result<Vec<Uid>, SyncError>;

    /// Header-only projection of the named fields (raw header bytes, CRLF separated).
    async fn fetch_header_fields(&mut self, uid: Uid, fields: &[&str]) -> Result<Vec<u8>, SyncError>;

    /// Full raw message.
    async fn fetch_message(&mut self, uid: Uid) -> Result<Vec<u8>, SyncError>;

    /// Close the selected mailbox.
    async fn close_mailbox(&mut self) -> Result<(), SyncError>;

    /// End the session and release the transport.
    async fn logout(&mut self) -> Result<(), SyncError>;
}

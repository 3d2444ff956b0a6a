/*
 * store.rs
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

//! MailStore trait: the connect capability the sync engine receives.

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::store::error::SyncError;
use crate::store::session::StoreSession;

/// Opens authenticated sessions against a remote mail store (e.g. an IMAP server).
///
/// `connect` covers transport setup, greeting and authentication; the returned
/// session has no mailbox selected yet.
#[async_trait]
pub trait MailStore: Send + Sync {
    type Session: StoreSession;

    /// Connect and authenticate. Fails with `SyncError::Auth` or `SyncError::Network`.
    async fn connect(&self, params: &ConnectionConfig) -> Result<Self::Session, SyncError>;
}

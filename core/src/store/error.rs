/*
 * error.rs
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

//! Sync and protocol errors.

use crate::store::Uid;
use std::io;

/// Errors from a synchronization pass or one of its protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// LOGIN (or the greeting before it) was rejected by the server.
    #[error("authentication failed for {username}: {reason}")]
    Auth { username: String, reason: String },
    /// Transport failure while connecting or talking to the server.
    #[error("network error: {0}")]
    Network(String),
    /// SELECT of the configured mailbox was rejected.
    #[error("cannot select mailbox {mailbox}: {reason}")]
    Mailbox { mailbox: String, reason: String },
    /// Range search rejected by the server.
    #[error("search rejected: {0}")]
    Query(String),
    /// Header or body fetch failed for one identifier. Recoverable.
    #[error("fetch failed for UID {uid}: {reason}")]
    Fetch { uid: Uid, reason: String },
    /// Search or fetch issued without an active, mailbox-selected session.
    #[error("no active session: connect and select a mailbox first")]
    NotConnected,
    /// Persisting the cursor failed.
    #[error("cannot save cursor: {0}")]
    Cursor(#[source] io::Error),
}

impl SyncError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn fetch(uid: Uid, reason: impl Into<String>) -> Self {
        Self::Fetch {
            uid,
            reason: reason.into(),
        }
    }

    /// True for errors that only affect a single identifier within a pass.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Fetch { .. })
    }
}

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

//! Session lifecycle: connect, select the configured mailbox, hand out the live session,
//! disconnect.

use crate::config::ConnectionConfig;
use crate::store::{MailStore, MailboxStatus, StoreSession, SyncError};

/// Where the managed session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticated,
    MailboxSelected,
}

/// Owns at most one session at a time. Search and fetch go through [`session_mut`],
/// which fails with `NotConnected` unless a mailbox is selected.
///
/// [`session_mut`]: SessionManager::session_mut
pub struct SessionManager<'a, M: MailStore> {
    store: &'a M,
    session: Option<M::Session>,
    state: SessionState,
    mailbox: Option<MailboxStatus>,
}

impl<'a, M: MailStore> SessionManager<'a, M> {
    pub fn new(store: &'a M) -> Self {
        Self {
            store,
            session: None,
            state: SessionState::Disconnected,
            mailbox: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// SELECT result of the current session.
    pub fn mailbox_status(&self) -> Option<MailboxStatus> {
        self.mailbox
    }

    /// Connect, authenticate and select `params.mailbox`. An existing session is
    /// disconnected first.
    pub async fn connect(&mut self, params: &ConnectionConfig) -> Result<(), SyncError> {
        if self.session.is_some() {
            self.disconnect().await;
        }
        self.state = SessionState::Connecting;
        let mut session = match self.store.connect(params).await {
            Ok(s) => s,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };
        self.state = SessionState::Authenticated;

        match session.select(&params.mailbox).await {
            Ok(status) => {
                self.session = Some(session);
                self.mailbox = Some(status);
                self.state = SessionState::MailboxSelected;
                Ok(())
            }
            Err(e) => {
                if let Err(logout) = session.logout().await {
                    tracing::debug!(error = %logout, "logout after failed select");
                }
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// The live, mailbox-selected session.
    pub fn session_mut(&mut self) -> Result<&mut M::Session, SyncError> {
        match (self.state, self.session.as_mut()) {
            (SessionState::MailboxSelected, Some(session)) => Ok(session),
            _ => Err(SyncError::NotConnected),
        }
    }

    /// Close the mailbox and log out. Idempotent; failures are logged, never returned.
    pub async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.state = SessionState::Disconnected;
            return;
        };
        if self.state == SessionState::MailboxSelected {
            if let Err(e) = session.close_mailbox().await {
                tracing::debug!(error = %e, "close mailbox failed");
            }
        }
        if let Err(e) = session.logout().await {
            tracing::debug!(error = %e, "logout failed");
        }
        self.mailbox = None;
        self.state = SessionState::Disconnected;
    }
}

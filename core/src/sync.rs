/*
 * sync.rs
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

//! One synchronization pass: load cursor, connect, search above the cursor, filter
//! candidates by subject, fetch matches in full, persist the new cursor, disconnect.

use crate::config::{ConnectionConfig, CursorPolicy};
use crate::cursor::CursorStore;
use crate::fetch::{fetch_full, fetch_header_subject};
use crate::search::search;
use crate::session::SessionManager;
use crate::store::{MailStore, ProcessedMessage, SyncError, Uid};
use crate::subject::parse_subject;

/// Phase of the pass in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Connected,
    Searching,
    Filtering,
    Persisting,
}

/// Outcome of a completed pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Matching messages in ascending UID order.
    pub messages: Vec<ProcessedMessage>,
    pub cursor_before: u64,
    /// Cursor after the pass (equal to `cursor_before` when nothing was persisted).
    pub cursor_after: u64,
    /// Candidates examined.
    pub attempted: usize,
    /// Candidates whose header or body fetch failed.
    pub failed: Vec<Uid>,
}

/// Drives passes against one mailbox. Holds no session between passes.
pub struct SyncEngine<'a, M: MailStore> {
    config: &'a ConnectionConfig,
    cursor: CursorStore,
    sessions: SessionManager<'a, M>,
    state: PassState,
}

impl<'a, M: MailStore> SyncEngine<'a, M> {
    pub fn new(store: &'a M, config: &'a ConnectionConfig) -> Self {
        Self {
            config,
            cursor: CursorStore::new(config.state_file.clone()),
            sessions: SessionManager::new(store),
            state: PassState::Idle,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn cursor_store(&self) -> &CursorStore {
        &self.cursor
    }

    fn set_state(&mut self, state: PassState) {
        tracing::debug!(from = ?self.state, to = ?state, "pass state");
        self.state = state;
    }

    /// Run one pass. Connect, search and transport failures abort it with the cursor
    /// untouched; a failed fetch only skips that candidate. The session is released on
    /// every path.
    pub async fn run_pass(&mut self) -> Result<PassReport, SyncError> {
        let before = self.cursor.load();
        tracing::info!(mailbox = %self.config.mailbox, cursor = before, "pass started");

        if let Err(e) = self.sessions.connect(self.config).await {
            self.set_state(PassState::Idle);
            tracing::error!(error = %e, "connect failed");
            return Err(e);
        }
        self.set_state(PassState::Connected);

        let result = self.process(before).await;
        self.sessions.disconnect().await;
        self.set_state(PassState::Idle);

        match &result {
            Ok(report) => tracing::info!(
                attempted = report.attempted,
                matched = report.messages.len(),
                failed = report.failed.len(),
                cursor_before = report.cursor_before,
                cursor_after = report.cursor_after,
                "pass complete"
            ),
            Err(e) => tracing::error!(error = %e, cursor = before, "pass aborted"),
        }
        result
    }

    async fn process(&mut self, before: u64) -> Result<PassReport, SyncError> {
        self.set_state(PassState::Searching);
        let candidates = search(&mut self.sessions, before).await?;

        self.set_state(PassState::Filtering);
        let mut report = PassReport {
            cursor_before: before,
            cursor_after: before,
            ..PassReport::default()
        };
        let mut max_seen = before;
        for &uid in &candidates {
            report.attempted += 1;
            max_seen = max_seen.max(uid.get());
            match self.examine(uid).await {
                Ok(Some(message)) => report.messages.push(message),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(uid = %uid, error = %e, "skipping message");
                    report.failed.push(uid);
                }
                Err(e) => return Err(e),
            }
        }

        let next = match self.config.cursor_policy {
            CursorPolicy::Advance => max_seen,
            CursorPolicy::Hold => held_cursor(before, &candidates, &report.failed),
        };
        if next > before {
            self.set_state(PassState::Persisting);
            self.cursor.save(next).map_err(SyncError::Cursor)?;
            tracing::debug!(cursor = next, "cursor saved");
            report.cursor_after = next;
        }
        Ok(report)
    }

    /// Filter one candidate: `None` when its subject does not match the template.
    async fn examine(&mut self, uid: Uid) -> Result<Option<ProcessedMessage>, SyncError> {
        let subject = fetch_header_subject(&mut self.sessions, uid).await?;
        let Some(parsed) = parse_subject(Some(&subject)) else {
            tracing::trace!(uid = %uid, subject = %subject, "subject does not match");
            return Ok(None);
        };
        let message = fetch_full(&mut self.sessions, uid).await?;
        tracing::debug!(uid = %uid, event_type = %parsed.event_type, "message matched");
        Ok(Some(ProcessedMessage {
            id: uid,
            parsed,
            message,
        }))
    }
}

/// Highest candidate below the first failure, so failed messages are retried next pass.
fn held_cursor(before: u64, candidates: &[Uid], failed: &[Uid]) -> u64 {
    let Some(first_failed) = failed.iter().min() else {
        return candidates.last().map_or(before, |u| u.get().max(before));
    };
    candidates
        .iter()
        .take_while(|uid| *uid < first_failed)
        .last()
        .map_or(before, |u| u.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uids(ids: &[u64]) -> Vec<Uid> {
        ids.iter().copied().map(Uid).collect()
    }

    #[test]
    fn test_held_cursor() {
        let candidates = uids(&[5, 7, 9, 12]);
        assert_eq!(held_cursor(4, &candidates, &[]), 12);
        assert_eq!(held_cursor(4, &candidates, &uids(&[9])), 7);
        assert_eq!(held_cursor(4, &candidates, &uids(&[12, 7])), 5);
        assert_eq!(held_cursor(4, &candidates, &uids(&[5])), 4);
        assert_eq!(held_cursor(4, &[], &[]), 4);
    }
}

/*
 * search.rs
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

//! Candidate search: identifiers above the cursor.

use crate::session::SessionManager;
use crate::store::{MailStore, StoreSession, SyncError, Uid};

/// UIDs strictly greater than `lower`, ascending and without duplicates.
///
/// `UID SEARCH UID n:*` always includes the highest UID in the mailbox, even when it is
/// below `n`, so results are filtered here.
pub async fn search<M: MailStore>(
    sessions: &mut SessionManager<'_, M>,
    lower: u64,
) -> Result<Vec<Uid>, SyncError> {
    let first = lower.saturating_add(1);
    let mut uids = sessions.session_mut()?.uid_search_from(first).await?;
    let returned = uids.len();
    uids.retain(|uid| uid.get() > lower);
    uids.sort_unstable();
    uids.dedup();
    tracing::debug!(lower, returned, candidates = uids.len(), "search complete");
    Ok(uids)
}

/*
 * lib.rs
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

//! Incremental mailbox synchronization: find messages above a persisted UID watermark,
//! keep those whose subject follows the `[type][value] text [service] text` template,
//! and advance the watermark.

pub mod config;
pub mod cursor;
pub mod fetch;
pub mod logging;
pub mod net;
pub mod protocol;
pub mod search;
pub mod session;
pub mod store;
pub mod subject;
pub mod sync;

pub use config::{Config, ConfigError, ConnectionConfig, CursorPolicy, LoggingConfig};
pub use cursor::CursorStore;
pub use protocol::imap::{ImapSession, ImapStore};
pub use session::{SessionManager, SessionState};
pub use store::{MailMessage, MailStore, ProcessedMessage, StoreSession, SyncError, Uid};
pub use subject::{parse_subject, SubjectInfo};
pub use sync::{PassReport, PassState, SyncEngine};

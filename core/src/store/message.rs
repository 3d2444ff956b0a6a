/*
 * message.rs
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

//! Message identifier and decoded message types.

use serde::Serialize;
use std::fmt;

use crate::subject::SubjectInfo;

/// IMAP UID. Totally ordered; not necessarily contiguous nor starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Uid(pub u64);

impl Uid {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

/// One header field, value decoded (RFC 2047 words, unfolded).
#[derive(Debug, Clone, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A full message decoded into header/body structure. `raw` keeps the bytes as fetched.
#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub headers: Vec<Header>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    /// First text/plain part that is not an attachment.
    pub body_plain: Option<String>,
    pub size: usize,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl MailMessage {
    /// First header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// A candidate whose subject matched the template, with its full message.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedMessage {
    pub id: Uid,
    pub parsed: SubjectInfo,
    pub message: MailMessage,
}

/*
 * subject.rs
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

//! Subject template: `[event_type][value] text_before_service [service_info] text_after`.
//!
//! The two leading bracketed segments must be non-empty and back to back; each stops at
//! its first `]`. The first free-text run is the shortest one followed by a bracketed
//! segment, the rest of the line after that segment is the trailing text. Matching is
//! case-sensitive and captured free text is trimmed. Anything else is no match.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Fields of a subject that matched the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectInfo {
    pub event_type: String,
    pub value: String,
    pub text_before_service: String,
    pub service_info: String,
    pub text_after: String,
}

static SUBJECT_RE: OnceLock<Regex> = OnceLock::new();

fn subject_re() -> &'static Regex {
    SUBJECT_RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\[(?P<event_type>[^\]]+)\]\[(?P<value>[^\]]+)\]\s*",
            r"(?P<text_before_service>.*?)\s*",
            r"\[(?P<service_info>[^\]]+)\]\s*",
            r"(?P<text_after>.*)$",
        ))
        .expect("subject template regex is valid")
    })
}

/// Match `subject` against the template. `None` (absent subject) is treated as "".
pub fn parse_subject(subject: Option<&str>) -> Option<SubjectInfo> {
    let subject = subject.unwrap_or("");
    let caps = subject_re().captures(subject)?;
    let field = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };
    Some(SubjectInfo {
        event_type: field("event_type"),
        value: field("value"),
        text_before_service: field("text_before_service"),
        service_info: field("service_info"),
        text_after: field("text_after"),
    })
}

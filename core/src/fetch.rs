/*
 * fetch.rs
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

//! Message retrieval: a header-only projection for filtering and the full message for
//! matches. Decoding uses `mailparse`.

use mailparse::{MailHeaderMap, MailParseError, ParsedMail};

use crate::session::SessionManager;
use crate::store::{Header, MailMessage, MailStore, StoreSession, SyncError, Uid};

/// Subject of one message without downloading its body. An absent Subject header is "".
pub async fn fetch_header_subject<M: MailStore>(
    sessions: &mut SessionManager<'_, M>,
    uid: Uid,
) -> Result<String, SyncError> {
    let raw = sessions
        .session_mut()?
        .fetch_header_fields(uid, &["Subject"])
        .await?;
    let (headers, _) = mailparse::parse_headers(&raw)
        .map_err(|e| SyncError::fetch(uid, format!("malformed header: {}", e)))?;
    Ok(headers.get_first_value("Subject").unwrap_or_default())
}

/// Full message, decoded.
pub async fn fetch_full<M: MailStore>(
    sessions: &mut SessionManager<'_, M>,
    uid: Uid,
) -> Result<MailMessage, SyncError> {
    let raw = sessions.session_mut()?.fetch_message(uid).await?;
    decode_message(raw).map_err(|e| SyncError::fetch(uid, format!("undecodable message: {}", e)))
}

/// Decode raw RFC 5322 bytes into a [`MailMessage`].
pub fn decode_message(raw: Vec<u8>) -> Result<MailMessage, MailParseError> {
    let (headers, subject, from, date, body_plain) = {
        let parsed = mailparse::parse_mail(&raw)?;
        let headers: Vec<Header> = parsed
            .headers
            .iter()
            .map(|h| Header {
                name: h.get_key(),
                value: h.get_value(),
            })
            .collect();
        (
            headers,
            parsed.headers.get_first_value("Subject"),
            parsed.headers.get_first_value("From"),
            parsed.headers.get_first_value("Date"),
            first_plain_text(&parsed),
        )
    };
    Ok(MailMessage {
        headers,
        subject,
        from,
        date,
        body_plain,
        size: raw.len(),
        raw,
    })
}

/// Depth-first search for a text/plain leaf without Content-Disposition. A part whose
/// transfer encoding cannot be decoded is skipped.
fn first_plain_text(part: &ParsedMail<'_>) -> Option<String> {
    if part.subparts.is_empty() {
        let inline = part.headers.get_first_value("Content-Disposition").is_none();
        if !inline || !part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            return None;
        }
        return match part.get_body() {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!(error = %e, "cannot decode text/plain part");
                None
            }
        };
    }
    part.subparts.iter().find_map(first_plain_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple() {
        let raw = b"From: Ops <ops@example.com>\r\nSubject: =?UTF-8?Q?caf=C3=A9?=\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\n\r\nhello\r\n".to_vec();
        let msg = decode_message(raw.clone()).unwrap();
        assert_eq!(msg.subject.as_deref(), Some("café"));
        assert_eq!(msg.from.as_deref(), Some("Ops <ops@example.com>"));
        assert_eq!(msg.header("date"), Some("Mon, 1 Jan 2024 10:00:00 +0000"));
        assert_eq!(msg.body_plain.as_deref().map(str::trim_end), Some("hello"));
        assert_eq!(msg.size, raw.len());
        assert_eq!(msg.raw, raw);
    }

    #[test]
    fn test_decode_multipart_skips_attachment() {
        let raw = concat!(
            "Subject: report\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"log.txt\"\r\n",
            "\r\n",
            "attached\r\n",
            "--b1\r\n",
            "Content-Type: multipart/alternative; boundary=\"b2\"\r\n",
            "\r\n",
            "--b2\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>inline</p>\r\n",
            "--b2\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "inline\r\n",
            "--b2--\r\n",
            "--b1--\r\n",
        );
        let msg = decode_message(raw.as_bytes().to_vec()).unwrap();
        assert_eq!(msg.body_plain.as_deref().map(str::trim_end), Some("inline"));
    }

    #[test]
    fn test_undecodable_text_part_keeps_message() {
        let raw = concat!(
            "Subject: [Alert][High] Disk full [srv-01] check\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "@@@not base64!!!\r\n",
        );
        let msg = decode_message(raw.as_bytes().to_vec()).unwrap();
        assert_eq!(msg.subject.as_deref(), Some("[Alert][High] Disk full [srv-01] check"));
        assert_eq!(msg.body_plain, None);
        assert_eq!(msg.raw, raw.as_bytes());
    }

    #[test]
    fn test_undecodable_part_falls_through_to_next() {
        let raw = concat!(
            "Subject: x\r\n",
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "@@@not base64!!!\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "readable\r\n",
            "--b--\r\n",
        );
        let msg = decode_message(raw.as_bytes().to_vec()).unwrap();
        assert_eq!(msg.body_plain.as_deref().map(str::trim_end), Some("readable"));
    }

    #[test]
    fn test_decode_without_plain_part() {
        let raw = b"Subject: x\r\nContent-Type: text/html\r\n\r\n<b>x</b>\r\n".to_vec();
        assert_eq!(decode_message(raw).unwrap().body_plain, None);
    }
}

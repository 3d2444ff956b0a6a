/*
 * client.rs
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

//! Async IMAP4rev1 client: greeting, CAPABILITY, STARTTLS, LOGIN / AUTHENTICATE PLAIN,
//! SELECT, UID SEARCH, UID FETCH, CLOSE, LOGOUT. Strictly one command in flight:
//! each call writes a tagged command and reads until its tagged completion.

use std::io;

use base64::Engine;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream,
};

use crate::store::MailboxStatus;

/// Upper bound for a single literal; larger announcements are treated as garbage.
const MAX_LITERAL: usize = 256 * 1024 * 1024;

/// IMAP client error (network, protocol, server rejection).
#[derive(Debug, thiserror::Error)]
pub enum ImapError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Tagged NO.
    #[error("server rejected command: {0}")]
    No(String),
    /// Tagged BAD.
    #[error("server reported a protocol error: {0}")]
    Bad(String),
    /// Untagged BYE in place of a greeting.
    #[error("server closed the session: {0}")]
    Bye(String),
    #[error("unexpected server response: {0}")]
    Protocol(String),
    /// The response stream can no longer be framed (e.g. an oversized literal left unread).
    #[error("response stream out of sync: {0}")]
    Desync(String),
}

impl ImapError {
    /// True when the server answered (NO/BAD/garbage) as opposed to the transport failing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ImapError::No(_) | ImapError::Bad(_) | ImapError::Protocol(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapStatus {
    Ok,
    No,
    Bad,
    Bye,
    Preauth,
}

/// One logical response line (untagged `*`, continuation `+`, or tagged). Literals announced
/// with `{N}` are read out of band and kept in order in `literals`.
#[derive(Debug, Clone)]
pub struct ImapLine {
    pub raw: String,
    pub tag: Option<String>,
    pub untagged: bool,
    pub continuation: bool,
    pub status: Option<ImapStatus>,
    /// Text after the status word (or after `*` when there is none).
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

fn split_status(s: &str) -> (Option<ImapStatus>, String) {
    let (word, rest) = s.split_once(' ').unwrap_or((s, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => Some(ImapStatus::Ok),
        "NO" => Some(ImapStatus::No),
        "BAD" => Some(ImapStatus::Bad),
        "BYE" => Some(ImapStatus::Bye),
        "PREAUTH" => Some(ImapStatus::Preauth),
        _ => None,
    };
    match status {
        Some(_) => (status, rest.to_string()),
        None => (None, s.to_string()),
    }
}

fn parse_line(raw: String, literals: Vec<Vec<u8>>) -> ImapLine {
    let (tag, untagged, continuation, status, text) = if let Some(rest) = raw.strip_prefix('*') {
        let (status, text) = split_status(rest.trim_start());
        (None, true, false, status, text)
    } else if let Some(rest) = raw.strip_prefix('+') {
        (None, false, true, None, rest.trim_start().to_string())
    } else {
        let (tag, rest) = raw.split_once(' ').unwrap_or((raw.as_str(), ""));
        let (status, text) = split_status(rest);
        (Some(tag.to_string()).filter(|t| !t.is_empty()), false, false, status, text)
    };
    ImapLine {
        raw,
        tag,
        untagged,
        continuation,
        status,
        text,
        literals,
    }
}

/// `{N}` (or `{N+}`) at the end of a line announces an N-byte literal.
fn literal_size(line: &str) -> Option<usize> {
    let rest = line.strip_suffix('}')?;
    let open = rest.rfind('{')?;
    let digits = rest[open + 1..].trim_end_matches('+');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Read one CRLF-terminated line (bare LF tolerated); returns it with any announced literal size.
async fn read_line_literal_size<S>(
    stream: &mut S,
    buf: &mut Vec<u8>,
) -> io::Result<(String, Option<usize>)>
where
    S: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = stream.read_until(b'\n', buf).await?;
    if n == 0 || !buf.ends_with(b"\n") {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
    }
    let mut end = buf.len() - 1;
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    let size = literal_size(&line);
    Ok((line, size))
}

/// Read a full logical response: line fragments joined, literals collected.
async fn read_response<S>(stream: &mut S, buf: &mut Vec<u8>) -> Result<ImapLine, ImapError>
where
    S: AsyncBufRead + Unpin,
{
    let mut text = String::new();
    let mut literals = Vec::new();
    loop {
        let (line, size) = read_line_literal_size(stream, buf).await?;
        text.push_str(&line);
        let Some(n) = size else {
            return Ok(parse_line(text, literals));
        };
        if n > MAX_LITERAL {
            return Err(ImapError::Desync(format!("literal of {} bytes exceeds limit", n)));
        }
        let mut lit = vec![0u8; n];
        stream.read_exact(&mut lit).await?;
        literals.push(lit);
    }
}

/// Write a line (no CRLF) then CRLF, and flush.
async fn write_line<S>(stream: &mut S, line: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

fn quote_string(s: &str) -> Result<String, ImapError> {
    if s.contains(|c| matches!(c, '\r' | '\n' | '\0')) {
        return Err(ImapError::Protocol(
            "CR, LF and NUL cannot be sent in a quoted string".to_string(),
        ));
    }
    Ok(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
}

/// Command text safe for logs: arguments of LOGIN / AUTHENTICATE are dropped.
fn loggable(command: &str) -> &str {
    let verb = command.split(' ').next().unwrap_or(command);
    if verb.eq_ignore_ascii_case("LOGIN") || verb.eq_ignore_ascii_case("AUTHENTICATE") {
        verb
    } else {
        command
    }
}

/// Capabilities from `* CAPABILITY ...` or from a `[CAPABILITY ...]` response code.
fn parse_capabilities(line: &str) -> Vec<String> {
    let list = if let Some(rest) = line.strip_prefix("* CAPABILITY ") {
        rest
    } else if let Some(i) = line.find("[CAPABILITY ") {
        line[i + 12..].split(']').next().unwrap_or("")
    } else {
        ""
    };
    list.split_whitespace().map(|w| w.to_ascii_uppercase()).collect()
}

/// SELECT response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectEvent {
    Exists(u32),
    Recent(u32),
    Flags(Vec<String>),
    UidValidity(u32),
    UidNext(u32),
}

fn parse_select_event(line: &str) -> Option<SelectEvent> {
    let rest = line.strip_prefix("* ")?.trim_start();
    if let Some(n) = rest.strip_suffix(" EXISTS") {
        return n.trim().parse().ok().map(SelectEvent::Exists);
    }
    if let Some(n) = rest.strip_suffix(" RECENT") {
        return n.trim().parse().ok().map(SelectEvent::Recent);
    }
    if let Some(inner) = rest.strip_prefix("FLAGS (") {
        let end = inner.find(')')?;
        return Some(SelectEvent::Flags(
            inner[..end].split_whitespace().map(|s| s.to_string()).collect(),
        ));
    }
    if rest.starts_with("OK ") {
        let number_after = |code: &str| -> Option<u32> {
            let at = rest.find(code)?;
            rest[at + code.len()..]
                .split_whitespace()
                .next()?
                .trim_end_matches(']')
                .parse()
                .ok()
        };
        if let Some(n) = number_after("[UIDVALIDITY ") {
            return Some(SelectEvent::UidValidity(n));
        }
        if let Some(n) = number_after("[UIDNEXT ") {
            return Some(SelectEvent::UidNext(n));
        }
    }
    None
}

/// One `* n FETCH (...)` response.
#[derive(Debug, Clone)]
pub struct FetchData {
    pub seq: u32,
    pub uid: Option<u64>,
    pub raw: String,
    pub literals: Vec<Vec<u8>>,
}

impl FetchData {
    /// First literal in the response (the requested body section).
    pub fn body(&self) -> Option<&[u8]> {
        self.literals.first().map(|b| b.as_slice())
    }
}

fn find_uid(items: &str) -> Option<u64> {
    let upper = items.to_ascii_uppercase();
    ["(UID ", " UID "].iter().find_map(|pat| {
        let at = upper.find(pat)?;
        let digits: String = items[at + pat.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    })
}

/// Body section sent as a quoted string (`BODY[...] "..."`) instead of a literal.
fn quoted_section(items: &str) -> Option<Vec<u8>> {
    let start = items.find("] \"")? + 3;
    let mut out = Vec::new();
    let mut bytes = items[start..].bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'"' => return Some(out),
            b'\\' => out.push(bytes.next()?),
            _ => out.push(b),
        }
    }
    None
}

fn into_fetch(line: ImapLine) -> Option<FetchData> {
    if !line.untagged {
        return None;
    }
    let (seq, rest) = line.text.split_once(' ')?;
    let seq: u32 = seq.parse().ok()?;
    if !rest.get(..5)?.eq_ignore_ascii_case("FETCH") {
        return None;
    }
    let uid = find_uid(rest);
    let mut literals = line.literals;
    if literals.is_empty() {
        literals.extend(quoted_section(rest));
    }
    Some(FetchData {
        seq,
        uid,
        raw: line.raw,
        literals,
    })
}

/// Untagged responses of one command plus its tagged completion.
#[derive(Debug)]
pub struct Completion {
    pub untagged: Vec<ImapLine>,
    pub tagged: ImapLine,
}

impl Completion {
    /// Untagged lines when the command completed OK, else the matching error.
    pub fn ok(self) -> Result<Vec<ImapLine>, ImapError> {
        match self.tagged.status {
            Some(ImapStatus::Ok) => Ok(self.untagged),
            Some(ImapStatus::No) => Err(ImapError::No(self.tagged.text)),
            Some(ImapStatus::Bad) => Err(ImapError::Bad(self.tagged.text)),
            _ => Err(ImapError::Protocol(self.tagged.raw)),
        }
    }
}

/// IMAP client over any byte stream (TCP, TLS, or an in-memory pipe in tests).
pub struct ImapClient<S> {
    stream: BufStream<S>,
    read_buf: Vec<u8>,
    tag_counter: u32,
    capabilities: Vec<String>,
    preauth: bool,
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a fresh connection and read the server greeting (`* OK` or `* PREAUTH`).
    pub async fn connect(stream: S) -> Result<Self, ImapError> {
        let mut client = Self::resume(stream);
        let greeting = client.read_line().await?;
        if !greeting.untagged {
            return Err(ImapError::Protocol(format!("expected greeting, got: {}", greeting.raw)));
        }
        match greeting.status {
            Some(ImapStatus::Ok) => {}
            Some(ImapStatus::Preauth) => client.preauth = true,
            Some(ImapStatus::Bye) => return Err(ImapError::Bye(greeting.text)),
            _ => {
                return Err(ImapError::Protocol(format!("expected greeting, got: {}", greeting.raw)))
            }
        }
        client.capabilities = parse_capabilities(&greeting.raw);
        tracing::debug!(greeting = %greeting.text, "imap greeting");
        Ok(client)
    }

    /// Wrap a stream that is already past the greeting (e.g. after a STARTTLS upgrade).
    pub fn resume(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            read_buf: Vec::with_capacity(4096),
            tag_counter: 0,
            capabilities: Vec::new(),
            preauth: false,
        }
    }

    /// Give back the underlying stream. Buffered unread input is dropped.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// True when the greeting was PREAUTH (no login needed).
    pub fn is_preauthenticated(&self) -> bool {
        self.preauth
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Next tag (A0001, A0002, ...).
    fn next_tag(&mut self) -> String {
        self.tag_counter = self.tag_counter % 9999 + 1;
        format!("A{:04}", self.tag_counter)
    }

    async fn read_line(&mut self) -> Result<ImapLine, ImapError> {
        read_response(&mut self.stream, &mut self.read_buf).await
    }

    async fn await_completion(&mut self, tag: &str) -> Result<Completion, ImapError> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.tag.as_deref() == Some(tag) {
                tracing::trace!(tag = %tag, status = ?line.status, "imap <");
                return Ok(Completion {
                    untagged,
                    tagged: line,
                });
            }
            if line.untagged && line.raw.starts_with("* CAPABILITY ") {
                self.capabilities = parse_capabilities(&line.raw);
            }
            untagged.push(line);
        }
    }

    /// Send one command and read until its tagged completion.
    pub async fn execute(&mut self, command: &str) -> Result<Completion, ImapError> {
        let tag = self.next_tag();
        tracing::trace!(tag = %tag, command = %loggable(command), "imap >");
        let full = format!("{} {}", tag, command);
        write_line(&mut self.stream, full.as_bytes()).await?;
        self.await_completion(&tag).await
    }

    /// Issue CAPABILITY and replace the cached list.
    pub async fn refresh_capabilities(&mut self) -> Result<&[String], ImapError> {
        self.execute("CAPABILITY").await?.ok()?;
        Ok(&self.capabilities)
    }

    async fn ensure_capabilities(&mut self) -> Result<(), ImapError> {
        if self.capabilities.is_empty() {
            self.refresh_capabilities().await?;
        }
        Ok(())
    }

    /// Send STARTTLS. On success the caller upgrades `into_inner()` and `resume`s.
    pub async fn starttls(&mut self) -> Result<(), ImapError> {
        self.ensure_capabilities().await?;
        if !self.has_capability("STARTTLS") {
            return Err(ImapError::Protocol("server does not advertise STARTTLS".to_string()));
        }
        self.execute("STARTTLS").await?.ok()?;
        Ok(())
    }

    /// Authenticate: LOGIN, or AUTHENTICATE PLAIN when the server disables LOGIN.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        self.ensure_capabilities().await?;
        let completion = if self.has_capability("LOGINDISABLED") && self.has_capability("AUTH=PLAIN") {
            self.authenticate_plain(username, password).await?
        } else {
            let cmd = format!("LOGIN {} {}", quote_string(username)?, quote_string(password)?);
            self.execute(&cmd).await?
        };
        let caps = parse_capabilities(&completion.tagged.raw);
        completion.ok()?;
        // Capabilities may change after authentication; refetched on demand.
        self.capabilities = caps;
        Ok(())
    }

    async fn authenticate_plain(&mut self, username: &str, password: &str) -> Result<Completion, ImapError> {
        let payload = format!("\0{}\0{}", username, password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());
        let tag = self.next_tag();
        tracing::trace!(tag = %tag, command = "AUTHENTICATE PLAIN", "imap >");
        if self.has_capability("SASL-IR") {
            let full = format!("{} AUTHENTICATE PLAIN {}", tag, encoded);
            write_line(&mut self.stream, full.as_bytes()).await?;
            return self.await_completion(&tag).await;
        }
        let full = format!("{} AUTHENTICATE PLAIN", tag);
        write_line(&mut self.stream, full.as_bytes()).await?;
        let mut untagged = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.continuation {
                write_line(&mut self.stream, encoded.as_bytes()).await?;
                break;
            }
            if line.tag.as_deref() == Some(tag.as_str()) {
                return Ok(Completion {
                    untagged,
                    tagged: line,
                });
            }
            untagged.push(line);
        }
        self.await_completion(&tag).await
    }

    /// SELECT mailbox; returns EXISTS, UIDVALIDITY and UIDNEXT.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus, ImapError> {
        let cmd = format!("SELECT {}", quote_string(mailbox)?);
        let untagged = self.execute(&cmd).await?.ok()?;
        let mut status = MailboxStatus::default();
        for line in &untagged {
            match parse_select_event(&line.raw) {
                Some(SelectEvent::Exists(n)) => status.exists = n,
                Some(SelectEvent::UidValidity(n)) => status.uid_validity = Some(n),
                Some(SelectEvent::UidNext(n)) => status.uid_next = Some(n),
                _ => {}
            }
        }
        Ok(status)
    }

    /// UID SEARCH with the given criteria; UIDs in server order.
    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<u64>, ImapError> {
        let cmd = format!("UID SEARCH {}", criteria);
        let untagged = self.execute(&cmd).await?.ok()?;
        let mut uids = Vec::new();
        for line in untagged.iter().filter(|l| l.untagged) {
            let mut words = line.text.split_whitespace();
            if !words.next().is_some_and(|w| w.eq_ignore_ascii_case("SEARCH")) {
                continue;
            }
            uids.extend(words.filter_map(|w| w.parse::<u64>().ok()));
        }
        Ok(uids)
    }

    /// UID FETCH one message. Returns matching FETCH responses (unsolicited ones for other
    /// UIDs are dropped).
    pub async fn uid_fetch(&mut self, uid: u64, items: &str) -> Result<Vec<FetchData>, ImapError> {
        let cmd = format!("UID FETCH {} {}", uid, items);
        let untagged = self.execute(&cmd).await?.ok()?;
        Ok(untagged
            .into_iter()
            .filter_map(into_fetch)
            .filter(|f| f.uid.map_or(true, |u| u == uid))
            .collect())
    }

    /// CLOSE the selected mailbox.
    pub async fn close(&mut self) -> Result<(), ImapError> {
        self.execute("CLOSE").await?.ok()?;
        Ok(())
    }

    /// LOGOUT and shut the stream down. A server hanging up right after BYE is success.
    pub async fn logout(&mut self) -> Result<(), ImapError> {
        let result = match self.execute("LOGOUT").await {
            Ok(completion) => completion.ok().map(|_| ()),
            Err(ImapError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "shutdown after LOGOUT failed");
        }
        result
    }
}

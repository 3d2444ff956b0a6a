/*
 * test_server.rs
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

//! Scripted in-memory IMAP server for unit tests.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream, DuplexStream};

/// Sends `greeting`, then for each (expected command, reply) reads one command line,
/// checks it without its tag, and writes the reply with `{tag}` replaced.
pub(crate) async fn serve(stream: DuplexStream, greeting: &str, script: Vec<(String, String)>) {
    let mut stream = BufStream::new(stream);
    stream.write_all(greeting.as_bytes()).await.unwrap();
    stream.write_all(b"\r\n").await.unwrap();
    stream.flush().await.unwrap();
    let mut tag = String::new();
    for (expected, reply) in script {
        let mut line = String::new();
        stream.read_line(&mut line).await.unwrap();
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        // Untagged lines are continuation answers to the previous command.
        let command = match line.split_once(' ') {
            Some((t, rest)) => {
                tag = t.to_string();
                rest
            }
            None => line,
        };
        assert_eq!(command, expected);
        let reply = reply.replace("{tag}", &tag);
        stream.write_all(reply.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
    }
}

pub(crate) fn step(expected: &str, reply: &str) -> (String, String) {
    (expected.to_string(), reply.to_string())
}

/*
 * sync_pass.rs
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

//! Sync passes against an in-memory mail store.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailwatch_core::search::search;
use mailwatch_core::store::MailboxStatus;
use mailwatch_core::{
    ConnectionConfig, CursorPolicy, CursorStore, MailStore, PassState, SessionManager, SessionState,
    StoreSession, SyncEngine, SyncError, Uid,
};

#[derive(Default)]
struct Mailbox {
    messages: BTreeMap<u64, Vec<u8>>,
    fail_header: HashSet<u64>,
    fail_body: HashSet<u64>,
    drop_connection_on: Option<u64>,
    reject_login: bool,
    reject_select: bool,
    reject_search: bool,
    /// Commands seen by the server, in order.
    log: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeStore {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl FakeStore {
    fn with_subjects(subjects: &[(u64, &str)]) -> Self {
        let store = FakeStore::default();
        for &(uid, subject) in subjects {
            store.add(uid, subject);
        }
        store
    }

    fn add(&self, uid: u64, subject: &str) {
        let raw = format!(
            "From: monitor@example.com\r\nSubject: {}\r\nDate: Tue, 2 Jan 2024 08:00:00 +0000\r\n\r\nbody of {}\r\n",
            subject, uid
        );
        self.mailbox.lock().unwrap().messages.insert(uid, raw.into_bytes());
    }

    fn add_raw(&self, uid: u64, raw: &str) {
        self.mailbox.lock().unwrap().messages.insert(uid, raw.as_bytes().to_vec());
    }

    fn with<R>(&self, f: impl FnOnce(&mut Mailbox) -> R) -> R {
        f(&mut self.mailbox.lock().unwrap())
    }

    fn log(&self) -> Vec<String> {
        self.with(|m| m.log.clone())
    }
}

struct FakeSession {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl FakeSession {
    fn record(&self, command: String) {
        self.mailbox.lock().unwrap().log.push(command);
    }
}

#[async_trait]
impl MailStore for FakeStore {
    type Session = FakeSession;

    async fn connect(&self, params: &ConnectionConfig) -> Result<FakeSession, SyncError> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.log.push("LOGIN".to_string());
        if mailbox.reject_login {
            return Err(SyncError::Auth {
                username: params.username.clone(),
                reason: "invalid credentials".to_string(),
            });
        }
        Ok(FakeSession {
            mailbox: self.mailbox.clone(),
        })
    }
}

#[async_trait]
impl StoreSession for FakeSession {
    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus, SyncError> {
        self.record(format!("SELECT {}", mailbox));
        let m = self.mailbox.lock().unwrap();
        if m.reject_select {
            return Err(SyncError::Mailbox {
                mailbox: mailbox.to_string(),
                reason: "no such mailbox".to_string(),
            });
        }
        Ok(MailboxStatus {
            exists: m.messages.len() as u32,
            uid_validity: Some(1),
            uid_next: m.messages.keys().last().map(|u| *u as u32 + 1),
        })
    }

    async fn uid_search_from(&mut self, first: u64) -> Result<Vec<Uid>, SyncError> {
        self.record(format!("SEARCH {}:*", first));
        let m = self.mailbox.lock().unwrap();
        if m.reject_search {
            return Err(SyncError::Query("BAD search".to_string()));
        }
        let mut uids: Vec<Uid> = m.messages.keys().filter(|u| **u >= first).map(|u| Uid(*u)).collect();
        // `n:*` always matches the highest UID; put it first to check sorting.
        if let Some(&highest) = m.messages.keys().last() {
            uids.insert(0, Uid(highest));
        }
        Ok(uids)
    }

    async fn fetch_header_fields(&mut self, uid: Uid, fields: &[&str]) -> Result<Vec<u8>, SyncError> {
        self.record(format!("FETCH {} HEADER {}", uid, fields.join(" ")));
        let m = self.mailbox.lock().unwrap();
        if m.drop_connection_on == Some(uid.get()) {
            return Err(SyncError::network("connection reset"));
        }
        if m.fail_header.contains(&uid.get()) {
            return Err(SyncError::fetch(uid, "NO header unavailable"));
        }
        let raw = m
            .messages
            .get(&uid.get())
            .ok_or_else(|| SyncError::fetch(uid, "no such message"))?;
        let end = raw.windows(4).position(|w| w == b"\r\n\r\n").map_or(raw.len(), |i| i + 4);
        Ok(raw[..end].to_vec())
    }

    async fn fetch_message(&mut self, uid: Uid) -> Result<Vec<u8>, SyncError> {
        self.record(format!("FETCH {} BODY", uid));
        let m = self.mailbox.lock().unwrap();
        if m.fail_body.contains(&uid.get()) {
            return Err(SyncError::fetch(uid, "NO body unavailable"));
        }
        m.messages
            .get(&uid.get())
            .cloned()
            .ok_or_else(|| SyncError::fetch(uid, "no such message"))
    }

    async fn close_mailbox(&mut self) -> Result<(), SyncError> {
        self.record("CLOSE".to_string());
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), SyncError> {
        self.record("LOGOUT".to_string());
        Ok(())
    }
}

fn config(dir: &tempfile::TempDir, policy: CursorPolicy) -> ConnectionConfig {
    let mut config = ConnectionConfig::new("imap.example.com", "monitor", "secret");
    config.state_file = dir.path().join("last_uid.txt");
    config.cursor_policy = policy;
    config
}

fn ids(report: &mailwatch_core::PassReport) -> Vec<u64> {
    report.messages.iter().map(|m| m.id.get()).collect()
}

#[tokio::test]
async fn test_first_pass_then_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[
        (3, "[Alert][High] Disk full [srv-01] please check"),
        (5, "weekly newsletter"),
        (8, "[Info][Low] Backup done [nas] ok"),
    ]);
    let config = config(&dir, CursorPolicy::Advance);
    let mut engine = SyncEngine::new(&store, &config);

    let report = engine.run_pass().await.unwrap();
    assert_eq!(ids(&report), vec![3, 8]);
    assert_eq!(report.attempted, 3);
    assert!(report.failed.is_empty());
    assert_eq!((report.cursor_before, report.cursor_after), (0, 8));
    assert_eq!(engine.state(), PassState::Idle);

    let first = &report.messages[0];
    assert_eq!(first.parsed.event_type, "Alert");
    assert_eq!(first.parsed.value, "High");
    assert_eq!(first.parsed.text_before_service, "Disk full");
    assert_eq!(first.parsed.service_info, "srv-01");
    assert_eq!(first.parsed.text_after, "please check");
    assert_eq!(first.message.from.as_deref(), Some("monitor@example.com"));
    assert_eq!(
        first.message.body_plain.as_deref().map(str::trim_end),
        Some("body of 3")
    );
    assert_eq!(CursorStore::new(&config.state_file).load(), 8);

    // Non-matching subjects never trigger a full fetch.
    assert!(!store.log().contains(&"FETCH 5 BODY".to_string()));

    let again = engine.run_pass().await.unwrap();
    assert!(again.messages.is_empty());
    assert_eq!(again.attempted, 0);
    assert_eq!((again.cursor_before, again.cursor_after), (8, 8));
    let log = store.log();
    assert_eq!(log.iter().filter(|c| *c == "SEARCH 9:*").count(), 1);
    assert_eq!(log.last().map(String::as_str), Some("LOGOUT"));
}

#[tokio::test]
async fn test_only_ids_above_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[
        (9, "[A][1] old [s] x"),
        (10, "[A][2] seen [s] x"),
        (11, "[A][3] new [s] x"),
        (12, "[A][4] newer [s] x"),
    ]);
    let config = config(&dir, CursorPolicy::Advance);
    CursorStore::new(&config.state_file).save(10).unwrap();

    let report = SyncEngine::new(&store, &config).run_pass().await.unwrap();
    assert_eq!(ids(&report), vec![11, 12]);
    assert_eq!(report.cursor_after, 12);
}

#[tokio::test]
async fn test_next_two_ids_attempted_once_whether_or_not_they_match() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[
        (20, "[A][1] old [s] x"),
        (21, "[A][2] new [s] x"),
        (22, "no template here"),
    ]);
    let config = config(&dir, CursorPolicy::Advance);
    CursorStore::new(&config.state_file).save(20).unwrap();

    let report = SyncEngine::new(&store, &config).run_pass().await.unwrap();
    assert_eq!(ids(&report), vec![21]);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.cursor_after, 22);

    let log = store.log();
    let count = |cmd: &str| log.iter().filter(|c| *c == cmd).count();
    assert_eq!(count("FETCH 21 HEADER Subject"), 1);
    assert_eq!(count("FETCH 22 HEADER Subject"), 1);
    assert_eq!(count("FETCH 21 BODY"), 1);
    assert_eq!(count("FETCH 22 BODY"), 0);
    assert!(!log.iter().any(|c| c.starts_with("FETCH 20")));
}

#[tokio::test]
async fn test_no_match_still_advances_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(31, "hello"), (32, "[only][two] brackets")]);
    let config = config(&dir, CursorPolicy::Advance);
    CursorStore::new(&config.state_file).save(30).unwrap();

    let report = SyncEngine::new(&store, &config).run_pass().await.unwrap();
    assert!(report.messages.is_empty());
    assert_eq!(report.attempted, 2);
    assert_eq!(report.cursor_after, 32);
    assert_eq!(CursorStore::new(&config.state_file).load(), 32);
    let log = store.log();
    assert_eq!(log.iter().filter(|c| c.ends_with("HEADER Subject")).count(), 2);
    assert!(!log.iter().any(|c| c.ends_with("BODY")));
}

#[tokio::test]
async fn test_matched_message_with_undecodable_body_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::default();
    store.add_raw(
        5,
        concat!(
            "Subject: [Alert][High] Disk full [srv-01] check\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "@@@not base64!!!\r\n",
        ),
    );
    let config = config(&dir, CursorPolicy::Advance);

    let report = SyncEngine::new(&store, &config).run_pass().await.unwrap();
    assert_eq!(ids(&report), vec![5]);
    assert!(report.failed.is_empty());
    assert_eq!(report.messages[0].parsed.service_info, "srv-01");
    assert_eq!(report.messages[0].message.body_plain, None);
}

#[tokio::test]
async fn test_highest_uid_below_bound_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(4, "[A][1] x [s] y"), (7, "[A][2] x [s] y")]);
    let config = config(&dir, CursorPolicy::Advance);
    CursorStore::new(&config.state_file).save(7).unwrap();

    let report = SyncEngine::new(&store, &config).run_pass().await.unwrap();
    assert!(report.messages.is_empty());
    assert_eq!(report.attempted, 0);
    assert_eq!(report.cursor_after, 7);
    assert!(!store.log().iter().any(|c| c.starts_with("FETCH")));
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[
        (1, "[A][1] one [s] x"),
        (2, "[A][2] two [s] x"),
        (3, "[A][3] three [s] x"),
    ]);
    store.with(|m| {
        m.fail_header.insert(2);
    });
    let config = config(&dir, CursorPolicy::Advance);

    let report = SyncEngine::new(&store, &config).run_pass().await.unwrap();
    assert_eq!(ids(&report), vec![1, 3]);
    assert_eq!(report.failed, vec![Uid(2)]);
    assert_eq!(report.attempted, 3);
    // Advance: the failed message is not retried.
    assert_eq!(report.cursor_after, 3);
}

#[tokio::test]
async fn test_hold_policy_retries_failed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[
        (11, "[A][1] one [s] x"),
        (12, "[A][2] two [s] x"),
        (13, "[A][3] three [s] x"),
    ]);
    store.with(|m| {
        m.fail_body.insert(12);
    });
    let config = config(&dir, CursorPolicy::Hold);
    let mut engine = SyncEngine::new(&store, &config);

    let report = engine.run_pass().await.unwrap();
    assert_eq!(ids(&report), vec![11, 13]);
    assert_eq!(report.failed, vec![Uid(12)]);
    assert_eq!(report.cursor_after, 11);

    store.with(|m| m.fail_body.clear());
    let retry = engine.run_pass().await.unwrap();
    assert_eq!(ids(&retry), vec![12, 13]);
    assert_eq!(retry.cursor_after, 13);
}

#[tokio::test]
async fn test_search_rejected_keeps_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(6, "[A][1] x [s] y")]);
    store.with(|m| m.reject_search = true);
    let config = config(&dir, CursorPolicy::Advance);
    CursorStore::new(&config.state_file).save(5).unwrap();

    let mut engine = SyncEngine::new(&store, &config);
    let err = engine.run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Query(_)));
    assert_eq!(engine.state(), PassState::Idle);
    assert_eq!(CursorStore::new(&config.state_file).load(), 5);
    let log = store.log();
    assert_eq!(&log[log.len() - 2..], ["CLOSE", "LOGOUT"]);
}

#[tokio::test]
async fn test_connection_lost_mid_pass_keeps_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(1, "[A][1] x [s] y"), (2, "[A][2] x [s] y")]);
    store.with(|m| m.drop_connection_on = Some(2));
    let config = config(&dir, CursorPolicy::Advance);

    let err = SyncEngine::new(&store, &config).run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
    assert!(!config.state_file.exists());
}

#[tokio::test]
async fn test_login_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(1, "[A][1] x [s] y")]);
    store.with(|m| m.reject_login = true);
    let config = config(&dir, CursorPolicy::Advance);

    let err = SyncEngine::new(&store, &config).run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Auth { ref username, .. } if username == "monitor"));
    assert!(!config.state_file.exists());
    assert_eq!(store.log(), vec!["LOGIN"]);
}

#[tokio::test]
async fn test_select_rejected_logs_out() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(1, "[A][1] x [s] y")]);
    store.with(|m| m.reject_select = true);
    let config = config(&dir, CursorPolicy::Advance);

    let err = SyncEngine::new(&store, &config).run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Mailbox { ref mailbox, .. } if mailbox == "INBOX"));
    assert_eq!(store.log(), vec!["LOGIN", "SELECT INBOX", "LOGOUT"]);
}

#[tokio::test]
async fn test_cursor_save_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::with_subjects(&[(1, "[A][1] x [s] y")]);
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let mut config = config(&dir, CursorPolicy::Advance);
    config.state_file = blocker.join("last_uid.txt");

    let err = SyncEngine::new(&store, &config).run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Cursor(_)));
    assert_eq!(store.log().last().map(String::as_str), Some("LOGOUT"));
}

#[tokio::test]
async fn test_session_manager_lifecycle() {
    let store = FakeStore::with_subjects(&[(2, "[A][1] x [s] y")]);
    let config = ConnectionConfig::new("imap.example.com", "monitor", "secret");
    let mut sessions = SessionManager::new(&store);

    assert!(matches!(sessions.session_mut(), Err(SyncError::NotConnected)));
    assert!(matches!(search(&mut sessions, 0).await, Err(SyncError::NotConnected)));

    sessions.connect(&config).await.unwrap();
    assert_eq!(sessions.state(), SessionState::MailboxSelected);
    assert_eq!(sessions.mailbox_status().map(|s| s.exists), Some(1));
    assert_eq!(search(&mut sessions, 0).await.unwrap(), vec![Uid(2)]);

    sessions.disconnect().await;
    sessions.disconnect().await;
    assert_eq!(sessions.state(), SessionState::Disconnected);
    assert!(matches!(sessions.session_mut(), Err(SyncError::NotConnected)));
    let log = store.log();
    assert_eq!(log.iter().filter(|c| *c == "LOGOUT").count(), 1);
}

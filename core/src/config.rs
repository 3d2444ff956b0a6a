/*
 * config.rs
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

//! Configuration: a TOML file with one connection section and an optional `[logging]` section.
//! Values may be literals or exactly `${ENV_NAME}`; markers are resolved once at load time,
//! and an unset variable makes the key fall back to its default.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use toml::{Table, Value};

/// Default name of the connection section.
pub const DEFAULT_SECTION: &str = "imap";

const LOGGING_SECTION: &str = "logging";

const DEFAULT_MAILBOX: &str = "INBOX";
const DEFAULT_PORT: u16 = 993;
const DEFAULT_STATE_FILE: &str = "last_uid.txt";

/// Configuration loading errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("section [{0}] not found")]
    MissingSection(String),
    #[error("section [{section}]: missing required key `{key}`")]
    MissingKey { section: String, key: &'static str },
    #[error("section [{section}]: invalid value for `{key}`: {reason}")]
    InvalidValue {
        section: String,
        key: &'static str,
        reason: String,
    },
}

/// What to do with the cursor when some identifiers in a pass failed to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorPolicy {
    /// Advance past every attempted identifier, failed or not (at-most-once).
    #[default]
    Advance,
    /// Stop below the first failed identifier so it is retried next pass (at-least-once).
    Hold,
}

impl FromStr for CursorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advance" => Ok(CursorPolicy::Advance),
            "hold" => Ok(CursorPolicy::Hold),
            other => Err(format!("expected `advance` or `hold`, got `{}`", other)),
        }
    }
}

/// Connection section: server, credentials, mailbox, transport and cursor file.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub port: u16,
    /// Implicit TLS from the first byte (IMAPS).
    pub use_ssl: bool,
    /// Upgrade a plaintext connection with STARTTLS. Ignored when `use_ssl` is set.
    pub starttls: bool,
    pub state_file: PathBuf,
    pub cursor_policy: CursorPolicy,
}

impl ConnectionConfig {
    /// Config with defaults for everything but the server and credentials.
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            mailbox: DEFAULT_MAILBOX.to_string(),
            port: DEFAULT_PORT,
            use_ssl: true,
            starttls: false,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            cursor_policy: CursorPolicy::Advance,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("starttls", &self.starttls)
            .field("state_file", &self.state_file)
            .field("cursor_policy", &self.cursor_policy)
            .finish()
    }
}

/// Logging section. Values are kept as written; `logging::init` validates them
/// so that bad values can be reported through the logger itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: "full".to_string(),
        }
    }
}

/// Complete configuration, built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from a file, resolving `${VAR}` markers against the process environment.
    pub fn load(path: &Path, section: &str) -> Result<Self, ConfigError> {
        Self::load_with(path, section, |name| std::env::var(name).ok())
    }

    /// Load from a file with an explicit variable lookup.
    pub fn load_with<F>(path: &Path, section: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, section, lookup)
    }

    /// Parse configuration text.
    pub fn from_toml_str<F>(text: &str, section: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root: Table = text.parse()?;
        let conn_table =
            find_section(&root, section).ok_or_else(|| ConfigError::MissingSection(section.to_string()))?;
        let conn = Section {
            name: section,
            table: conn_table,
            lookup: &lookup,
        };

        let connection = ConnectionConfig {
            host: conn.required("host")?,
            username: conn.required("username")?,
            password: conn.required("password")?,
            mailbox: conn.string("mailbox")?.unwrap_or_else(|| DEFAULT_MAILBOX.to_string()),
            port: conn.parse("port", DEFAULT_PORT)?,
            use_ssl: conn.boolean("use_ssl", true)?,
            starttls: conn.boolean("starttls", false)?,
            state_file: conn
                .string("state_file")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            cursor_policy: conn.parse("cursor_policy", CursorPolicy::Advance)?,
        };

        let logging = match find_section(&root, LOGGING_SECTION) {
            Some(table) => {
                let log = Section {
                    name: LOGGING_SECTION,
                    table,
                    lookup: &lookup,
                };
                let defaults = LoggingConfig::default();
                LoggingConfig {
                    level: log.string("level")?.unwrap_or(defaults.level),
                    file: log.string("file")?.map(PathBuf::from),
                    format: log.string("format")?.unwrap_or(defaults.format),
                }
            }
            None => LoggingConfig::default(),
        };

        Ok(Config { connection, logging })
    }
}

/// Resolve one configuration value. A value that is exactly `${NAME}` is replaced by the
/// variable's value, or `None` when the variable is unset; anything else is returned as is.
pub fn resolve_placeholder<F>(value: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let trimmed = value.trim();
    match trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(name) if is_env_name(name) => lookup(name),
        _ => Some(value.to_string()),
    }
}

fn is_env_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Section by exact name, else case-insensitively (so `[IMAP]` works).
fn find_section<'a>(root: &'a Table, name: &str) -> Option<&'a Table> {
    let value = root.get(name).or_else(|| {
        root.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })?;
    value.as_table()
}

/// configparser-style booleans.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

struct Section<'a, F> {
    name: &'a str,
    table: &'a Table,
    lookup: &'a F,
}

impl<'a, F> Section<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn invalid(&self, key: &'static str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key,
            reason: reason.into(),
        }
    }

    /// Resolved value as text; `None` when absent or when its variable is unset.
    fn string(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        let literal = match self.table.get(key) {
            None => return Ok(None),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Integer(i)) => i.to_string(),
            Some(Value::Boolean(b)) => b.to_string(),
            Some(Value::Float(f)) => f.to_string(),
            Some(other) => {
                return Err(self.invalid(key, format!("unsupported {} value", other.type_str())))
            }
        };
        Ok(resolve_placeholder(&literal, self.lookup))
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        match self.string(key)? {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::MissingKey {
                section: self.name.to_string(),
                key,
            }),
        }
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.string(key)? {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|e: T::Err| self.invalid(key, e.to_string())),
        }
    }

    fn boolean(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key)? {
            None => Ok(default),
            Some(v) => parse_bool(&v).ok_or_else(|| self.invalid(key, format!("not a boolean: `{}`", v))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const MINIMAL: &str = r#"
[imap]
host = "imap.example.com"
username = "user@example.com"
password = "secret"
"#;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml_str(MINIMAL, DEFAULT_SECTION, env(&[])).unwrap();
        let c = &cfg.connection;
        assert_eq!(c.host, "imap.example.com");
        assert_eq!(c.mailbox, "INBOX");
        assert_eq!(c.port, 993);
        assert!(c.use_ssl);
        assert!(!c.starttls);
        assert_eq!(c.state_file, PathBuf::from("last_uid.txt"));
        assert_eq!(c.cursor_policy, CursorPolicy::Advance);
        assert_eq!(cfg.logging, LoggingConfig::default());
    }

    #[test]
    fn test_env_placeholders() {
        let text = r#"
[imap]
host = "${MW_HOST}"
username = "user"
password = "${MW_PASSWORD}"
port = "${MW_PORT}"
use_ssl = "${MW_SSL}"
"#;
        let cfg = Config::from_toml_str(
            text,
            "imap",
            env(&[("MW_HOST", "mail.test"), ("MW_PASSWORD", "pw"), ("MW_SSL", "no")]),
        )
        .unwrap();
        assert_eq!(cfg.connection.host, "mail.test");
        assert_eq!(cfg.connection.password, "pw");
        // MW_PORT is unset: falls back to the default.
        assert_eq!(cfg.connection.port, 993);
        assert!(!cfg.connection.use_ssl);
    }

    #[test]
    fn test_unset_required_placeholder_is_missing() {
        let text = r#"
[imap]
host = "h"
username = "u"
password = "${MW_UNSET_PASSWORD}"
"#;
        let err = Config::from_toml_str(text, "imap", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "password", .. }));
    }

    #[test]
    fn test_missing_section() {
        let err = Config::from_toml_str(MINIMAL, "pop3", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(ref s) if s == "pop3"));
    }

    #[test]
    fn test_section_name_case_insensitive() {
        let text = MINIMAL.replace("[imap]", "[IMAP]");
        let cfg = Config::from_toml_str(&text, "imap", env(&[])).unwrap();
        assert_eq!(cfg.connection.username, "user@example.com");
    }

    #[test]
    fn test_native_values_and_invalid_port() {
        let text = format!("{}port = 143\nuse_ssl = false\ncursor_policy = \"hold\"\n", MINIMAL);
        let cfg = Config::from_toml_str(&text, "imap", env(&[])).unwrap();
        assert_eq!(cfg.connection.port, 143);
        assert!(!cfg.connection.use_ssl);
        assert_eq!(cfg.connection.cursor_policy, CursorPolicy::Hold);

        let text = format!("{}port = \"not-a-port\"\n", MINIMAL);
        let err = Config::from_toml_str(&text, "imap", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "port", .. }));
    }

    #[test]
    fn test_logging_section() {
        let text = format!(
            "{}\n[logging]\nlevel = \"debug\"\nfile = \"/tmp/mailwatch.log\"\nformat = \"compact\"\n",
            MINIMAL
        );
        let cfg = Config::from_toml_str(&text, "imap", env(&[])).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.file, Some(PathBuf::from("/tmp/mailwatch.log")));
        assert_eq!(cfg.logging.format, "compact");
    }

    #[test]
    fn test_resolve_placeholder() {
        let lookup = env(&[("A", "1")]);
        assert_eq!(resolve_placeholder("${A}", &lookup), Some("1".to_string()));
        assert_eq!(resolve_placeholder("${B}", &lookup), None);
        assert_eq!(resolve_placeholder("plain", &lookup), Some("plain".to_string()));
        // Only whole-value markers are substituted.
        assert_eq!(resolve_placeholder("x${A}", &lookup), Some("x${A}".to_string()));
    }

    #[test]
    fn test_debug_redacts_password() {
        let c = ConnectionConfig::new("h", "u", "hunter2");
        assert!(!format!("{:?}", c).contains("hunter2"));
    }
}

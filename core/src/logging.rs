/*
 * logging.rs
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

//! Process-wide `tracing` subscriber configured from the `[logging]` section.

use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io;
use std::str::FromStr;
use std::sync::Mutex;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Event line layout: one of the named tracing-subscriber layouts, or a
/// `%(name)s`-style pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
    Pattern(PatternFormat),
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            _ if s.contains("%(") => s.parse::<PatternFormat>().map(LogFormat::Pattern),
            other => Err(format!("unknown log format `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AscTime,
    Name,
    LevelName,
    Message,
    FileName,
    LineNo,
    Process,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field {
        field: Field,
        width: usize,
        left: bool,
    },
}

/// Line pattern with `%(asctime)s`, `%(name)s` (event target), `%(levelname)s`,
/// `%(message)s`, `%(filename)s`, `%(lineno)d` and `%(process)d`. Width and `-`
/// alignment flags are honoured; `%%` is a literal percent sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFormat {
    pieces: Vec<Piece>,
}

impl FromStr for PatternFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = s;
        while let Some(at) = rest.find('%') {
            literal.push_str(&rest[..at]);
            rest = &rest[at + 1..];
            if let Some(after) = rest.strip_prefix('%') {
                literal.push('%');
                rest = after;
                continue;
            }
            let Some(inner) = rest.strip_prefix('(') else {
                literal.push('%');
                continue;
            };
            let close = inner
                .find(')')
                .ok_or_else(|| format!("unterminated placeholder in `{}`", s))?;
            let key = &inner[..close];
            let spec = &inner[close + 1..];
            let flags_len = spec
                .find(|c: char| !(c == '-' || c == '.' || c.is_ascii_digit()))
                .ok_or_else(|| format!("missing conversion after %({})", key))?;
            let flags = &spec[..flags_len];
            // Skip the conversion character (s, d, ...).
            let conversion_len = spec[flags_len..].chars().next().map_or(0, char::len_utf8);
            rest = &spec[flags_len + conversion_len..];

            let field = match key {
                "asctime" => Field::AscTime,
                "name" => Field::Name,
                "levelname" => Field::LevelName,
                "message" => Field::Message,
                "filename" | "pathname" | "module" => Field::FileName,
                "lineno" => Field::LineNo,
                "process" => Field::Process,
                other => return Err(format!("unsupported placeholder %({})", other)),
            };
            let left = flags.starts_with('-');
            let width = flags
                .trim_start_matches('-')
                .split('.')
                .next()
                .and_then(|w| w.parse().ok())
                .unwrap_or(0);
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Field { field, width, left });
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(PatternFormat { pieces })
    }
}

fn level_name(level: &Level) -> &'static str {
    match level.as_str() {
        "WARN" => "WARNING",
        other => other,
    }
}

impl<S, N> FormatEvent<S, N> for PatternFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        for piece in &self.pieces {
            let (field, width, left) = match piece {
                Piece::Literal(text) => {
                    writer.write_str(text)?;
                    continue;
                }
                Piece::Field { field, width, left } => (*field, *width, *left),
            };
            if field == Field::Message {
                ctx.field_format().format_fields(writer.by_ref(), event)?;
                continue;
            }
            let mut value = String::new();
            match field {
                Field::AscTime => SystemTime.format_time(&mut Writer::new(&mut value))?,
                Field::Name => value.push_str(meta.target()),
                Field::LevelName => value.push_str(level_name(meta.level())),
                Field::FileName => value.push_str(meta.file().unwrap_or("?")),
                Field::LineNo => write!(value, "{}", meta.line().unwrap_or(0))?,
                Field::Process => write!(value, "{}", std::process::id())?,
                Field::Message => {}
            }
            if left {
                write!(writer, "{:<width$}", value, width = width)?;
            } else {
                write!(writer, "{:>width$}", value, width = width)?;
            }
        }
        writeln!(writer)
    }
}

/// Level names, including the `warning` and `critical` spellings.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level. Invalid
/// level or format values fall back to `info` / `full` and are reported once logging is up.
/// Fails only when the log file cannot be opened.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    let mut warnings = Vec::new();
    let level = parse_level(&config.level).unwrap_or_else(|| {
        warnings.push(format!("unknown log level `{}`, using info", config.level));
        Level::INFO
    });
    let format = config.format.parse::<LogFormat>().unwrap_or_else(|e| {
        warnings.push(format!("{}, using full", e));
        LogFormat::Full
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    let installed = match format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Pattern(pattern) => builder.event_format(pattern).try_init(),
    };
    if let Err(e) = installed {
        tracing::debug!(error = %e, "a global subscriber is already installed");
    }

    for warning in warnings {
        tracing::warn!("{}", warning);
    }
    Ok(())
}

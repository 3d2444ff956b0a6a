/*
 * main.rs
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

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mailwatch_core::config::DEFAULT_SECTION;
use mailwatch_core::{logging, Config, CursorStore, ImapStore, PassReport, SyncEngine};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the configuration file
    #[arg(short, long, env = "MAILWATCH_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Name of the connection section in the configuration file
    #[arg(long, default_value = DEFAULT_SECTION)]
    section: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch new messages whose subject matches the alert template
    Sync {
        /// Repeat every SECS seconds until interrupted
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Inspect or reset the persisted UID watermark
    #[command(subcommand)]
    Cursor(CursorCommand),
}

#[derive(Subcommand, Debug)]
enum CursorCommand {
    /// Print the current watermark
    Show,
    /// Overwrite the watermark; messages above it are processed on the next sync
    Set { uid: u64 },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config, &args.section)
        .with_context(|| format!("loading {}", args.config.display()))?;
    logging::init(&config.logging).context("opening log file")?;

    match args.command {
        Command::Sync { interval } => sync(&config, interval).await,
        Command::Cursor(CursorCommand::Show) => {
            let cursor = CursorStore::new(config.connection.state_file.clone());
            println!("{}", cursor.load());
            Ok(())
        }
        Command::Cursor(CursorCommand::Set { uid }) => {
            let cursor = CursorStore::new(config.connection.state_file.clone());
            cursor
                .save(uid)
                .with_context(|| format!("writing {}", cursor.path().display()))?;
            tracing::info!(cursor = uid, path = %cursor.path().display(), "cursor set");
            Ok(())
        }
    }
}

async fn sync(config: &Config, interval: Option<u64>) -> Result<()> {
    let store = ImapStore::new();
    let mut engine = SyncEngine::new(&store, &config.connection);
    loop {
        match engine.run_pass().await {
            Ok(report) => print_messages(&report)?,
            // A failed pass is retried on the next tick in watch mode.
            Err(e) if interval.is_some() => tracing::error!(error = %e, "pass failed"),
            Err(e) => return Err(e.into()),
        }
        let Some(secs) = interval else {
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

/// One JSON object per processed message on stdout.
fn print_messages(report: &PassReport) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for message in &report.messages {
        serde_json::to_writer(&mut out, message)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/*
 * cursor.rs
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

//! Persisted watermark: the highest UID already processed, one decimal number in a text file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Durable single-integer cursor. Assumes one writer per file.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cursor. Missing file, unreadable file or non-numeric content all mean 0.
    pub fn load(&self) -> u64 {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "cursor file not found, starting from 0");
                return 0;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read cursor file, starting from 0");
                return 0;
            }
        };
        match content.trim().parse::<u64>() {
            Ok(n) => {
                tracing::debug!(path = %self.path.display(), cursor = n, "cursor loaded");
                n
            }
            Err(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    content = %content.trim(),
                    "cursor file is not a number, starting from 0"
                );
                0
            }
        }
    }

    /// Replace the stored cursor. Written to a sibling temp file and renamed into place,
    /// so `load` sees either the old or the new value.
    pub fn save(&self, cursor: u64) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.tmp_path();
        let f = File::create(&tmp)?;
        let mut w = BufWriter::new(f);
        writeln!(w, "{}", cursor)?;
        w.flush()?;
        w.get_ref().sync_all()?;
        drop(w);
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), cursor, "cursor saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("last_uid.txt"));
        assert_eq!(store.load(), 0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("last_uid.txt"));
        for n in [0u64, 1, 42, 4_294_967_295, u64::MAX] {
            store.save(n).unwrap();
            assert_eq!(store.load(), n);
        }
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_garbage_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_uid.txt");
        fs::write(&path, "not a number\n").unwrap();
        assert_eq!(CursorStore::new(&path).load(), 0);
        fs::write(&path, "-5").unwrap();
        assert_eq!(CursorStore::new(&path).load(), 0);
    }

    #[test]
    fn test_tolerates_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_uid.txt");
        fs::write(&path, "  1234\r\n").unwrap();
        assert_eq!(CursorStore::new(&path).load(), 1234);
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state").join("cursor"));
        store.save(7).unwrap();
        assert_eq!(store.load(), 7);
    }
}

//! `journal.log`: append-only record of journal heads.
//!
//! One line per update: `<journal name> <segment uuid>:<record number>`.
//! The last line for a name wins when the log is replayed.

use super::latch::FailureLatch;
use crate::error::CoreResult;
use crate::store::JournalLog;
use crate::types::RecordId;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// File-backed [`JournalLog`].
#[derive(Debug)]
pub(crate) struct TarJournalLog {
    file: Mutex<File>,
    sync: bool,
    failed: Arc<FailureLatch>,
}

impl TarJournalLog {
    /// Opens the log and returns every well-formed update in file order.
    ///
    /// A final line without its newline is a torn append; it is cut off so
    /// the next update starts on a fresh line. A failed append sets
    /// `failed`, so no line is ever written after a partial one.
    pub(crate) fn open(
        path: &Path,
        sync: bool,
        failed: Arc<FailureLatch>,
    ) -> CoreResult<(Self, Vec<(String, RecordId)>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let complete = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos + 1);
        if complete < contents.len() {
            warn!(
                path = %path.display(),
                dropped = contents.len() - complete,
                "truncating torn journal line"
            );
            file.set_len(complete as u64)?;
        }
        file.seek(SeekFrom::End(0))?;

        let updates = parse_lines(&contents[..complete]);
        Ok((
            Self {
                file: Mutex::new(file),
                sync,
                failed,
            },
            updates,
        ))
    }

    pub(crate) fn sync(&self) -> CoreResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}

fn parse_lines(contents: &[u8]) -> Vec<(String, RecordId)> {
    let text = String::from_utf8_lossy(contents);
    let mut updates = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let parsed = line.rsplit_once(' ').and_then(|(name, head)| {
            head.parse::<RecordId>()
                .ok()
                .map(|head| (name.to_string(), head))
        });
        match parsed {
            Some(update) if !update.0.is_empty() => updates.push(update),
            _ => warn!(line = number + 1, "skipping malformed journal line"),
        }
    }
    updates
}

impl JournalLog for TarJournalLog {
    fn record(&self, name: &str, head: RecordId) -> CoreResult<()> {
        let line = format!("{name} {head}\n");
        let mut file = self.file.lock();
        self.failed.check()?;
        let written = file.write_all(line.as_bytes());
        self.failed.guard(written)?;
        if self.sync {
            self.failed.guard(file.sync_data())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::SegmentId;
    use tempfile::tempdir;

    fn open(path: &Path) -> (TarJournalLog, Vec<(String, RecordId)>) {
        TarJournalLog::open(path, false, Arc::new(FailureLatch::new())).unwrap()
    }

    #[test]
    fn updates_replay_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let a = RecordId::new(SegmentId::new(), 0);
        let b = RecordId::new(SegmentId::new(), 3);
        {
            let (log, updates) = open(&path);
            assert!(updates.is_empty());
            log.record("root", a).unwrap();
            log.record("my journal", b).unwrap();
        }
        let (_, updates) = open(&path);
        assert_eq!(
            updates,
            vec![("root".to_string(), a), ("my journal".to_string(), b)]
        );
    }

    #[test]
    fn failed_append_refuses_later_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let a = RecordId::new(SegmentId::new(), 1);
        std::fs::write(&path, format!("root {a}\n")).unwrap();

        // A read-only handle makes every write fail.
        let failed = Arc::new(FailureLatch::new());
        let log = TarJournalLog {
            file: Mutex::new(File::open(&path).unwrap()),
            sync: false,
            failed: Arc::clone(&failed),
        };
        let b = RecordId::new(SegmentId::new(), 2);
        assert!(matches!(log.record("root", b), Err(CoreError::Io(_))));
        assert!(matches!(log.record("root", b), Err(CoreError::StoreFailed { .. })));
        assert!(failed.check().is_err());
        drop(log);

        let (_, updates) = open(&path);
        assert_eq!(updates, vec![("root".to_string(), a)]);
    }

    #[test]
    fn torn_line_is_cut_and_malformed_lines_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let a = RecordId::new(SegmentId::new(), 1);
        std::fs::write(&path, format!("root {a}\ngarbage\nroot 1234")).unwrap();

        let (log, updates) = open(&path);
        assert_eq!(updates, vec![("root".to_string(), a)]);

        let b = RecordId::new(SegmentId::new(), 2);
        log.record("root", b).unwrap();
        drop(log);

        let (_, updates) = open(&path);
        assert_eq!(updates.last(), Some(&("root".to_string(), b)));
    }
}

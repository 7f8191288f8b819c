//! JSON-lines journal of unacknowledged sync actions.
//!
//! Each queued action is appended as one line. After every cut and every
//! acknowledgement the file is rewritten with the exact queue contents, so a
//! restarted client resends undelivered batches under their original ids.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use practice_core::model::{ActionBatch, SyncAction};

use crate::error::JournalError;
use crate::queue::SyncQueue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
enum JournalEntry {
    Batch(ActionBatch),
    Action(SyncAction),
}

#[derive(Debug)]
pub struct SyncJournal {
    path: PathBuf,
}

impl SyncJournal {
    /// Open (or create) the journal at `path`.
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Io` if the file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the queue recorded in the journal.
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Corrupt` for a line that does not parse, except
    /// a truncated final line, which is dropped.
    pub fn load(&self) -> Result<SyncQueue, JournalError> {
        let file = File::open(&self.path).map_err(|source| io_error(&self.path, source))?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|source| io_error(&self.path, source))?;

        let mut batches = Vec::new();
        let mut pending = Vec::new();
        let last = lines.len();
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(JournalEntry::Batch(batch)) => batches.push(batch),
                Ok(JournalEntry::Action(action)) => pending.push(action),
                // A crash mid-append leaves a partial last line.
                Err(_) if idx + 1 == last => {
                    debug!(path = %self.path.display(), "dropping truncated journal tail");
                }
                Err(source) => {
                    return Err(JournalError::Corrupt {
                        path: self.path.clone(),
                        line: idx + 1,
                        source,
                    });
                }
            }
        }
        Ok(SyncQueue::from_parts(batches, pending))
    }

    /// Append one queued action.
    ///
    /// # Errors
    ///
    /// Returns `JournalError` if encoding or writing fails.
    pub fn append(&self, action: &SyncAction) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(&JournalEntry::Action(action.clone()))?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| io_error(&self.path, source))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|source| io_error(&self.path, source))
    }

    /// Replace the journal with the current queue contents.
    ///
    /// # Errors
    ///
    /// Returns `JournalError` if the replacement cannot be written.
    pub fn rewrite(&self, queue: &SyncQueue) -> Result<(), JournalError> {
        let tmp = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp).map_err(|source| io_error(&tmp, source))?;
            let mut writer = BufWriter::new(file);
            let entries = queue
                .batches()
                .iter()
                .cloned()
                .map(JournalEntry::Batch)
                .chain(queue.pending().iter().cloned().map(JournalEntry::Action));
            for entry in entries {
                serde_json::to_writer(&mut writer, &entry)?;
                writer
                    .write_all(b"\n")
                    .map_err(|source| io_error(&tmp, source))?;
            }
            let file = writer
                .into_inner()
                .map_err(|e| io_error(&tmp, e.into_error()))?;
            file.sync_data().map_err(|source| io_error(&tmp, source))?;
        }
        fs::rename(&tmp, &self.path).map_err(|source| io_error(&self.path, source))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> JournalError {
    JournalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::model::QuestionId;
    use practice_core::time::fixed_now;

    #[test]
    fn appended_actions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let journal = SyncJournal::open(&path).unwrap();
        journal
            .append(&SyncAction::reveal(QuestionId::new("q1"), fixed_now()))
            .unwrap();
        journal.append(&SyncAction::navigate(2, fixed_now())).unwrap();

        let queue = SyncJournal::open(&path).unwrap().load().unwrap();
        assert_eq!(queue.pending().len(), 2);
        assert!(queue.batches().is_empty());
    }

    #[test]
    fn rewrite_keeps_batch_ids() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SyncJournal::open(dir.path().join("j.jsonl")).unwrap();

        let mut queue = SyncQueue::new();
        queue.push(SyncAction::navigate(1, fixed_now()));
        let cut = queue.cut();
        queue.push(SyncAction::navigate(2, fixed_now()));
        journal.rewrite(&queue).unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.batches().len(), 1);
        assert_eq!(loaded.batches()[0].id, cut[0].id);
        assert_eq!(loaded.pending().len(), 1);
        assert_eq!(loaded, queue);
    }

    #[test]
    fn truncated_tail_is_ignored_but_corruption_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let journal = SyncJournal::open(&path).unwrap();
        journal.append(&SyncAction::navigate(1, fixed_now())).unwrap();

        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("{\"entry\":\"act");
        fs::write(&path, &text).unwrap();
        assert_eq!(journal.load().unwrap().len(), 1);

        fs::write(&path, format!("garbage\n{text}\n")).unwrap();
        assert!(matches!(
            journal.load(),
            Err(JournalError::Corrupt { line: 1, .. })
        ));
    }
}

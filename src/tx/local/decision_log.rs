//! Commit decision log
//!
//! The coordinator records the commit decision for a global transaction after
//! every participant voted to commit and before any second-phase commit is
//! sent. During recovery an in-doubt branch is committed only if its global
//! transaction has a logged decision; everything else is presumed aborted.
//!
//! The file format is append-only JSON lines:
//!
//! ```text
//! {"op":"commit","global_id":"…","resources":["ledger-db"],"decided_at":"…"}
//! {"op":"forget","global_id":"…"}
//! ```

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::observability::Event;

/// A logged commit decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDecision {
    pub global_id: Uuid,
    /// Participants that voted to commit
    pub resources: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

impl CommitDecision {
    pub fn new(global_id: Uuid, resources: Vec<String>) -> Self {
        Self {
            global_id,
            resources,
            decided_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Commit(CommitDecision),
    Forget { global_id: Uuid },
}

/// Durable record of commit decisions
pub trait DecisionLog: Send + Sync {
    /// Record that the global transaction will commit. Must be durable when
    /// this returns.
    fn record_commit(&self, decision: &CommitDecision) -> io::Result<()>;

    fn is_committed(&self, global_id: &Uuid) -> bool;

    /// Drop the decision once every branch is resolved
    fn forget(&self, global_id: &Uuid) -> io::Result<()>;

    /// Decisions not yet forgotten
    fn pending(&self) -> Vec<CommitDecision>;
}

/// Decision log kept in memory only
#[derive(Debug, Default)]
pub struct MemoryDecisionLog {
    decisions: Mutex<BTreeMap<Uuid, CommitDecision>>,
}

impl MemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Uuid, CommitDecision>> {
        self.decisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DecisionLog for MemoryDecisionLog {
    fn record_commit(&self, decision: &CommitDecision) -> io::Result<()> {
        self.lock().insert(decision.global_id, decision.clone());
        Ok(())
    }

    fn is_committed(&self, global_id: &Uuid) -> bool {
        self.lock().contains_key(global_id)
    }

    fn forget(&self, global_id: &Uuid) -> io::Result<()> {
        self.lock().remove(global_id);
        Ok(())
    }

    fn pending(&self) -> Vec<CommitDecision> {
        self.lock().values().cloned().collect()
    }
}

/// Result of replaying a log file
#[derive(Default)]
struct Replayed {
    decisions: BTreeMap<Uuid, CommitDecision>,
    /// Length of the prefix made of complete entries
    valid_len: u64,
    /// The valid prefix ends without a line terminator
    needs_newline: bool,
}

/// Append-only file decision log, replayed on open
pub struct FileDecisionLog {
    path: PathBuf,
    decisions: Mutex<BTreeMap<Uuid, CommitDecision>>,
    writer: Mutex<BufWriter<File>>,
}

impl FileDecisionLog {
    /// Open or create a decision log file, replaying existing entries.
    ///
    /// A torn final line (crash during append) is ignored and cut off so
    /// later appends start on a fresh line. Any other malformed line is an
    /// error.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let replayed = if path.exists() {
            Self::replay(&path)?
        } else {
            Replayed::default()
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() > replayed.valid_len {
            file.set_len(replayed.valid_len)?;
        }
        let mut writer = BufWriter::new(file);
        if replayed.needs_newline {
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        writer.get_ref().sync_all()?;

        Ok(Self {
            path,
            decisions: Mutex::new(replayed.decisions),
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path) -> io::Result<Replayed> {
        let bytes = std::fs::read(path)?;
        let mut replayed = Replayed::default();

        let mut start = 0;
        let mut number = 0;
        while start < bytes.len() {
            let end = bytes[start..]
                .iter()
                .position(|b| *b == b'\n')
                .map_or(bytes.len(), |i| start + i);
            let next = (end + 1).min(bytes.len());
            let line = &bytes[start..end];
            number += 1;
            start = next;

            if line.iter().all(u8::is_ascii_whitespace) {
                replayed.valid_len = next as u64;
                continue;
            }
            match serde_json::from_slice::<LogEntry>(line) {
                Ok(LogEntry::Commit(decision)) => {
                    replayed.decisions.insert(decision.global_id, decision);
                }
                Ok(LogEntry::Forget { global_id }) => {
                    replayed.decisions.remove(&global_id);
                }
                Err(e) if next == bytes.len() => {
                    warn!(
                        event = %Event::DecisionLogTornTail,
                        path = %path.display(),
                        error = %e,
                        "ignoring torn final decision log entry"
                    );
                    break;
                }
                Err(e) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("decision log line {}: {}", number, e),
                    ));
                }
            }
            replayed.valid_len = next as u64;
        }

        let valid = &bytes[..replayed.valid_len as usize];
        replayed.needs_newline = valid.last().is_some_and(|b| *b != b'\n');
        Ok(replayed)
    }

    fn append(&self, entry: &LogEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Uuid, CommitDecision>> {
        self.decisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DecisionLog for FileDecisionLog {
    fn record_commit(&self, decision: &CommitDecision) -> io::Result<()> {
        self.append(&LogEntry::Commit(decision.clone()))?;
        self.lock().insert(decision.global_id, decision.clone());
        Ok(())
    }

    fn is_committed(&self, global_id: &Uuid) -> bool {
        self.lock().contains_key(global_id)
    }

    fn forget(&self, global_id: &Uuid) -> io::Result<()> {
        if self.lock().remove(global_id).is_some() {
            self.append(&LogEntry::Forget {
                global_id: *global_id,
            })?;
        }
        Ok(())
    }

    fn pending(&self) -> Vec<CommitDecision> {
        self.lock().values().cloned().collect()
    }
}

//! Rule journal
//!
//! Append-only file of newline-delimited JSON records, one per committed
//! mutation, replayed at start-up to rebuild the table:
//!
//! ```text
//! {"seq":1,"op":"install","prefix":"10.0.0.0/8","action":"DROP","at":"..."}
//! {"seq":2,"op":"withdraw","prefix":"10.0.0.0/8","at":"..."}
//! ```
//!
//! A crash can leave a partially written last line. That line is ignored
//! and cut off on open; damage anywhere else is an error.

use super::message::UpdateRuleRequest;
use super::validator::validate_update;
use crate::dataplane::{ActionKind, Prefix, PrefixTable, Rule};
use crate::error::RuleError;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalOp {
    Install,
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub op: JournalOp,
    pub prefix: Prefix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub at: DateTime<Utc>,
}

impl JournalRecord {
    fn install(seq: u64, rule: &Rule) -> Self {
        Self {
            seq,
            op: JournalOp::Install,
            prefix: rule.prefix,
            action: Some(rule.action.kind()),
            interface: rule.action.interface().map(str::to_string),
            at: rule.updated_at,
        }
    }

    fn withdraw(seq: u64, prefix: Prefix) -> Self {
        Self {
            seq,
            op: JournalOp::Withdraw,
            prefix,
            action: None,
            interface: None,
            at: Utc::now(),
        }
    }

    /// Apply this record to `table`.
    pub fn apply(&self, table: &PrefixTable) -> std::result::Result<(), RuleError> {
        match self.op {
            JournalOp::Install => {
                let action = self.action.ok_or_else(|| {
                    RuleError::MalformedRequest(format!("install record {} has no action", self.seq))
                })?;
                let (prefix, action) = validate_update(&UpdateRuleRequest {
                    prefix: self.prefix.to_string(),
                    action,
                    redirect_interface: self.interface.clone(),
                })?;
                table.install(prefix, action).map(|_| ())
            }
            JournalOp::Withdraw => table.withdraw(&self.prefix).map(|_| ()),
        }
    }
}

/// Open journal file positioned for appending
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    next_seq: u64,
}

impl Journal {
    /// Open (or create) the journal at `path` and return the records it
    /// already holds.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<JournalRecord>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        let (records, valid_len) = parse_records(&content)?;
        if valid_len < content.len() {
            warn!(
                path = %path.display(),
                discarded = content.len() - valid_len,
                "Discarding torn journal tail"
            );
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let next_seq = records.last().map(|r| r.seq + 1).unwrap_or(1);
        debug!(path = %path.display(), records = records.len(), "Journal opened");

        Ok((
            Self {
                path,
                file,
                next_seq,
            },
            records,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number the next record will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn append_install(&mut self, rule: &Rule) -> Result<()> {
        let record = JournalRecord::install(self.next_seq, rule);
        self.append(&record)
    }

    pub fn append_withdraw(&mut self, prefix: Prefix) -> Result<()> {
        let record = JournalRecord::withdraw(self.next_seq, prefix);
        self.append(&record)
    }

    fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let mut line =
            serde_json::to_string(record).map_err(|e| Error::Journal(e.to_string()))?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;
        self.next_seq += 1;
        Ok(())
    }

    /// Rewrite the journal as one install record per rule in `rules`.
    ///
    /// The new content is written to a sibling file and renamed over the
    /// journal, so a crash leaves either the old or the new file.
    pub fn compact(&mut self, rules: &[Rule]) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut out = String::new();
        for (i, rule) in rules.iter().enumerate() {
            let record = JournalRecord::install(i as u64 + 1, rule);
            out.push_str(
                &serde_json::to_string(&record).map_err(|e| Error::Journal(e.to_string()))?,
            );
            out.push('\n');
        }

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(out.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.next_seq = rules.len() as u64 + 1;
        info!(path = %self.path.display(), rules = rules.len(), "Journal compacted");
        Ok(())
    }
}

/// Parse journal content; returns the records and the byte length of the
/// well-formed part.
fn parse_records(content: &str) -> Result<(Vec<JournalRecord>, usize)> {
    let mut records = Vec::new();
    let mut offset = 0;
    let mut lines = content.split_inclusive('\n').enumerate().peekable();

    while let Some((lineno, raw)) = lines.next() {
        let is_last = lines.peek().is_none();
        let line = raw.trim();
        if line.is_empty() {
            offset += raw.len();
            continue;
        }
        // An unterminated line can only be the last one: torn write
        if !raw.ends_with('\n') {
            break;
        }

        match serde_json::from_str::<JournalRecord>(line) {
            Ok(record) => {
                records.push(record);
                offset += raw.len();
            }
            Err(_) if is_last => break,
            Err(e) => return Err(Error::Journal(format!("line {}: {}", lineno + 1, e))),
        }
    }

    Ok((records, offset))
}

/// Counts from a journal replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Apply `records` to `table` in order. Records the table refuses (for
/// example a redirect to an interface that no longer exists) are skipped.
pub fn replay(records: &[JournalRecord], table: &PrefixTable) -> ReplayStats {
    let mut stats = ReplayStats::default();
    for record in records {
        match record.apply(table) {
            Ok(()) => stats.applied += 1,
            Err(e) => {
                stats.skipped += 1;
                warn!(
                    seq = record.seq,
                    prefix = %record.prefix,
                    code = e.code(),
                    "Skipping journal record: {}",
                    e
                );
            }
        }
    }
    info!(
        applied = stats.applied,
        skipped = stats.skipped,
        rules = table.len(),
        "Journal replayed"
    );
    stats
}

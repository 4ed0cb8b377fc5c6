//! Store records: one JSON object per line, tagged by `kind`.

use std::collections::BTreeMap;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use traj_core::Value;

use crate::error::Result;

pub const FORMAT: &str = "trajectory-store";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Header {
        format: String,
        version: u32,
        tree: String,
        created_at: String,
    },
    Group {
        path: String,
    },
    Parameter {
        path: String,
        default: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explored: Option<Vec<Value>>,
    },
    Exploration {
        parameters: Vec<String>,
        run_count: usize,
        fingerprint: String,
    },
    /// `path` is relative to the run namespace when `run` is set.
    Result {
        path: String,
        run: Option<usize>,
        items: BTreeMap<String, Value>,
    },
    Begin {
        run: usize,
        started_at: String,
    },
    Commit {
        run: usize,
        duration_ms: u64,
        committed_at: String,
    },
    Failure {
        run: usize,
        error: String,
        failed_at: String,
    },
    /// Drops `path` and everything below it from the live structure.
    Removed {
        path: String,
    },
}

impl Record {
    pub fn header(tree: &str) -> Self {
        Self::Header {
            format: FORMAT.to_string(),
            version: FORMAT_VERSION,
            tree: tree.to_string(),
            created_at: now(),
        }
    }

    pub fn begin(run: usize) -> Self {
        Self::Begin {
            run,
            started_at: now(),
        }
    }

    pub fn commit(run: usize, duration_ms: u64) -> Self {
        Self::Commit {
            run,
            duration_ms,
            committed_at: now(),
        }
    }

    pub fn failure(run: usize, error: impl Into<String>) -> Self {
        Self::Failure {
            run,
            error: error.into(),
            failed_at: now(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Header { .. } => RecordKind::Header,
            Self::Group { .. } => RecordKind::Group,
            Self::Parameter { .. } => RecordKind::Parameter,
            Self::Exploration { .. } => RecordKind::Exploration,
            Self::Result { .. } => RecordKind::Result,
            Self::Begin { .. } => RecordKind::Begin,
            Self::Commit { .. } => RecordKind::Commit,
            Self::Failure { .. } => RecordKind::Failure,
            Self::Removed { .. } => RecordKind::Removed,
        }
    }

    /// Catalog view of a record about to be appended.
    pub(crate) fn entry(&self) -> Entry {
        let mut entry = Entry::new(self.kind());
        match self {
            Self::Header { tree, .. } => entry.tree = Some(tree.clone()),
            Self::Group { path } | Self::Parameter { path, .. } | Self::Removed { path } => {
                entry.path = Some(path.clone())
            }
            Self::Exploration { .. } => {}
            Self::Result { path, run, items } => {
                entry.path = Some(path.clone());
                entry.run = *run;
                entry.items = items.keys().cloned().collect();
            }
            Self::Begin { run, .. } | Self::Commit { run, .. } | Self::Failure { run, .. } => {
                entry.run = Some(*run)
            }
        }
        entry
    }

    /// One line, newline included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(line)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Header,
    Group,
    Parameter,
    Exploration,
    Result,
    Begin,
    Commit,
    Failure,
    Removed,
}

/// The fields the catalog needs. Payload values are skipped, not materialized.
#[derive(Debug, Deserialize)]
struct RecordHeader {
    kind: RecordKind,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    run: Option<usize>,
    #[serde(default)]
    tree: Option<String>,
    #[serde(default)]
    items: Option<BTreeMap<String, IgnoredAny>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub kind: RecordKind,
    pub path: Option<String>,
    pub run: Option<usize>,
    pub tree: Option<String>,
    pub items: Vec<String>,
}

impl Entry {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            path: None,
            run: None,
            tree: None,
            items: Vec::new(),
        }
    }

    pub fn decode(line: &[u8]) -> Result<Self> {
        let header: RecordHeader = serde_json::from_slice(line)?;
        Ok(Self {
            kind: header.kind,
            path: header.path,
            run: header.run,
            tree: header.tree,
            items: header
                .items
                .map(|items| items.into_keys().collect())
                .unwrap_or_default(),
        })
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_record_layout() {
        let mut items = BTreeMap::new();
        items.insert("z".to_string(), Value::from(6));
        let record = Record::Result {
            path: "z".to_string(),
            run: Some(0),
            items,
        };

        let line = record.encode().expect("encode");
        assert_eq!(line.last(), Some(&b'\n'));
        let text = String::from_utf8(line.clone()).expect("utf8");
        assert!(text.starts_with(r#"{"kind":"result","path":"z","run":0,"items":{"z":{"type":"int","value":6}}}"#));
        assert_eq!(Record::decode(&line).expect("decode"), record);
    }

    #[test]
    fn test_entry_skips_payloads() {
        let line = br#"{"kind":"result","path":"stats","run":3,"items":{"mean":{"type":"float","value":1.5},"raw":{"type":"sequence","value":[]}}}"#;
        let entry = Entry::decode(line).expect("entry");
        assert_eq!(entry.kind, RecordKind::Result);
        assert_eq!(entry.path.as_deref(), Some("stats"));
        assert_eq!(entry.run, Some(3));
        assert_eq!(entry.items, vec!["mean".to_string(), "raw".to_string()]);

        let record = Record::decode(line).expect("record");
        assert_eq!(record.entry(), entry);
    }

    #[test]
    fn test_aggregate_result_has_null_run() {
        let line = br#"{"kind":"result","path":"summary","run":null,"items":{}}"#;
        assert_eq!(Entry::decode(line).expect("entry").run, None);
    }
}

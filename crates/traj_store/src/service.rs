//! Single-file storage service.
//!
//! Every mutation is an append of complete JSON lines under one mutex, so
//! workers may call [`StorageService::store_run`] concurrently. A run counts
//! as stored only once its `commit` record is on disk; anything after the last
//! newline is a torn append and is cut off on the next open.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use traj_core::{Locator, Value};

use crate::catalog::Catalog;
use crate::error::{Result, StorageError};
use crate::file::{Span, StoreFile};
use crate::record::{Entry, Record, RecordKind, FORMAT, FORMAT_VERSION};

#[path = "service/load.rs"]
mod load;
#[path = "service/write.rs"]
mod write;

pub use load::{LoadMode, StoredExploration};

#[derive(Debug)]
pub struct StorageService {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: StoreFile,
    catalog: Catalog,
    /// Stamped into every locator handed out; changes when offsets do.
    token: u64,
}

/// Sizes before and after [`StorageService::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl StorageService {
    /// Opens or creates the store at `path`.
    ///
    /// A new file gets a header naming the tree after the file stem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = StoreFile::open(path)?;
        let dropped = file.repair_torn_tail()?;
        if dropped > 0 {
            warn!(
                "dropped {dropped} bytes of torn trailing record from {}",
                path.display()
            );
        }

        let catalog = scan(&mut file)?;
        let mut inner = Inner {
            file,
            catalog,
            token: rand::random(),
        };
        if inner.catalog.header.is_none() {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "trajectory".to_string());
            inner.append(&[Record::header(&name)])?;
            inner.file.sync()?;
            debug!("created store {} for tree `{name}`", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Name recorded by the latest header.
    pub fn tree_name(&self) -> Result<String> {
        Ok(self.lock()?.catalog.tree_name.clone())
    }

    /// Run indices with a commit marker. Payloads are never parsed.
    pub fn list_completed_runs(&self) -> Result<BTreeSet<usize>> {
        Ok(self.lock()?.catalog.committed.keys().copied().collect())
    }

    /// Runs that began but never committed.
    pub fn open_attempts(&self) -> Result<Vec<usize>> {
        Ok(self.lock()?.catalog.open_attempts())
    }

    /// Latest failure message per run.
    pub fn failures(&self) -> Result<BTreeMap<usize, String>> {
        let mut inner = self.lock()?;
        let spans: Vec<(usize, Span)> = inner
            .catalog
            .failures
            .iter()
            .map(|(run, span)| (*run, *span))
            .collect();
        let mut failures = BTreeMap::new();
        for (run, span) in spans {
            match inner.read_record(span)? {
                Record::Failure { error, .. } => {
                    failures.insert(run, error);
                }
                other => return Err(unexpected(span, RecordKind::Failure, &other)),
            }
        }
        Ok(failures)
    }

    /// Rewrites the file with live records only, then swaps it in atomically.
    ///
    /// Placeholders handed out before compaction no longer resolve.
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut inner = self.lock()?;
        let bytes_before = inner.file.len();
        let spans = live_spans(&inner.catalog);

        let staging = staging_path(&self.path);
        {
            let mut out = BufWriter::new(File::create(&staging)?);
            for span in spans {
                out.write_all(&inner.file.read_span(span)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&staging, &self.path)?;

        let mut file = StoreFile::open(&self.path)?;
        inner.catalog = scan(&mut file)?;
        inner.file = file;
        inner.token = rand::random();

        let stats = CompactionStats {
            bytes_before,
            bytes_after: inner.file.len(),
        };
        info!(
            "compacted {}: {} -> {} bytes",
            self.path.display(),
            stats.bytes_before,
            stats.bytes_after
        );
        Ok(stats)
    }
}

impl Inner {
    /// Appends `records` as one write and indexes them.
    fn append(&mut self, records: &[Record]) -> Result<()> {
        let mut buffer = Vec::new();
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let line = record.encode()?;
            entries.push((record.entry(), buffer.len() as u64, line.len() as u64));
            buffer.extend_from_slice(&line);
        }
        if buffer.is_empty() {
            return Ok(());
        }

        let base = self.file.append(&buffer)?;
        for (entry, relative, len) in entries {
            self.catalog.apply(
                entry,
                Span {
                    offset: base + relative,
                    len,
                },
            );
        }
        Ok(())
    }

    /// Appends a framed run and its durable commit marker.
    fn commit_run(&mut self, body: &[Record], run: usize, duration_ms: u64) -> Result<()> {
        self.append(body)?;
        self.file.sync()?;
        self.append(&[Record::commit(run, duration_ms)])?;
        self.file.sync()?;
        Ok(())
    }

    fn read_record(&mut self, span: Span) -> Result<Record> {
        let line = self.file.read_span(span)?;
        Record::decode(&line).map_err(|error| StorageError::Corrupt {
            offset: span.offset,
            reason: error.to_string(),
        })
    }

    fn locator(&self, span: Span) -> Locator {
        Locator {
            store: self.token,
            offset: span.offset,
            len: span.len,
        }
    }

    /// Loads item `item` of the result record behind `locator`.
    fn read_item(&mut self, locator: Locator, path: &str, item: &str) -> Result<Value> {
        if locator.store != self.token {
            return Err(StorageError::Unresolved {
                path: path.to_string(),
                item: item.to_string(),
            });
        }
        let span = Span {
            offset: locator.offset,
            len: locator.len,
        };
        match self.read_record(span)? {
            Record::Result { mut items, .. } => {
                items.remove(item).ok_or_else(|| StorageError::Corrupt {
                    offset: span.offset,
                    reason: format!("result `{path}` has no item `{item}`"),
                })
            }
            other => Err(unexpected(span, RecordKind::Result, &other)),
        }
    }
}

/// Builds the catalog from record headers, validating the file header.
fn scan(file: &mut StoreFile) -> Result<Catalog> {
    let mut catalog = Catalog::default();
    file.for_each_line(|span, line| -> Result<()> {
        let entry = Entry::decode(line).map_err(|error| StorageError::Corrupt {
            offset: span.offset,
            reason: error.to_string(),
        })?;
        if span.offset == 0 && entry.kind != RecordKind::Header {
            return Err(StorageError::Corrupt {
                offset: 0,
                reason: "store does not start with a header".to_string(),
            });
        }
        if entry.kind == RecordKind::Header {
            check_header(span, line)?;
        }
        catalog.apply(entry, span);
        Ok(())
    })?;
    if catalog.orphans > 0 {
        debug!("{} superseded or orphaned run records skipped", catalog.orphans);
    }
    Ok(catalog)
}

fn check_header(span: Span, line: &[u8]) -> Result<()> {
    match Record::decode(line)? {
        Record::Header {
            format, version, ..
        } if format == FORMAT && version <= FORMAT_VERSION => Ok(()),
        Record::Header {
            format, version, ..
        } => Err(StorageError::Corrupt {
            offset: span.offset,
            reason: format!("unsupported store format {format} v{version}"),
        }),
        other => Err(unexpected(span, RecordKind::Header, &other)),
    }
}

/// Live records in rewrite order: header, structure, exploration, committed runs.
fn live_spans(catalog: &Catalog) -> Vec<Span> {
    let mut spans = Vec::new();
    spans.extend(catalog.header);
    spans.extend(catalog.groups.iter().map(|(_, span)| *span));
    spans.extend(catalog.parameters.iter().map(|(_, span)| *span));
    spans.extend(catalog.exploration);
    spans.extend(catalog.aggregates.iter().map(|(_, entry)| entry.span));
    for run in catalog.committed.values() {
        spans.push(run.begin);
        spans.extend(run.results.iter().map(|entry| entry.span));
        spans.push(run.commit);
    }
    spans.extend(
        catalog
            .failures
            .iter()
            .filter(|(run, _)| !catalog.committed.contains_key(*run))
            .map(|(_, span)| *span),
    );
    spans
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}

fn unexpected(span: Span, expected: RecordKind, actual: &Record) -> StorageError {
    StorageError::Corrupt {
        offset: span.offset,
        reason: format!("expected a {expected:?} record, found {:?}", actual.kind()),
    }
}

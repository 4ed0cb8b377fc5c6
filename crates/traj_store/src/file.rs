//! Append handle over the store file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Byte range of one line, trailing newline included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Span {
    pub offset: u64,
    pub len: u64,
}

const TAIL_CHUNK: u64 = 8 * 1024;

#[derive(Debug)]
pub(crate) struct StoreFile {
    file: File,
    len: u64,
}

impl StoreFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Drops a partial trailing line left by an interrupted append.
    ///
    /// Returns the number of bytes removed.
    pub fn repair_torn_tail(&mut self) -> io::Result<u64> {
        let mut end = self.len;
        let mut keep = 0;
        while end > 0 {
            let start = end.saturating_sub(TAIL_CHUNK);
            let mut chunk = vec![0u8; (end - start) as usize];
            self.file.seek(SeekFrom::Start(start))?;
            self.file.read_exact(&mut chunk)?;
            if let Some(position) = chunk.iter().rposition(|byte| *byte == b'\n') {
                keep = start + position as u64 + 1;
                break;
            }
            end = start;
        }

        let dropped = self.len - keep;
        if dropped > 0 {
            self.file.set_len(keep)?;
            self.file.sync_data()?;
            self.len = keep;
        }
        Ok(dropped)
    }

    /// Appends complete lines. On a short write the file is cut back to its previous length.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let offset = self.len;
        if let Err(error) = self.file.write_all(bytes).and_then(|()| self.file.flush()) {
            let _ = self.file.set_len(offset);
            return Err(error);
        }
        self.len += bytes.len() as u64;
        Ok(offset)
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    pub fn read_span(&mut self, span: Span) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; span.len as usize];
        self.file.seek(SeekFrom::Start(span.offset))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Visits every complete line in file order.
    pub fn for_each_line<E, F>(&mut self, mut visit: F) -> Result<(), E>
    where
        E: From<io::Error>,
        F: FnMut(Span, &[u8]) -> Result<(), E>,
    {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&self.file);
        let mut line = Vec::new();
        let mut offset = 0u64;
        while offset < self.len {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            let span = Span {
                offset,
                len: read as u64,
            };
            offset += read as u64;
            if line.last() != Some(&b'\n') {
                break;
            }
            visit(span, &line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_drops_partial_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.jsonl");
        std::fs::write(&path, b"{\"a\":1}\n{\"b\":2}\n{\"c\":").expect("seed file");

        let mut file = StoreFile::open(&path).expect("open");
        assert_eq!(file.repair_torn_tail().expect("repair"), 5);
        assert_eq!(file.len(), 16);

        let mut spans = Vec::new();
        file.for_each_line(|span, _| -> io::Result<()> {
            spans.push(span);
            Ok(())
        })
        .expect("scan");
        assert_eq!(
            spans,
            vec![Span { offset: 0, len: 8 }, Span { offset: 8, len: 8 }]
        );
        assert_eq!(file.read_span(spans[1]).expect("read"), b"{\"b\":2}\n");
    }

    #[test]
    fn test_repair_without_any_newline_empties_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.jsonl");
        std::fs::write(&path, b"{\"kind\":\"hea").expect("seed file");

        let mut file = StoreFile::open(&path).expect("open");
        file.repair_torn_tail().expect("repair");
        assert_eq!(file.len(), 0);

        let offset = file.append(b"{}\n").expect("append");
        assert_eq!(offset, 0);
        assert_eq!(std::fs::read(&path).expect("read back"), b"{}\n");
    }
}

//! Reading store files: forward scans for readers, a backward scan for the
//! tail that anchors each append.
//!
//! A store file is a sequence of `\n`-terminated lines. Blank lines are
//! ignored. Bytes after the last `\n` are a record still being written (or
//! the debris of a crashed writer): readers skip them, and the append path
//! treats them as a broken tail.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use evchain_contracts::error::{EvchainError, EvchainResult};

use crate::chain::ParsedLine;

const TAIL_CHUNK: u64 = 8 * 1024;

/// The complete lines of a store file.
#[derive(Debug, Default)]
pub struct FileScan {
    /// Non-blank, newline-terminated lines, trimmed, in file order.
    pub lines: Vec<Result<String, String>>,
    /// True when the file ends with non-blank bytes lacking a final `\n`.
    pub unterminated_tail: bool,
}

impl FileScan {
    pub fn parsed(&self) -> Vec<ParsedLine> {
        self.lines
            .iter()
            .map(|line| match line {
                Ok(text) => ParsedLine::parse(text),
                Err(detail) => ParsedLine::Malformed(detail.clone()),
            })
            .collect()
    }
}

/// Read every complete line of `path`. A missing file reads as empty.
pub fn scan_file(path: &Path) -> EvchainResult<FileScan> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileScan::default()),
        Err(e) => return Err(EvchainError::io(format!("reading {}", path.display()), e)),
    };

    let mut scan = FileScan::default();
    let mut segments = bytes.split(|&b| b == b'\n').peekable();
    while let Some(segment) = segments.next() {
        let is_last = segments.peek().is_none();
        if is_blank(segment) {
            continue;
        }
        if is_last {
            scan.unterminated_tail = true;
            break;
        }
        scan.lines.push(match std::str::from_utf8(segment) {
            Ok(text) => Ok(text.trim().to_string()),
            Err(e) => Err(format!("invalid UTF-8: {}", e)),
        });
    }
    Ok(scan)
}

/// The last line of a store file as seen by the backward scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailLine {
    /// The file is missing or holds no complete line.
    Empty,
    /// The last complete line, trimmed.
    Complete(String),
    /// The last complete line is not valid UTF-8.
    NotUtf8,
    /// The file ends in a partial line (only reported in `TailMode::Strict`).
    Unterminated,
}

/// How to treat a partial final line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailMode {
    /// Report it; the append path refuses to build on it.
    Strict,
    /// Skip it and return the last complete line before it.
    SkipPartial,
}

/// Find the last non-blank line of `path` by reading backwards in chunks,
/// so the cost does not grow with the size of the store.
pub fn read_tail_line(path: &Path, mode: TailMode) -> EvchainResult<TailLine> {
    let io_err = |e| EvchainError::io(format!("reading tail of {}", path.display()), e);

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TailLine::Empty),
        Err(e) => return Err(io_err(e)),
    };
    let mut pos = file.metadata().map_err(io_err)?.len();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        if pos > 0 {
            let chunk_len = TAIL_CHUNK.min(pos);
            pos -= chunk_len;
            let mut chunk = vec![0u8; chunk_len as usize];
            file.seek(SeekFrom::Start(pos)).map_err(io_err)?;
            file.read_exact(&mut chunk).map_err(io_err)?;
            chunk.extend_from_slice(&buf);
            buf = chunk;
        }

        match locate_last_line(&buf, pos == 0, mode) {
            Locate::Found(range) => {
                return Ok(match std::str::from_utf8(&buf[range]) {
                    Ok(text) => TailLine::Complete(text.trim().to_string()),
                    Err(_) => TailLine::NotUtf8,
                })
            }
            Locate::Unterminated => return Ok(TailLine::Unterminated),
            Locate::Empty => return Ok(TailLine::Empty),
            Locate::NeedMore if pos == 0 => return Ok(TailLine::Empty),
            Locate::NeedMore => continue,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Locate {
    Found(Range<usize>),
    Unterminated,
    Empty,
    NeedMore,
}

/// `buf` is a suffix of the file; `at_start` says it begins at offset 0.
fn locate_last_line(buf: &[u8], at_start: bool, mode: TailMode) -> Locate {
    let mut end = buf.len();

    let last_newline = buf.iter().rposition(|&b| b == b'\n');
    let trailing = match last_newline {
        Some(i) => &buf[i + 1..],
        None => buf,
    };
    if !is_blank(trailing) {
        match (mode, last_newline) {
            (TailMode::Strict, _) => return Locate::Unterminated,
            (TailMode::SkipPartial, Some(i)) => end = i,
            (TailMode::SkipPartial, None) if at_start => return Locate::Empty,
            (TailMode::SkipPartial, None) => return Locate::NeedMore,
        }
    }

    let content_end = match buf[..end].iter().rposition(|b| !b.is_ascii_whitespace()) {
        Some(i) => i + 1,
        None if at_start => return Locate::Empty,
        None => return Locate::NeedMore,
    };
    match buf[..content_end].iter().rposition(|&b| b == b'\n') {
        Some(i) => Locate::Found(i + 1..content_end),
        None if at_start => Locate::Found(0..content_end),
        None => Locate::NeedMore,
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn tail_of_missing_or_blank_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.jsonl");
        assert_eq!(read_tail_line(&missing, TailMode::Strict).unwrap(), TailLine::Empty);

        let blank = write(&dir, b"\n\n  \n");
        assert_eq!(read_tail_line(&blank, TailMode::Strict).unwrap(), TailLine::Empty);
    }

    #[test]
    fn tail_skips_trailing_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, b"{\"a\":1}\n{\"b\":2}\n\n\n");
        assert_eq!(
            read_tail_line(&path, TailMode::Strict).unwrap(),
            TailLine::Complete("{\"b\":2}".to_string())
        );
    }

    #[test]
    fn partial_final_line_depends_on_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, b"{\"a\":1}\n{\"b\":");
        assert_eq!(read_tail_line(&path, TailMode::Strict).unwrap(), TailLine::Unterminated);
        assert_eq!(
            read_tail_line(&path, TailMode::SkipPartial).unwrap(),
            TailLine::Complete("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn tail_spanning_several_chunks_is_reassembled() {
        let dir = tempfile::tempdir().unwrap();
        let long = "x".repeat((TAIL_CHUNK as usize) * 2 + 17);
        let contents = format!("first\n{}\n", long);
        let path = write(&dir, contents.as_bytes());
        assert_eq!(read_tail_line(&path, TailMode::Strict).unwrap(), TailLine::Complete(long));
    }

    #[test]
    fn tail_with_invalid_utf8_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, b"ok\n\xff\xfe\n");
        assert_eq!(read_tail_line(&path, TailMode::Strict).unwrap(), TailLine::NotUtf8);
    }

    #[test]
    fn scan_skips_blank_lines_and_flags_partial_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, b"one\n\n two \n\xff\npartial");
        let scan = scan_file(&path).unwrap();
        assert_eq!(scan.lines.len(), 3);
        assert_eq!(scan.lines[0], Ok("one".to_string()));
        assert_eq!(scan.lines[1], Ok("two".to_string()));
        assert!(scan.lines[2].is_err());
        assert!(scan.unterminated_tail);
    }
}

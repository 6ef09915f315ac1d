//! Chunked CSV reading with in-block subsampling.
//!
//! Telemetry files are consumed in fixed-size blocks of raw rows; within
//! each block only every stride-th row is kept. The stride phase restarts
//! at each block boundary, so the first row of every block is always part
//! of the sample.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use tracing::debug;

use analytics_core::error::{AnalyticsError, Result};

// ── HeaderIndex ───────────────────────────────────────────────────────────────

/// Case-insensitive lookup of column positions in a CSV header.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    columns: Vec<String>,
}

impl HeaderIndex {
    /// Build an index from the header record.
    ///
    /// Names are stripped of any UTF-8 byte-order mark and surrounding
    /// whitespace, then lowercased.
    pub fn from_record(record: &StringRecord) -> Self {
        let columns = record
            .iter()
            .map(|name| {
                name.trim_start_matches('\u{feff}')
                    .trim()
                    .to_ascii_lowercase()
            })
            .collect();
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of `name` (lowercase) in the header.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Position of the first of `names` present in the header.
    pub fn position_of_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.position(name))
    }
}

// ── SampledBlock ──────────────────────────────────────────────────────────────

/// The rows kept from one block, plus how many raw rows the block spanned.
#[derive(Debug)]
pub struct SampledBlock {
    /// Every stride-th row of the block, in file order.
    pub rows: Vec<StringRecord>,
    /// Number of raw rows consumed to produce this block.
    pub raw_len: usize,
}

// ── ChunkedCsvReader ──────────────────────────────────────────────────────────

/// Streaming reader that yields [`SampledBlock`]s from one CSV file.
///
/// Only the current block is held in memory; a file never needs to fit in
/// RAM regardless of its length.
pub struct ChunkedCsvReader {
    records: StringRecordsIntoIter<File>,
    header: HeaderIndex,
    path: PathBuf,
    block_size: usize,
    stride: usize,
    exhausted: bool,
}

impl fmt::Debug for ChunkedCsvReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedCsvReader")
            .field("header", &self.header)
            .field("path", &self.path)
            .field("block_size", &self.block_size)
            .field("stride", &self.stride)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl ChunkedCsvReader {
    /// Open `path` and parse its header row.
    ///
    /// `block_size` and `stride` are clamped to at least 1.
    pub fn open(path: &Path, block_size: usize, stride: usize) -> Result<Self> {
        let file = File::open(path).map_err(|source| AnalyticsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = match reader.headers() {
            Ok(record) => HeaderIndex::from_record(record),
            Err(err) => return Err(classify_read_error(path, err)),
        };

        debug!(
            "Opened {}: {} columns, block size {}, stride {}",
            path.display(),
            header.len(),
            block_size,
            stride
        );

        Ok(Self {
            records: reader.into_records(),
            header,
            path: path.to_path_buf(),
            block_size: block_size.max(1),
            stride: stride.max(1),
            exhausted: false,
        })
    }

    /// The parsed header of the underlying file.
    pub fn header(&self) -> &HeaderIndex {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for ChunkedCsvReader {
    type Item = Result<SampledBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let mut rows = Vec::new();
        let mut raw_len = 0usize;

        while raw_len < self.block_size {
            let record = match self.records.next() {
                Some(Ok(record)) => record,
                Some(Err(err)) => {
                    self.exhausted = true;
                    return Some(Err(classify_read_error(&self.path, err)));
                }
                None => break,
            };

            // Rows narrower than the header cannot be decoded; rows with
            // trailing extra fields are tolerated.
            if record.len() < self.header.len() {
                self.exhausted = true;
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Some(Err(AnalyticsError::MalformedRow {
                    path: self.path.clone(),
                    line,
                    expected: self.header.len(),
                    found: record.len(),
                }));
            }

            if raw_len % self.stride == 0 {
                rows.push(record);
            }
            raw_len += 1;
        }

        if raw_len == 0 {
            None
        } else {
            Some(Ok(SampledBlock { rows, raw_len }))
        }
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Split a csv-crate error into the I/O and parse halves of the taxonomy.
fn classify_read_error(path: &Path, err: csv::Error) -> AnalyticsError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => AnalyticsError::FileRead {
            path: path.to_path_buf(),
            source,
        },
        _ => AnalyticsError::Csv {
            path: path.to_path_buf(),
            message,
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

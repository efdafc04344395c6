//! Flat-file record store.
//!
//! # Format
//!
//! One member per line: `identifier \t version \t neighbor,neighbor,...`.
//! See [`crate::record`] for the parsing rules.
//!
//! # Rewrites
//!
//! Version updates never edit the file in place. The new content is streamed
//! into a temporary file in the same directory, flushed, and renamed over the
//! original. The temporary file is removed if anything fails before the
//! rename. Writers are serialized by an exclusive lock on `<store>.lock`.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::error::RolloutError;
use crate::lock::StoreLock;
use crate::record::{Record, format_line, parse_line};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tab-separated member store backed by a single file.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FlatFileStore {
    /// Point at a store file. No I/O happens until a read or write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in file order.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or
    /// [`RolloutError::MalformedRecord`] for the first bad line.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_records(&self) -> Result<Vec<Record>, RolloutError> {
        let mut records = Vec::new();
        self.for_each_line(|parsed| records.push(parsed.to_record()))?;
        debug!(records = records.len(), "store read");
        Ok(records)
    }

    /// Count members per version, for reporting.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_records`].
    pub fn version_counts(&self) -> Result<BTreeMap<String, usize>, RolloutError> {
        let mut counts = BTreeMap::new();
        self.for_each_line(|parsed| {
            *counts.entry(parsed.version.to_string()).or_insert(0) += 1;
        })?;
        Ok(counts)
    }

    /// Version currently stored for `identifier`, if it has a line.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_records`].
    pub fn version_of(&self, identifier: &str) -> Result<Option<String>, RolloutError> {
        let mut found = None;
        self.for_each_line(|parsed| {
            if found.is_none() && parsed.identifier == identifier {
                found = Some(parsed.version.to_string());
            }
        })?;
        Ok(found)
    }

    /// Rewrite the version field of every line whose identifier is in
    /// `identifiers`, preserving all other bytes and the line order.
    ///
    /// Returns the number of lines rewritten. Identifiers that only appear as
    /// neighbors have no line and are not counted.
    ///
    /// # Errors
    ///
    /// Returns [`RolloutError::InvalidParameter`] for an unusable version
    /// string, a lock error if another writer holds the store, or any I/O or
    /// parse error. The original file is untouched on error.
    #[instrument(skip(self, identifiers), fields(path = %self.path.display(), selected = identifiers.len()))]
    pub fn update_versions<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        version: &str,
    ) -> Result<usize, RolloutError> {
        validate_version(version)?;
        let selected: HashSet<&str> = identifiers.iter().map(AsRef::as_ref).collect();

        let _lock = StoreLock::for_store(&self.path, self.lock_timeout)?;
        let reader = BufReader::new(File::open(&self.path)?);

        let mut tmp = self.temp_file()?;
        let mut updated = 0;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for (line_no, line) in LineIter::new(reader) {
                let line = line?;
                match parse_line(&line, line_no)? {
                    Some(parsed) if selected.contains(parsed.identifier) => {
                        writer.write_all(rewrite_version(&line, version).as_bytes())?;
                        updated += 1;
                    }
                    _ => writer.write_all(line.as_bytes())?,
                }
            }
            writer.flush()?;
        }

        self.commit(tmp)?;
        info!(updated, version, "store versions rewritten");
        Ok(updated)
    }

    /// Replace the store with `records`, all at `version`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable version string, lock contention, or
    /// I/O failure.
    pub fn write_records(&self, records: &[Record], version: &str) -> Result<usize, RolloutError> {
        validate_version(version)?;
        let _lock = StoreLock::for_store(&self.path, self.lock_timeout)?;

        let mut tmp = self.temp_file()?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for record in records {
                writeln!(
                    writer,
                    "{}",
                    format_line(&record.identifier, version, record.neighbor_list())
                )?;
            }
            writer.flush()?;
        }

        self.commit(tmp)?;
        debug!(records = records.len(), "store written");
        Ok(records.len())
    }

    fn for_each_line(&self, mut f: impl FnMut(crate::record::StoreLine<'_>)) -> Result<(), RolloutError> {
        let reader = BufReader::new(File::open(&self.path)?);
        for (line_no, line) in LineIter::new(reader) {
            let line = line?;
            if let Some(parsed) = parse_line(&line, line_no)? {
                f(parsed);
            }
        }
        Ok(())
    }

    fn temp_file(&self) -> Result<NamedTempFile, RolloutError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(tempfile::Builder::new()
            .prefix(".cohort-")
            .suffix(".tmp")
            .tempfile_in(dir)?)
    }

    fn commit(&self, tmp: NamedTempFile) -> Result<(), RolloutError> {
        if let Ok(metadata) = fs::metadata(&self.path) {
            fs::set_permissions(tmp.path(), metadata.permissions())?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

/// Lines with their terminators kept, numbered from 1.
struct LineIter<R> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> LineIter<R> {
    const fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }
}

impl<R: BufRead> Iterator for LineIter<R> {
    type Item = (usize, std::io::Result<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                Some((self.line_no, Ok(line)))
            }
            Err(err) => {
                self.line_no += 1;
                Some((self.line_no, Err(err)))
            }
        }
    }
}

pub(crate) fn validate_version(version: &str) -> Result<(), RolloutError> {
    if version.is_empty() || version.contains(['\t', '\n', '\r']) {
        return Err(RolloutError::InvalidParameter(format!(
            "version must be non-empty and free of tabs and newlines, got {version:?}"
        )));
    }
    Ok(())
}

/// Swap the second field of `line`, keeping everything else byte for byte.
fn rewrite_version(line: &str, version: &str) -> String {
    let body_len = line.trim_end_matches(['\r', '\n']).len();
    let (body, terminator) = line.split_at(body_len);

    let mut fields = body.splitn(3, '\t');
    let identifier = fields.next().unwrap_or_default();
    let _old_version = fields.next();

    let mut out = String::with_capacity(line.len() + version.len());
    out.push_str(identifier);
    out.push('\t');
    out.push_str(version);
    if let Some(rest) = fields.next() {
        out.push('\t');
        out.push_str(rest);
    }
    out.push_str(terminator);
    out
}

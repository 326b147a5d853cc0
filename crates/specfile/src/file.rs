//! [`FileSpec`]: owns a file's text, its [`ScanIndex`] and the per-scan
//! parse cache.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ParseOptions;
use crate::error::{Result, SpecError};
use crate::header::FileHeader;
use crate::index::{NumberLookup, ScanIndex};
use crate::scan::Scan;

/// How a caller names a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanId {
    /// First scan with this number.
    Number(u32),
    /// The n-th (1-based) scan with this number.
    NumberOrder(u32, usize),
    /// 0-based position in file order.
    Position(usize),
}

impl FromStr for ScanId {
    type Err = SpecError;

    /// `12` or `12.2` (second scan numbered 12).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SpecError::InvalidScanId(s.to_string());
        match s.trim().split_once('.') {
            Some((number, order)) => Ok(Self::NumberOrder(
                number.parse().map_err(|_| invalid())?,
                order.parse().map_err(|_| invalid())?,
            )),
            None => Ok(Self::Number(s.trim().parse().map_err(|_| invalid())?)),
        }
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::NumberOrder(n, k) => write!(f, "{n}.{k}"),
            Self::Position(p) => write!(f, "at position {p}"),
        }
    }
}

/// One line of [`FileSpec::list_scans`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanListing {
    pub position: usize,
    pub number: Option<u32>,
    pub order: usize,
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    /// File name from the first `#F` line.
    pub source: Option<String>,
    pub created: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub user: Option<String>,
    pub application: Option<String>,
    pub scans: usize,
    pub headers: usize,
    /// Scan numbers used more than once, with their counts.
    pub duplicates: Vec<(u32, usize)>,
}

pub struct FileSpec {
    path: PathBuf,
    text: String,
    size: u64,
    options: ParseOptions,
    index: ScanIndex,
    cache: RwLock<HashMap<usize, Arc<Scan>>>,
}

impl fmt::Debug for FileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSpec")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("scans", &self.index.len())
            .field("headers", &self.index.headers().len())
            .finish()
    }
}

impl FileSpec {
    /// Open and index `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ParseOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ParseOptions) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening SPEC file");
        let bytes = fs::read(path)?;
        Self::from_bytes(path.to_path_buf(), bytes, options)
    }

    /// Index content already in memory.  `path` is only used for
    /// reporting and [`refresh`](Self::refresh).
    pub fn from_bytes(path: PathBuf, bytes: Vec<u8>, options: ParseOptions) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(SpecError::EmptyFile(path.display().to_string()));
        }
        let size = bytes.len() as u64;
        let text = decode(bytes);
        let index = ScanIndex::build(&text);
        Ok(Self {
            path,
            text,
            size,
            options,
            index,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn index(&self) -> &ScanIndex {
        &self.index
    }

    pub fn scan_count(&self) -> usize {
        self.index.len()
    }

    pub fn headers(&self) -> &[Arc<FileHeader>] {
        self.index.headers()
    }

    pub fn list_scans(&self) -> Vec<ScanListing> {
        self.index
            .entries()
            .iter()
            .map(|e| ScanListing {
                position: e.position,
                number: e.number,
                order: e.order,
                command: e.command.clone(),
            })
            .collect()
    }

    /// First scan with `number` and how many scans share it.
    pub fn lookup_by_number(&self, number: u32) -> Option<NumberLookup> {
        self.index.lookup_by_number(number)
    }

    pub fn get_scan(&self, id: ScanId) -> Result<Arc<Scan>> {
        let position = match id {
            ScanId::Number(n) => self.index.lookup_by_number(n).map(|l| l.position),
            ScanId::NumberOrder(n, k) => {
                self.index.lookup_by_number_order(n, k).map(|e| e.position)
            }
            ScanId::Position(p) => Some(p),
        };
        position
            .and_then(|p| self.scan_at(p))
            .ok_or_else(|| SpecError::NotFound(id.to_string()))
    }

    /// Scan at `position`, parsed on first access and cached afterwards.
    pub fn scan_at(&self, position: usize) -> Option<Arc<Scan>> {
        let entry = self.index.lookup_by_position(position)?;

        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&position)
            .cloned();
        if let Some(scan) = cached {
            return Some(scan);
        }

        // Parse under the write lock so a scan is parsed, and its issues
        // logged, exactly once.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(scan) = cache.get(&position) {
            return Some(scan.clone());
        }
        let header = self.index.file_header(entry).cloned();
        let scan = Arc::new(Scan::parse(entry, &self.text, header, &self.options));
        cache.insert(position, scan.clone());
        Some(scan)
    }

    /// Number of scans parsed so far.
    pub fn cached(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Scans in file order.  Each call starts from the first scan.
    pub fn iter(&self) -> Scans<'_> {
        Scans {
            spec: self,
            next: 0,
        }
    }

    pub fn info(&self) -> FileInfo {
        let first = self.index.headers().first();
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        FileInfo {
            path: self.path.clone(),
            source: first.and_then(|h| h.source.clone()),
            created: first.and_then(|h| h.date.as_ref()).map(|d| d.raw.clone()),
            modified,
            user: first.and_then(|h| h.user.clone()),
            application: first.and_then(|h| h.application.clone()),
            scans: self.index.len(),
            headers: self.index.headers().len(),
            duplicates: self.index.duplicates(),
        }
    }

    /// Re-read the file if its size changed.  Cached scans whose text and
    /// file header are unchanged stay cached.  Returns whether anything
    /// changed.
    pub fn refresh(&mut self) -> Result<bool> {
        let size = fs::metadata(&self.path)?.len();
        if size == self.size {
            return Ok(false);
        }
        let bytes = fs::read(&self.path)?;
        let size = bytes.len() as u64;
        let text = decode(bytes);
        let index = ScanIndex::build(&text);

        let old_index = &self.index;
        let old_text = &self.text;
        let cache = self.cache.get_mut().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|&position, _| {
            match (
                old_index.lookup_by_position(position),
                index.lookup_by_position(position),
            ) {
                (Some(old), Some(new)) => {
                    old == new
                        && old_text.get(old.span.clone()) == text.get(new.span.clone())
                        && old_index.file_header(old) == index.file_header(new)
                }
                _ => false,
            }
        });
        debug!(kept = cache.len(), "scan cache revalidated");
        info!(
            path = %self.path.display(),
            scans = index.len(),
            "SPEC file re-indexed"
        );

        self.text = text;
        self.size = size;
        self.index = index;
        Ok(true)
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Iterator over the scans of a [`FileSpec`].
pub struct Scans<'a> {
    spec: &'a FileSpec,
    next: usize,
}

impl Iterator for Scans<'_> {
    type Item = Arc<Scan>;

    fn next(&mut self) -> Option<Self::Item> {
        let scan = self.spec.scan_at(self.next)?;
        self.next += 1;
        Some(scan)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.spec.scan_count().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Scans<'_> {}

impl<'a> IntoIterator for &'a FileSpec {
    type Item = Arc<Scan>;
    type IntoIter = Scans<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str) -> FileSpec {
        FileSpec::from_bytes(
            PathBuf::from("memory.spec"),
            text.as_bytes().to_vec(),
            ParseOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn scan_id_from_str() {
        assert_eq!("12".parse::<ScanId>().unwrap(), ScanId::Number(12));
        assert_eq!("12.2".parse::<ScanId>().unwrap(), ScanId::NumberOrder(12, 2));
        assert!(matches!(
            "x".parse::<ScanId>(),
            Err(SpecError::InvalidScanId(_))
        ));
        assert!("1.x".parse::<ScanId>().is_err());
        assert_eq!(ScanId::NumberOrder(3, 2).to_string(), "3.2");
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = FileSpec::from_bytes(PathBuf::from("e"), b" \n\n".to_vec(), Default::default())
            .unwrap_err();
        assert!(matches!(err, SpecError::EmptyFile(_)));
    }

    #[test]
    fn cache_returns_same_scan() {
        let spec = spec("#S 1 ct\n#N 1\n#L s\n1\n#S 2 ct\n#N 1\n#L s\n2\n");
        assert_eq!(spec.cached(), 0);
        let a = spec.get_scan(ScanId::Number(2)).unwrap();
        let b = spec.get_scan(ScanId::Position(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(spec.cached(), 1);
    }

    #[test]
    fn not_found() {
        let spec = spec("#S 1 ct\n");
        assert!(matches!(
            spec.get_scan(ScanId::Number(5)),
            Err(SpecError::NotFound(_))
        ));
        assert!(spec.get_scan(ScanId::Position(1)).is_err());
        assert!(spec.get_scan(ScanId::NumberOrder(1, 2)).is_err());
    }

    #[test]
    fn iteration_restarts() {
        let spec = spec("#S 1 a\n#S 2 b\n#S 3 c\n");
        let first: Vec<_> = spec.iter().map(|s| s.number()).collect();
        let second: Vec<_> = (&spec).into_iter().map(|s| s.number()).collect();
        assert_eq!(first, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(first, second);
        assert_eq!(spec.iter().len(), 3);
    }
}

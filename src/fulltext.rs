//! Windowed access to the extracted full-text table.
//!
//! The table (`doi`, `content`, partitioned over many Parquet shards) does not
//! fit in memory. Lookups are instead served from one resident window: the
//! rows of a contiguous slice of the precomputed DOI visitation order. The
//! order list is built from the same scan the merge performs, so the merge
//! only ever moves forward through it; a miss advances to the next window.
//!
//! Only rows whose DOI falls into the target slice are kept while a window is
//! being scanned, so peak memory is bounded by the slice, not the shard count.

use crate::error::{MergeError, Result};
use arrow_array::cast::AsArray;
use arrow_array::{Array, LargeStringArray, RecordBatch, StringArray, StringViewArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default number of windows the DOI order list is split into
pub const DEFAULT_WINDOW_COUNT: usize = 40;

const DOI_COLUMN: &str = "doi";
const CONTENT_COLUMN: &str = "content";

/// Source of full-text rows.
pub trait TextTable {
    /// Every DOI that has at least one row.
    fn doi_universe(&self) -> Result<HashSet<String>>;

    /// Call `sink` for every row whose DOI is in `wanted`.
    fn scan(&self, wanted: &HashSet<&str>, sink: &mut dyn FnMut(&str, Option<&str>)) -> Result<()>;
}

/// Full-text table stored as a directory of Parquet shards.
#[derive(Debug, Clone)]
pub struct ParquetShards {
    paths: Vec<PathBuf>,
}

impl ParquetShards {
    /// Collect the shard files under `dir`, sorted by name. Marker and
    /// metadata files (`_SUCCESS`, `.crc`, hidden files) are skipped.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        if dir.is_file() {
            paths.push(dir.to_path_buf());
        } else {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.file_type()?.is_file()
                    && !name.starts_with('_')
                    && !name.starts_with('.')
                    && !name.ends_with(".crc")
                {
                    paths.push(entry.path());
                }
            }
            paths.sort();
        }

        if paths.is_empty() {
            return Err(MergeError::Config(format!(
                "No full-text shards under {}",
                dir.display()
            )));
        }
        info!(shards = paths.len(), dir = %dir.display(), "Full-text shards found");
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn read_shard<F>(path: &Path, columns: &[&str], mut f: F) -> Result<()>
    where
        F: FnMut(&RecordBatch) -> Result<()>,
    {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
        let mask = ProjectionMask::columns(builder.parquet_schema(), columns.iter().copied());
        let reader = builder.with_projection(mask).build()?;
        for batch in reader {
            f(&batch?)?;
        }
        Ok(())
    }
}

impl TextTable for ParquetShards {
    fn doi_universe(&self) -> Result<HashSet<String>> {
        let mut dois = HashSet::new();
        for path in &self.paths {
            Self::read_shard(path, &[DOI_COLUMN], |batch| {
                let col = StrColumn::from_batch(batch, DOI_COLUMN, path)?;
                dois.extend((0..batch.num_rows()).filter_map(|i| col.value(i)).map(str::to_string));
                Ok(())
            })?;
        }
        info!(dois = dois.len(), "Full-text DOI universe loaded");
        Ok(dois)
    }

    fn scan(&self, wanted: &HashSet<&str>, sink: &mut dyn FnMut(&str, Option<&str>)) -> Result<()> {
        for (i, path) in self.paths.iter().enumerate() {
            if i % 25 == 0 {
                debug!(shard = i, total = self.paths.len(), "Scanning full-text shards");
            }
            Self::read_shard(path, &[DOI_COLUMN, CONTENT_COLUMN], |batch| {
                let dois = StrColumn::from_batch(batch, DOI_COLUMN, path)?;
                let contents = StrColumn::from_batch(batch, CONTENT_COLUMN, path)?;
                for row in 0..batch.num_rows() {
                    if let Some(doi) = dois.value(row).filter(|d| wanted.contains(d)) {
                        sink(doi, contents.value(row));
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Borrowed view over a string column of any Arrow string layout
enum StrColumn<'a> {
    Utf8(&'a StringArray),
    Large(&'a LargeStringArray),
    View(&'a StringViewArray),
}

impl<'a> StrColumn<'a> {
    fn from_batch(batch: &'a RecordBatch, name: &str, path: &Path) -> Result<Self> {
        let col = batch.column_by_name(name).ok_or_else(|| {
            MergeError::Validation(format!("{} has no '{}' column", path.display(), name))
        })?;
        if let Some(a) = col.as_string_opt::<i32>() {
            Ok(Self::Utf8(a))
        } else if let Some(a) = col.as_string_opt::<i64>() {
            Ok(Self::Large(a))
        } else if let Some(a) = col.as_string_view_opt() {
            Ok(Self::View(a))
        } else {
            Err(MergeError::Validation(format!(
                "column '{}' in {} is {}, expected a string column",
                name,
                path.display(),
                col.data_type()
            )))
        }
    }

    fn value(&self, i: usize) -> Option<&'a str> {
        match self {
            Self::Utf8(a) => (!a.is_null(i)).then(|| a.value(i)),
            Self::Large(a) => (!a.is_null(i)).then(|| a.value(i)),
            Self::View(a) => (!a.is_null(i)).then(|| a.value(i)),
        }
    }
}

/// Rows stored for one DOI inside a window
#[derive(Debug, Default)]
struct WindowEntry {
    content: Option<String>,
    rows: usize,
}

/// Result of a successful window lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextHit<'a> {
    /// Exactly one row; its content may be null.
    Unique(Option<&'a str>),
    /// Several rows share the DOI; none is authoritative.
    Ambiguous(usize),
}

/// One resident slice of the full-text table
#[derive(Debug, Default)]
pub struct FullTextWindow {
    range: Range<usize>,
    texts: HashMap<String, WindowEntry>,
}

impl FullTextWindow {
    fn add(&mut self, doi: &str, content: Option<&str>) {
        let entry = self.texts.entry(doi.to_string()).or_default();
        entry.rows += 1;
        if entry.rows == 1 {
            entry.content = content.map(str::to_string);
        } else {
            // Ambiguous DOIs are never served, so the text is not kept.
            entry.content = None;
        }
    }

    pub fn contains(&self, doi: &str) -> bool {
        self.texts.contains_key(doi)
    }

    pub fn hit(&self, doi: &str) -> Option<TextHit<'_>> {
        self.texts.get(doi).map(|e| match e.rows {
            1 => TextHit::Unique(e.content.as_deref()),
            n => TextHit::Ambiguous(n),
        })
    }

    fn len(&self) -> usize {
        self.texts.len()
    }
}

/// Splits `len` ordered DOIs into at most `windows` contiguous slices of
/// equal length (the last one may be shorter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    len: usize,
    chunk: usize,
    count: usize,
}

impl WindowPlan {
    pub fn new(len: usize, windows: usize) -> Self {
        let windows = windows.max(1);
        let chunk = len.div_ceil(windows).max(1);
        Self {
            len,
            chunk,
            count: len.div_ceil(chunk),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bounds(&self, window: usize) -> Range<usize> {
        let start = (window * self.chunk).min(self.len);
        let end = (start + self.chunk).min(self.len);
        start..end
    }
}

/// Lazily advancing full-text loader. At most one window is resident.
pub struct FullTextLoader<T: TextTable> {
    table: T,
    universe: HashSet<String>,
    order: Vec<String>,
    plan: WindowPlan,
    current: usize,
    window: FullTextWindow,
    loads: usize,
}

impl<T: TextTable> FullTextLoader<T> {
    /// Create the loader and load the first window.
    pub fn new(table: T, universe: HashSet<String>, order: Vec<String>, windows: usize) -> Result<Self> {
        let plan = WindowPlan::new(order.len(), windows);
        info!(
            dois = order.len(),
            windows = plan.count(),
            "Full-text window plan"
        );
        let mut loader = Self {
            table,
            universe,
            order,
            plan,
            current: 0,
            window: FullTextWindow::default(),
            loads: 0,
        };
        if plan.count() > 0 {
            loader.window = loader.load_window(0)?;
        }
        Ok(loader)
    }

    /// Whether the table has any row for `doi`.
    pub fn covers(&self, doi: &str) -> bool {
        self.universe.contains(doi)
    }

    /// Number of windows loaded so far.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn current_window(&self) -> usize {
        self.current
    }

    pub fn window_count(&self) -> usize {
        self.plan.count()
    }

    /// Text rows for `doi`, advancing windows on a miss.
    ///
    /// Fails with [`MergeError::WindowExhausted`] when the DOI does not occur
    /// anywhere after the current window in the order list, or the last
    /// window has been passed.
    pub fn lookup(&mut self, doi: &str) -> Result<TextHit<'_>> {
        while !self.window.contains(doi) {
            self.advance_for(doi)?;
        }
        self.window
            .hit(doi)
            .ok_or_else(|| self.exhausted(doi))
    }

    fn advance_for(&mut self, doi: &str) -> Result<()> {
        let next = self.current + 1;
        let tail = self.window.range.end;
        let position = self.order[tail..]
            .iter()
            .position(|d| d == doi)
            .map(|p| p + tail);

        warn!(
            doi,
            window = self.current,
            position = ?position,
            "DOI not in current full-text window"
        );

        if position.is_none() || next >= self.plan.count() {
            return Err(self.exhausted(doi));
        }

        self.current = next;
        self.window = FullTextWindow::default();
        self.window = self.load_window(next)?;
        Ok(())
    }

    fn exhausted(&self, doi: &str) -> MergeError {
        MergeError::WindowExhausted {
            doi: doi.to_string(),
            window: self.current,
            windows: self.plan.count(),
        }
    }

    fn load_window(&mut self, index: usize) -> Result<FullTextWindow> {
        let range = self.plan.bounds(index);
        info!(window = index, from = range.start, to = range.end, "Loading full-text window");

        let wanted: HashSet<&str> = self.order[range.clone()].iter().map(String::as_str).collect();
        let mut window = FullTextWindow {
            range,
            texts: HashMap::with_capacity(wanted.len()),
        };
        self.table.scan(&wanted, &mut |doi, content| window.add(doi, content))?;
        self.loads += 1;

        info!(window = index, texts = window.len(), "Full-text window loaded");
        Ok(window)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// In-memory table that counts full scans
    #[derive(Debug, Default)]
    pub(crate) struct MemoryTable {
        pub rows: Vec<(String, Option<String>)>,
        pub scans: Cell<usize>,
    }

    impl MemoryTable {
        pub(crate) fn new(rows: &[(&str, &str)]) -> Self {
            Self {
                rows: rows
                    .iter()
                    .map(|(d, c)| (d.to_string(), Some(c.to_string())))
                    .collect(),
                scans: Cell::new(0),
            }
        }
    }

    impl TextTable for MemoryTable {
        fn doi_universe(&self) -> Result<HashSet<String>> {
            Ok(self.rows.iter().map(|(d, _)| d.clone()).collect())
        }

        fn scan(&self, wanted: &HashSet<&str>, sink: &mut dyn FnMut(&str, Option<&str>)) -> Result<()> {
            self.scans.set(self.scans.get() + 1);
            for (doi, content) in &self.rows {
                if wanted.contains(doi.as_str()) {
                    sink(doi, content.as_deref());
                }
            }
            Ok(())
        }
    }

    fn order(dois: &[&str]) -> Vec<String> {
        dois.iter().map(|d| d.to_string()).collect()
    }

    fn loader(table: MemoryTable, dois: &[&str], windows: usize) -> FullTextLoader<MemoryTable> {
        let universe = table.doi_universe().expect("universe");
        FullTextLoader::new(table, universe, order(dois), windows).expect("loader")
    }

    #[test]
    fn test_window_plan_covers_every_position() {
        let plan = WindowPlan::new(10, 4);
        assert_eq!(plan.count(), 4);
        assert_eq!(plan.bounds(0), 0..3);
        assert_eq!(plan.bounds(3), 9..10);

        // fewer DOIs than windows
        let plan = WindowPlan::new(3, 40);
        assert_eq!(plan.count(), 3);
        assert_eq!(plan.bounds(2), 2..3);

        assert_eq!(WindowPlan::new(0, 40).count(), 0);
    }

    #[test]
    fn test_hit_in_first_window_needs_no_advance() -> Result<()> {
        let table = MemoryTable::new(&[("a", "text a"), ("b", "text b"), ("c", "text c")]);
        let mut loader = loader(table, &["a", "b", "c"], 3);
        assert_eq!(loader.lookup("a")?, TextHit::Unique(Some("text a")));
        assert_eq!(loader.loads(), 1);
        Ok(())
    }

    #[test]
    fn test_each_miss_advances_exactly_one_window() -> Result<()> {
        let table = MemoryTable::new(&[("a", "ta"), ("b", "tb"), ("c", "tc"), ("d", "td")]);
        let mut loader = loader(table, &["a", "b", "c", "d"], 4);

        assert_eq!(loader.lookup("b")?, TextHit::Unique(Some("tb")));
        assert_eq!(loader.current_window(), 1);
        assert_eq!(loader.loads(), 2);

        assert_eq!(loader.lookup("d")?, TextHit::Unique(Some("td")));
        assert_eq!(loader.current_window(), 3);
        assert_eq!(loader.loads(), 4);
        assert_eq!(loader.table.scans.get(), 4);
        Ok(())
    }

    #[test]
    fn test_doi_behind_current_window_is_exhaustion() -> Result<()> {
        let table = MemoryTable::new(&[("a", "ta"), ("b", "tb"), ("c", "tc")]);
        let mut loader = loader(table, &["a", "b", "c"], 3);
        loader.lookup("c")?;

        let err = loader.lookup("a");
        assert!(matches!(err, Err(MergeError::WindowExhausted { ref doi, window: 2, windows: 3 }) if doi == "a"));
        // no further window was loaded
        assert_eq!(loader.loads(), 3);
        Ok(())
    }

    #[test]
    fn test_unknown_doi_fails_without_looping() {
        let table = MemoryTable::new(&[("a", "ta"), ("b", "tb")]);
        let mut loader = loader(table, &["a", "b"], 2);
        assert!(matches!(loader.lookup("zz"), Err(MergeError::WindowExhausted { .. })));
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_repeated_doi_reachable_in_later_window() -> Result<()> {
        let table = MemoryTable::new(&[("a", "ta"), ("b", "tb")]);
        let mut loader = loader(table, &["a", "b", "a"], 3);
        loader.lookup("b")?;
        assert_eq!(loader.lookup("a")?, TextHit::Unique(Some("ta")));
        assert_eq!(loader.current_window(), 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_rows_are_ambiguous() -> Result<()> {
        let table = MemoryTable::new(&[("a", "first"), ("a", "second"), ("b", "tb")]);
        let mut loader = loader(table, &["a", "b"], 1);
        assert_eq!(loader.lookup("a")?, TextHit::Ambiguous(2));
        assert!(loader.covers("b"));
        assert!(!loader.covers("x"));
        Ok(())
    }
}

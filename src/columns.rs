//! Row-oriented export of per-pixel sample vectors.
//!
//! A [`ColumnSink`] accepts rows of a fixed number of
//! `f64` columns; a [`ColumnSource`] reads back a block of
//! consecutive rows. [`ColumnTable`] keeps the rows in
//! memory and [`ColumnFile`] persists them as CBOR.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CalcError;
use crate::Result;

pub trait ColumnSink {
    fn column_count(&self) -> usize;

    /// Append one row; `row` must have `column_count`
    /// values.
    fn append(&mut self, row: &[f64]) -> Result<()>;
}

pub trait ColumnSource {
    fn column_count(&self) -> usize;

    fn row_count(&self) -> usize;

    /// Read `count` rows from `start` as a `(count,
    /// column_count)` array.
    fn read_rows(&self, start: usize, count: usize) -> Result<Array2<f64>>;
}

/// Rows held in memory, stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnTable {
    columns: usize,
    data: Vec<f64>,
}

impl ColumnTable {
    pub fn new(columns: usize) -> Result<Self> {
        if columns == 0 {
            bail!(CalcError::config("column table needs at least one column"));
        }
        Ok(ColumnTable {
            columns,
            data: vec![],
        })
    }

    /// Iterate over the rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks(self.columns)
    }
}

impl ColumnSink for ColumnTable {
    fn column_count(&self) -> usize {
        self.columns
    }

    fn append(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.columns {
            bail!(CalcError::Mismatch {
                what: "row length",
                found: row.len(),
                expected: self.columns,
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }
}

impl ColumnSource for ColumnTable {
    fn column_count(&self) -> usize {
        self.columns
    }

    fn row_count(&self) -> usize {
        self.data.len() / self.columns
    }

    fn read_rows(&self, start: usize, count: usize) -> Result<Array2<f64>> {
        if start + count > self.row_count() {
            bail!(CalcError::io(format!(
                "rows {}..{} out of range ({} rows)",
                start,
                start + count,
                self.row_count()
            )));
        }
        let block = &self.data[start * self.columns..(start + count) * self.columns];
        Ok(Array2::from_shape_vec((count, self.columns), block.to_vec())?)
    }
}

/// A [`ColumnTable`] backed by a file. Rows are buffered
/// in memory and written by [`ColumnFile::flush`]. Rows
/// appended since the last flush are written on drop; call
/// `flush` to see the error if that fails.
#[derive(Debug)]
pub struct ColumnFile {
    path: PathBuf,
    table: ColumnTable,
    dirty: bool,
}

impl ColumnFile {
    pub fn create(path: &Path, columns: usize) -> Result<Self> {
        let mut file = ColumnFile {
            path: path.to_path_buf(),
            table: ColumnTable::new(columns)?,
            dirty: true,
        };
        file.flush()?;
        Ok(file)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| CalcError::io(format!("opening {}: {}", path.display(), e)))?;
        let table: ColumnTable = serde_cbor::from_reader(BufReader::new(file))
            .with_context(|| format!("decoding {}", path.display()))?;
        Ok(ColumnFile {
            path: path.to_path_buf(),
            table,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &ColumnTable {
        &self.table
    }

    pub fn flush(&mut self) -> Result<()> {
        let file = File::create(&self.path)
            .map_err(|e| CalcError::io(format!("creating {}: {}", self.path.display(), e)))?;
        let mut buf = BufWriter::with_capacity(0x100000, file);
        serde_cbor::to_writer(&mut buf, &self.table)
            .with_context(|| format!("writing {}", self.path.display()))?;
        buf.flush()
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for ColumnFile {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                warn!("{:#}", e);
            }
        }
    }
}

impl ColumnSink for ColumnFile {
    fn column_count(&self) -> usize {
        self.table.columns
    }

    fn append(&mut self, row: &[f64]) -> Result<()> {
        self.table.append(row)?;
        self.dirty = true;
        Ok(())
    }
}

impl ColumnSource for ColumnFile {
    fn column_count(&self) -> usize {
        self.table.columns
    }

    fn row_count(&self) -> usize {
        self.table.row_count()
    }

    fn read_rows(&self, start: usize, count: usize) -> Result<Array2<f64>> {
        self.table.read_rows(start, count)
    }
}
